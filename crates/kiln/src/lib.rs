//! kiln command-line application
//!
//! Locates a package, provisions the toolchain its manifest asks for, runs
//! the selected target's commands and reports how long each one took.
//! Everything heavier lives in `kiln_core`; this crate wires it to the
//! command line, signals and logging.

pub mod cli;
pub mod commands;
pub mod registry;
pub mod shutdown;
pub mod tracing;

pub use cli::{CliError, EXIT_BUILD_FAILED, EXIT_CLI, EXIT_OK};
