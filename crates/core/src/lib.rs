//! Core library for kiln
//!
//! This crate holds everything a build invocation needs once a package and
//! target are known: manifest types, user settings, toolchain provisioning,
//! command dispatch under host, sandbox or container execution, output
//! duplication and build log publishing.
//!
//! The CLI crate is a thin layer over these pieces.

pub mod build;
pub mod buildlog;
pub mod config;
pub mod environment;
pub mod error;
pub mod manifest;
pub mod output;
pub mod paths;
pub mod provision;
pub mod tools;

pub use error::{ContainerStage, Error, Result};

/// Version of the kiln core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
