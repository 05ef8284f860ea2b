use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};
use kiln_core::build::BuildFlags;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// The build ran and failed, or its toolchain could not be provisioned
pub const EXIT_BUILD_FAILED: i32 = 1;
/// CLI, manifest or configuration error exit code
pub const EXIT_CLI: i32 = 2;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI, manifest or configuration error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kiln::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Build or provisioning failure (exit code 1)
    #[error("Build failed: {message}")]
    #[diagnostic(code(kiln::cli::build))]
    Build {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new build error
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            help: None,
        }
    }
}

/// Convert `kiln_core::Error` to the matching `CliError` variant.
///
/// Problems with what the user asked for (manifest, settings, unknown tools
/// or targets) are configuration errors; everything that went wrong while
/// building is a build failure.
impl From<kiln_core::Error> for CliError {
    fn from(err: kiln_core::Error) -> Self {
        let help = miette::Diagnostic::help(&err).map(|h| h.to_string());
        match err {
            kiln_core::Error::Configuration { message, help } => Self::Config { message, help },
            kiln_core::Error::Manifest { .. } | kiln_core::Error::UnknownTool { .. } => {
                Self::Config {
                    message: err.to_string(),
                    help,
                }
            }
            other => Self::Build {
                message: error_chain(&other),
                help,
            },
        }
    }
}

/// `err` followed by each of its sources, joined with `: `
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Build { .. } => EXIT_BUILD_FAILED,
    }
}

/// Render an error with miette on stderr
#[allow(clippy::print_stderr)]
pub fn render_error(err: &CliError) {
    let report = Report::new(err.clone());
    eprintln!("{report:?}");
    let _ = io::stderr().flush();
}

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Build packages with managed toolchains, on the host, in a sandbox or in a container")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub format: TracingFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Build a target of the current package")]
    Build {
        #[arg(help = "Target name, or @package:target")]
        target: Option<String>,

        #[arg(long, help = "Ignore container definitions and build on the host")]
        no_container: bool,

        #[arg(long, help = "Install build dependencies, then stop")]
        deps_only: bool,

        #[arg(long, help = "Prefix every build command with this string")]
        exec_prefix: Option<String>,

        #[arg(long, help = "Remove the package cache before building")]
        clean: bool,

        #[arg(long, value_name = "SECONDS", help = "Kill any command running longer than this")]
        timeout: Option<u64>,
    },
    #[command(about = "Show platform and directory information")]
    Platform,
}

impl Commands {
    /// Build flags for a `build` invocation
    #[must_use]
    pub fn build_flags(&self) -> Option<BuildFlags> {
        match self {
            Self::Build {
                no_container,
                deps_only,
                exec_prefix,
                clean,
                timeout,
                ..
            } => Some(BuildFlags {
                host_only: *no_container,
                clean_build: *clean,
                dependencies_only: *deps_only,
                exec_prefix: exec_prefix.clone(),
                timeout: timeout.filter(|secs| *secs > 0).map(Duration::from_secs),
            }),
            Self::Platform => None,
        }
    }
}

#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
