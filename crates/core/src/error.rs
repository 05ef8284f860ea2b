//! Error types for the kiln build core

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Stage of the container lifecycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStage {
    /// Looking up an existing container for the same identity
    Find,
    /// Removing a stale container
    Remove,
    /// Creating the build container
    Create,
    /// Starting the build container
    Start,
}

impl fmt::Display for ContainerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::Remove => write!(f, "remove"),
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
        }
    }
}

/// Main error type for kiln build operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid configuration or settings
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kiln::config::invalid))]
    Configuration {
        /// Description of the configuration issue
        message: String,
        /// Optional hint for the operator
        #[help]
        help: Option<String>,
    },

    /// The package manifest could not be loaded or is inconsistent
    #[error("Manifest error in {}: {message}", path.display())]
    #[diagnostic(
        code(kiln::manifest::invalid),
        help("Check the package's .kiln.yml")
    )]
    Manifest {
        /// Manifest file path
        path: Box<Path>,
        /// What went wrong
        message: String,
    },

    /// I/O error with path context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(kiln::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "rename")
        operation: String,
    },

    /// No provider registered for the requested tool
    #[error("Unknown tool '{name}'")]
    #[diagnostic(code(kiln::tools::unknown))]
    UnknownTool {
        /// Requested tool name
        name: String,
        /// Names the registry knows about
        #[help]
        available: Option<String>,
    },

    /// Version could not be mapped to a distribution URL
    #[error("{message}")]
    #[diagnostic(code(kiln::tools::resolution))]
    ToolResolution {
        /// Description of the resolution failure
        message: String,
        /// Optional hint for the operator
        #[help]
        help: Option<String>,
    },

    /// Network failure while fetching a tool archive
    #[error("Failed to download {url}: {message}")]
    #[diagnostic(
        code(kiln::tools::download),
        help("Check network connectivity and that the version exists upstream")
    )]
    ToolDownload {
        /// Requested URL
        url: String,
        /// Transport or HTTP status detail
        message: String,
    },

    /// Archive could not be unpacked
    #[error("Failed to extract {}: {message}", archive.display())]
    #[diagnostic(
        code(kiln::tools::extraction),
        help("The cached download may be corrupt; rerun with --clean or delete it")
    )]
    ToolExtraction {
        /// Archive being extracted
        archive: Box<Path>,
        /// Decoder detail
        message: String,
    },

    /// The provisioning cache cannot be written
    #[error("Tool cache is not writable: {}", path.display())]
    #[diagnostic(
        code(kiln::tools::cache),
        help("Set KILN_CACHE_DIR to a writable directory")
    )]
    CacheUnwritable {
        /// Cache path
        path: Box<Path>,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Provisioning a toolchain failed
    #[error("Failed to provision {tool} {version}")]
    #[diagnostic(code(kiln::tools::provision))]
    Provision {
        /// Tool name
        tool: String,
        /// Requested version
        version: String,
        /// Underlying provisioning error
        #[source]
        source: Box<Error>,
    },

    /// A build command failed to spawn or exited non-zero
    #[error("Command '{command}' failed: {message}")]
    #[diagnostic(
        code(kiln::build::execution),
        help("Check the command output above for details")
    )]
    Execution {
        /// Command text, including any exec prefix
        command: String,
        /// Spawn error or exit status description
        message: String,
        /// Exit code when the process ran to completion
        exit_code: Option<i32>,
    },

    /// A build command exceeded its time limit
    #[error("Command '{command}' timed out after {seconds} seconds")]
    #[diagnostic(code(kiln::build::timeout))]
    Timeout {
        /// Command text
        command: String,
        /// Configured limit
        seconds: u64,
    },

    /// The build was interrupted
    #[error("Command '{command}' was cancelled")]
    #[diagnostic(code(kiln::build::cancelled))]
    Cancelled {
        /// Command that was running when cancellation arrived
        command: String,
    },

    /// Container find/remove/create/start failed
    #[error("Container {stage} failed: {message}")]
    #[diagnostic(
        code(kiln::container::lifecycle),
        help("Check that the container runtime is running and the image exists")
    )]
    ContainerLifecycle {
        /// Lifecycle stage
        stage: ContainerStage,
        /// Runtime detail
        message: String,
    },

    /// Build log upload failed
    #[error("Build log upload failed: {message}")]
    #[diagnostic(code(kiln::buildlog::upload))]
    Upload {
        /// Transport or status detail
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with a help hint
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a manifest error
    #[must_use]
    pub fn manifest(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.as_ref().into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a tool resolution error
    #[must_use]
    pub fn tool_resolution(message: impl Into<String>) -> Self {
        Self::ToolResolution {
            message: message.into(),
            help: None,
        }
    }

    /// Create a download error
    #[must_use]
    pub fn tool_download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolDownload {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an extraction error
    #[must_use]
    pub fn tool_extraction(archive: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::ToolExtraction {
            archive: archive.as_ref().into(),
            message: message.into(),
        }
    }

    /// Create an unwritable-cache error
    #[must_use]
    pub fn cache_unwritable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::CacheUnwritable {
            path: path.as_ref().into(),
            source,
        }
    }

    /// Wrap a provisioning failure with the tool it belongs to
    #[must_use]
    pub fn provision(tool: impl Into<String>, version: impl Into<String>, source: Self) -> Self {
        Self::Provision {
            tool: tool.into(),
            version: version.into(),
            source: Box::new(source),
        }
    }

    /// Create an execution error
    #[must_use]
    pub fn execution(
        command: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Execution {
            command: command.into(),
            message: message.into(),
            exit_code,
        }
    }

    /// Create a container lifecycle error
    #[must_use]
    pub fn container(stage: ContainerStage, message: impl Into<String>) -> Self {
        Self::ContainerLifecycle {
            stage,
            message: message.into(),
        }
    }

    /// Create an upload error
    #[must_use]
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
        }
    }

    /// Whether this error came from toolchain provisioning
    #[must_use]
    pub fn is_provision(&self) -> bool {
        matches!(
            self,
            Self::Provision { .. }
                | Self::ToolResolution { .. }
                | Self::ToolDownload { .. }
                | Self::ToolExtraction { .. }
                | Self::CacheUnwritable { .. }
                | Self::UnknownTool { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "io".to_string(),
        }
    }
}

/// Result type for kiln build operations
pub type Result<T> = std::result::Result<T, Error>;
