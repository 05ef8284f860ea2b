//! Toolchain provisioning.
//!
//! # Architecture
//!
//! - [`ToolProvider`] - Trait implemented by each toolchain (Gradle, Maven, ...)
//! - [`ToolRegistry`] - Tool name to provider constructor
//! - [`ToolSpec`] - Version plus cache locations and install target
//! - [`InstallTarget`] - Effects used by installs; [`HostTarget`] is the real one
//! - [`DownloadCache`] - Downloads keyed by URL hash
//! - [`archive`] - Atomic archive extraction
//!
//! # Example
//!
//! ```ignore
//! use kiln_core::tools::{HostTarget, ToolRegistry, ToolSpec};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register("gradle", kiln_tools_gradle::GradleProvider::boxed);
//!
//! let target = Arc::new(HostTarget::new(paths::downloads_dir()?)?);
//! let spec = ToolSpec::new("7.6", paths::tools_dir()?, paths::package_cache_dir("app")?, target);
//! let gradle = registry.create("gradle", spec)?;
//! let dir = gradle.install().await?;
//! gradle.setup(&dir, &mut env)?;
//! ```

pub mod archive;
mod download;
mod install;
mod provider;
mod registry;
mod target;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use download::DownloadCache;
pub use install::{InstallLock, install_archive};
pub use provider::{Arch, Os, Platform, ToolProvider, ToolSpec, major_version};
pub use registry::{ProviderConstructor, ToolRegistry};
pub use target::{HostTarget, InstallTarget};
