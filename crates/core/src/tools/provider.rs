//! Toolchain provider contract.
//!
//! This module defines the `ToolProvider` trait that every toolchain
//! (Gradle, Maven, Flutter, R, ...) implements so the build can provision
//! them uniformly: compute a download URL, install into the shared cache and
//! expose the result through the environment overlay.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::install::install_archive;
use super::target::InstallTarget;
use crate::Result;
use crate::environment::Environment;

/// Where an installed toolchain has to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
}

impl Platform {
    /// Platform from its parts
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform kiln itself was built for
    #[must_use]
    pub fn current() -> Self {
        Self::new(Os::current(), Arch::current())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Operating systems toolchains are published for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// macOS
    Darwin,
    /// Linux
    Linux,
}

impl Os {
    /// OS of the running binary
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Linux
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
        })
    }
}

/// CPU architectures toolchains are published for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 64-bit ARM
    Arm64,
    /// 64-bit x86
    X86_64,
}

impl Arch {
    /// Architecture of the running binary
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else {
            Self::X86_64
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        })
    }
}

/// Everything a provider needs to compute paths and install one version.
#[derive(Clone)]
pub struct ToolSpec {
    /// Requested version string, as written in the manifest.
    pub version: String,
    /// Cross-build tool cache (`<cache>/tools`).
    pub shared_cache_dir: PathBuf,
    /// Cache private to the package being built.
    pub package_cache_dir: PathBuf,
    /// Where installs happen.
    pub target: Arc<dyn InstallTarget>,
}

impl ToolSpec {
    /// Create a spec for `version`.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        shared_cache_dir: impl Into<PathBuf>,
        package_cache_dir: impl Into<PathBuf>,
        target: Arc<dyn InstallTarget>,
    ) -> Self {
        Self {
            version: version.into(),
            shared_cache_dir: shared_cache_dir.into(),
            package_cache_dir: package_cache_dir.into(),
            target,
        }
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("version", &self.version)
            .field("shared_cache_dir", &self.shared_cache_dir)
            .field("package_cache_dir", &self.package_cache_dir)
            .finish_non_exhaustive()
    }
}

/// Leading dot-separated segment of a version string.
#[must_use]
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Trait for toolchain providers.
///
/// Path and URL computations are pure functions of the provider's
/// [`ToolSpec`]. `install` and `setup` have effects: the first on the shared
/// cache through the `ToolSpec`'s install target, the second on the caller's
/// environment overlay.
///
/// # Example
///
/// ```ignore
/// struct AntProvider { spec: ToolSpec }
///
/// #[async_trait]
/// impl ToolProvider for AntProvider {
///     fn name(&self) -> &'static str { "ant" }
///     fn spec(&self) -> &ToolSpec { &self.spec }
///     fn download_url(&self, _platform: &Platform) -> Result<String> {
///         Ok(format!("https://archive.apache.org/dist/ant/binaries/apache-ant-{}-bin.tar.gz", self.version()))
///     }
///     fn setup(&self, installed: &Path, env: &mut Environment) -> Result<()> {
///         env.prepend_path(&installed.join(format!("apache-ant-{}", self.version())).join("bin"))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Registry name (e.g., "gradle").
    fn name(&self) -> &'static str;

    /// The `ToolSpec` this provider was built from.
    fn spec(&self) -> &ToolSpec;

    /// Requested version.
    fn version(&self) -> &str {
        &self.spec().version
    }

    /// Leading version segment, for mirrors bucketed by major version.
    fn major_version(&self) -> &str {
        major_version(self.version())
    }

    /// Distribution URL for `platform`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if the version cannot be mapped to a URL.
    fn download_url(&self, platform: &Platform) -> Result<String>;

    /// Version-scoped install directory in the shared cache.
    ///
    /// Defaults to `<shared>/<name>/<name>-<version>`.
    fn install_dir(&self) -> PathBuf {
        self.spec()
            .shared_cache_dir
            .join(self.name())
            .join(format!("{}-{}", self.name(), self.version()))
    }

    /// Make the tool available, returning its install directory.
    ///
    /// Idempotent: an existing install directory is returned without any
    /// network access. The default downloads [`Self::download_url`] and
    /// unpacks it into [`Self::install_dir`].
    ///
    /// # Errors
    ///
    /// Returns download, extraction or cache errors.
    async fn install(&self) -> Result<PathBuf> {
        install_archive(self).await
    }

    /// Expose the installed tool through `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be updated.
    fn setup(&self, installed: &Path, env: &mut Environment) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_display() {
        assert_eq!(
            Platform::new(Os::Linux, Arch::X86_64).to_string(),
            "linux-x86_64"
        );
        assert_eq!(
            Platform::new(Os::Darwin, Arch::Arm64).to_string(),
            "darwin-arm64"
        );
    }

    #[test]
    fn test_platform_current() {
        let p = Platform::current();
        assert!(matches!(p.os, Os::Darwin | Os::Linux));
        assert!(matches!(p.arch, Arch::Arm64 | Arch::X86_64));
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("3.6.3"), "3");
        assert_eq!(major_version("4"), "4");
        assert_eq!(major_version(""), "");
    }
}
