//! `kiln platform`

use kiln_core::paths;
use kiln_core::tools::Platform;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::cli::CliError;

/// Facts about the machine and kiln's directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Host platform
    pub platform: Platform,
    /// kiln version
    pub version: &'static str,
    /// Root of the tool, download and package caches
    pub cache_dir: PathBuf,
    /// Directory holding `settings.toml`
    pub config_dir: PathBuf,
}

impl PlatformInfo {
    /// Gather information for the running process.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or config directory cannot be determined.
    pub fn detect() -> Result<Self, CliError> {
        Ok(Self {
            platform: Platform::current(),
            version: env!("CARGO_PKG_VERSION"),
            cache_dir: paths::cache_dir()?,
            config_dir: paths::config_dir()?,
        })
    }

    /// Human-readable report, one `key: value` per line
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "kiln:     {}", self.version);
        let _ = writeln!(out, "os:       {}", self.platform.os);
        let _ = writeln!(out, "arch:     {}", self.platform.arch);
        let _ = writeln!(out, "cache:    {}", self.cache_dir.display());
        let _ = writeln!(out, "config:   {}", self.config_dir.display());
        out
    }
}

/// Render the platform report for the current process.
///
/// # Errors
///
/// Returns an error if the cache or config directory cannot be determined.
pub fn execute_platform() -> Result<String, CliError> {
    Ok(PlatformInfo::detect()?.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::tools::{Arch, Os};

    #[test]
    fn test_render() {
        let info = PlatformInfo {
            platform: Platform::new(Os::Linux, Arch::X86_64),
            version: "1.2.3",
            cache_dir: PathBuf::from("/var/cache/kiln"),
            config_dir: PathBuf::from("/etc/kiln"),
        };

        assert_eq!(
            info.render(),
            "kiln:     1.2.3\n\
             os:       linux\n\
             arch:     x86_64\n\
             cache:    /var/cache/kiln\n\
             config:   /etc/kiln\n"
        );
    }

    #[test]
    fn test_detect_honours_env_overrides() {
        temp_env::with_vars(
            [
                ("KILN_CACHE_DIR", Some("/tmp/kiln-cache")),
                ("KILN_CONFIG_DIR", Some("/tmp/kiln-config")),
            ],
            || {
                let info = PlatformInfo::detect().unwrap();
                assert_eq!(info.cache_dir, PathBuf::from("/tmp/kiln-cache"));
                assert_eq!(info.config_dir, PathBuf::from("/tmp/kiln-config"));
                assert_eq!(info.platform, Platform::current());
            },
        );
    }
}
