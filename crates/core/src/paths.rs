//! Centralized path management for kiln data directories.
//!
//! | Platform | Cache Dir | Config Dir |
//! |----------|-----------|------------|
//! | **macOS** | `~/Library/Caches/kiln` | `~/Library/Application Support/kiln` |
//! | **Linux** | `~/.cache/kiln` (XDG_CACHE_HOME) | `~/.config/kiln` (XDG_CONFIG_HOME) |
//!
//! Both support environment variable overrides for testing and CI:
//! - `KILN_CACHE_DIR` - Override cache directory
//! - `KILN_CONFIG_DIR` - Override config directory

use crate::{Error, Result};
use std::path::PathBuf;

/// Name of the user settings file inside the config directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// Get the cache directory for kiln.
///
/// Resolution order:
/// 1. `KILN_CACHE_DIR` environment variable
/// 2. Platform cache directory + `/kiln`
///
/// # Errors
///
/// Returns an error if the cache directory cannot be determined.
pub fn cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("KILN_CACHE_DIR")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    let base = dirs::cache_dir()
        .ok_or_else(|| Error::configuration("Could not determine cache directory"))?;

    Ok(base.join("kiln"))
}

/// Get the config directory for kiln.
///
/// Resolution order:
/// 1. `KILN_CONFIG_DIR` environment variable
/// 2. Platform config directory + `/kiln`
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("KILN_CONFIG_DIR")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    let base = dirs::config_dir()
        .ok_or_else(|| Error::configuration("Could not determine config directory"))?;

    Ok(base.join("kiln"))
}

/// Path to the user settings file.
pub fn settings_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}

/// Shared, cross-build toolchain cache.
///
/// Installed tools live under `tools/<tool>/<tool>-<version>`.
pub fn tools_dir() -> Result<PathBuf> {
    Ok(cache_dir()?.join("tools"))
}

/// Download cache keyed by URL hash.
pub fn downloads_dir() -> Result<PathBuf> {
    Ok(cache_dir()?.join("downloads"))
}

/// Cache directory private to one package.
///
/// This is what `kiln build --clean` wipes.
pub fn package_cache_dir(package: &str) -> Result<PathBuf> {
    Ok(cache_dir()?.join("packages").join(package))
}
