//! User settings for kiln
//!
//! Settings live in `settings.toml` under the config directory (see
//! [`crate::paths::config_dir`]). Every field can be overridden from the
//! environment, which is how CI runners usually configure kiln.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result, paths};

/// Management API used when nothing else is configured
pub const DEFAULT_API_URL: &str = "https://api.kiln.build";

/// Web UI used to view uploaded build logs
pub const DEFAULT_MANAGEMENT_URL: &str = "https://app.kiln.build";

/// Persistent user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capture build output and upload it after the build
    pub upload_build_logs: bool,
    /// Management API base URL
    pub api_url: String,
    /// Management web UI base URL
    pub management_url: String,
    /// Bearer token for the management API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_build_logs: false,
            api_url: DEFAULT_API_URL.to_string(),
            management_url: DEFAULT_MANAGEMENT_URL.to_string(),
            api_token: None,
        }
    }
}

impl Settings {
    /// Load settings from the default location and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file exists but cannot be parsed,
    /// or an override has an invalid value.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&paths::settings_file()?)?;
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Load settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read settings"))?;
        toml::from_str(&contents).map_err(|e| {
            Error::configuration_with_help(
                format!("Invalid settings file {}: {e}", path.display()),
                "Fix or remove the file; kiln falls back to defaults without it",
            )
        })
    }

    /// Apply `KILN_*` environment overrides on top of the file values.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `KILN_UPLOAD_BUILD_LOGS` is not a boolean.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = non_empty_var("KILN_UPLOAD_BUILD_LOGS") {
            self.upload_build_logs = parse_bool(&value).ok_or_else(|| {
                Error::configuration(format!(
                    "KILN_UPLOAD_BUILD_LOGS must be true or false, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = non_empty_var("KILN_API_URL") {
            self.api_url = value;
        }
        if let Some(value) = non_empty_var("KILN_MANAGEMENT_URL") {
            self.management_url = value;
        }
        if let Some(value) = non_empty_var("KILN_API_TOKEN") {
            self.api_token = Some(value);
        }
        Ok(())
    }

    /// Absolute API URL for `path`
    #[must_use]
    pub fn api_endpoint(&self, path: &str) -> String {
        join_url(&self.api_url, path)
    }

    /// Absolute management UI URL for `path`
    #[must_use]
    pub fn management_link(&self, path: &str) -> String {
        join_url(&self.management_url, path)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
