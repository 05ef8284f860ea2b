//! Flutter SDK tool provider for kiln.
//!
//! Versions may carry a release channel suffix (`3.19.0_beta`); without one
//! the stable channel is used. Flutter changed its archive naming at 1.17.0:
//! older releases are published as `v1.12.13+hotfix.9`, newer ones without
//! the `v`.

use async_trait::async_trait;
use kiln_core::environment::Environment;
use kiln_core::tools::{Os, Platform, ToolProvider, ToolSpec};
use kiln_core::{Error, Result};
use semver::Version;
use std::path::Path;
use tracing::debug;

/// Channel used when the version names none
pub const DEFAULT_CHANNEL: &str = "stable";

/// First release published without the `v` prefix
const UNPREFIXED_SINCE: Version = Version::new(1, 17, 0);

/// Provider for Flutter SDK archives
#[derive(Debug)]
pub struct FlutterProvider {
    spec: ToolSpec,
}

impl FlutterProvider {
    /// Create a provider for `spec`
    #[must_use]
    pub fn new(spec: ToolSpec) -> Self {
        Self { spec }
    }

    /// Registry constructor
    #[must_use]
    pub fn boxed(spec: ToolSpec) -> Box<dyn ToolProvider> {
        Box::new(Self::new(spec))
    }

    /// Split the requested version into release version and channel
    #[must_use]
    pub fn version_and_channel(&self) -> (&str, &str) {
        split_channel(self.version())
    }
}

/// Split `3.19.0_beta` into `("3.19.0", "beta")`.
///
/// More than one `_` keeps only the leading version and the stable channel.
#[must_use]
pub fn split_channel(version: &str) -> (&str, &str) {
    let parts: Vec<&str> = version.split('_').collect();
    match parts.as_slice() {
        [release, channel] => (*release, *channel),
        [release, ..] => (*release, DEFAULT_CHANNEL),
        [] => (version, DEFAULT_CHANNEL),
    }
}

/// Version string as it appears in archive names.
///
/// Shorthand such as `1.17` or `2` is compared as `1.17.0` / `2.0.0` but
/// keeps its written form in the result.
///
/// # Errors
///
/// Returns a resolution error if `version` is not a semantic version.
pub fn archive_version(version: &str) -> Result<String> {
    let bare = version.strip_prefix('v').unwrap_or(version);
    let parsed = Version::parse(&pad_version(bare)).map_err(|e| {
        Error::tool_resolution(format!("Flutter version '{version}' is not a semantic version: {e}"))
    })?;

    if parsed < UNPREFIXED_SINCE {
        Ok(format!("v{bare}"))
    } else {
        Ok(bare.to_string())
    }
}

/// Fill in missing minor/patch components with zeros.
fn pad_version(version: &str) -> String {
    let split = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(split);
    let missing = 2usize.saturating_sub(core.matches('.').count());
    format!("{core}{}{suffix}", ".0".repeat(missing))
}

#[async_trait]
impl ToolProvider for FlutterProvider {
    fn name(&self) -> &'static str {
        "flutter"
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn download_url(&self, platform: &Platform) -> Result<String> {
        let (version, channel) = self.version_and_channel();
        let (os, extension) = match platform.os {
            Os::Darwin => ("macos", "zip"),
            Os::Linux => ("linux", "tar.xz"),
        };
        Ok(format!(
            "https://storage.googleapis.com/flutter_infra/releases/{channel}/{os}/flutter_{os}_{}-{channel}.{extension}",
            archive_version(version)?
        ))
    }

    fn setup(&self, installed: &Path, env: &mut Environment) -> Result<()> {
        let bin = installed.join("flutter").join("bin");
        debug!(bin = %bin.display(), "Configuring flutter");
        env.prepend_path(&bin)
    }
}
