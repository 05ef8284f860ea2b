//! Apache Maven tool provider for kiln.

use async_trait::async_trait;
use kiln_core::environment::Environment;
use kiln_core::tools::{Platform, ToolProvider, ToolSpec};
use kiln_core::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Provider for Maven binary distributions from the Apache archive
#[derive(Debug)]
pub struct MavenProvider {
    spec: ToolSpec,
}

impl MavenProvider {
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
}

#[async_trait]
impl ToolProvider for MavenProvider {
    fn name(&self) -> &'static str {
        "maven"
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn download_url(&self, _platform: &Platform) -> Result<String> {
        let major = self.major_version();
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::tool_resolution(format!(
                "Maven version '{}' has no numeric major version",
                self.version()
            )));
        }
        Ok(format!(
            "https://archive.apache.org/dist/maven/maven-{major}/{v}/binaries/apache-maven-{v}-bin.tar.gz",
            v = self.version()
        ))
    }

    fn setup(&self, installed: &Path, env: &mut Environment) -> Result<()> {
        let home = installed.join(format!("apache-maven-{}", self.version()));
        debug!(home = %home.display(), "Configuring maven");
        env.set("MAVEN_HOME", home.to_string_lossy());
        env.prepend_path(&home.join("bin"))
    }
}
