//! Gradle tool provider for kiln.
//!
//! Installs the binary distribution from services.gradle.org and gives each
//! package its own `GRADLE_USER_HOME` so caches from different packages and
//! Gradle versions never mix.

use async_trait::async_trait;
use kiln_core::Result;
use kiln_core::environment::Environment;
use kiln_core::tools::{Platform, ToolProvider, ToolSpec};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider for Gradle binary distributions
#[derive(Debug)]
pub struct GradleProvider {
    spec: ToolSpec,
}

impl GradleProvider {
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

    /// Per-package, per-version Gradle home
    #[must_use]
    pub fn user_home(&self) -> PathBuf {
        self.spec
            .package_cache_dir
            .join("gradle-home")
            .join(&self.spec.version)
    }
}

#[async_trait]
impl ToolProvider for GradleProvider {
    fn name(&self) -> &'static str {
        "gradle"
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn download_url(&self, _platform: &Platform) -> Result<String> {
        Ok(format!(
            "https://services.gradle.org/distributions/gradle-{}-bin.zip",
            self.version()
        ))
    }

    fn setup(&self, installed: &Path, env: &mut Environment) -> Result<()> {
        let bin = installed
            .join(format!("gradle-{}", self.version()))
            .join("bin");
        let home = self.user_home();
        debug!(bin = %bin.display(), home = %home.display(), "Configuring gradle");

        env.set("GRADLE_USER_HOME", home.to_string_lossy());
        env.prepend_path(&bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::tools::testing::RecordingTarget;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn provider(temp: &TempDir, target: Arc<RecordingTarget>) -> GradleProvider {
        GradleProvider::new(ToolSpec::new(
            "7.6.1",
            temp.path().join("tools"),
            temp.path().join("packages").join("app"),
            target,
        ))
    }

    #[test]
    fn test_download_url() {
        let temp = TempDir::new().unwrap();
        let gradle = provider(&temp, Arc::new(RecordingTarget::default()));
        assert_eq!(
            gradle.download_url(&Platform::current()).unwrap(),
            "https://services.gradle.org/distributions/gradle-7.6.1-bin.zip"
        );
    }

    #[test]
    fn test_setup_sets_user_home_and_path() {
        let temp = TempDir::new().unwrap();
        let gradle = provider(&temp, Arc::new(RecordingTarget::default()));
        let installed = gradle.install_dir();

        let mut env = Environment::new();
        gradle.setup(&installed, &mut env).unwrap();

        let home = temp.path().join("packages/app/gradle-home/7.6.1");
        assert_eq!(env.get("GRADLE_USER_HOME"), Some(home.to_string_lossy().as_ref()));
        let bin = installed.join("gradle-7.6.1").join("bin");
        assert!(env.get("PATH").unwrap().starts_with(&*bin.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let target = Arc::new(RecordingTarget::default());
        let gradle = provider(&temp, target.clone());

        let first = gradle.install().await.unwrap();
        let second = gradle.install().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, temp.path().join("tools/gradle/gradle-7.6.1"));
        assert_eq!(target.fetch_count(), 1);
    }
}
