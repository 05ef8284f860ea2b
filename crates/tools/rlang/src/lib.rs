//! R language tool provider for kiln.
//!
//! R is distributed as source, so install downloads the tarball, runs
//! `configure`, `make` and `make install` through the install target and
//! publishes the result into the shared cache in one rename. The build
//! happens under a hidden sibling directory that is removed afterwards.

use async_trait::async_trait;
use kiln_core::environment::Environment;
use kiln_core::tools::{InstallLock, Platform, ToolProvider, ToolSpec};
use kiln_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Provider building R from CRAN source releases
#[derive(Debug)]
pub struct RLangProvider {
    spec: ToolSpec,
}

impl RLangProvider {
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

    /// Scratch directory for the source build
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.spec
            .shared_cache_dir
            .join("R")
            .join(format!(".build-R-{}", self.version()))
    }

    async fn build(&self, archive: &Path, dest: &Path, build_dir: &Path) -> Result<()> {
        let target = &self.spec.target;
        let sources = build_dir.join("src");
        let staging = build_dir.join("stage");
        let source_dir = sources.join(format!("R-{}", self.version()));

        target.unarchive(archive, &sources).await?;

        let configure = source_dir.join("configure");
        let configure = configure.to_string_lossy();
        let prefix = format!("--prefix={}", dest.display());
        target
            .run(&configure, &["--with-x=no".to_string(), prefix], &source_dir)
            .await?;
        target.run("make", &[], &source_dir).await?;
        target
            .run(
                "make",
                &[
                    "install".to_string(),
                    format!("DESTDIR={}", staging.display()),
                ],
                &source_dir,
            )
            .await?;

        // make install with DESTDIR re-roots the absolute prefix under staging
        let relative = dest.strip_prefix("/").unwrap_or(dest);
        target.publish(&staging.join(relative), dest).await
    }
}

#[async_trait]
impl ToolProvider for RLangProvider {
    fn name(&self) -> &'static str {
        "rlang"
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn download_url(&self, _platform: &Platform) -> Result<String> {
        let major = self.major_version();
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::tool_resolution(format!(
                "R version '{}' has no numeric major version",
                self.version()
            )));
        }
        Ok(format!(
            "https://cloud.r-project.org/src/base/R-{major}/R-{}.tar.gz",
            self.version()
        ))
    }

    fn install_dir(&self) -> PathBuf {
        self.spec
            .shared_cache_dir
            .join("R")
            .join(format!("R-{}", self.version()))
    }

    async fn install(&self) -> Result<PathBuf> {
        let dest = self.install_dir();
        let target = self.spec.target.clone();

        if target.path_exists(&dest).await {
            debug!(version = self.version(), dir = %dest.display(), "R already installed");
            return Ok(dest);
        }

        let url = self.download_url(&target.platform())?;
        let _lock = InstallLock::acquire(&dest).await?;
        if target.path_exists(&dest).await {
            return Ok(dest);
        }

        info!(version = self.version(), %url, "Building R from source");
        let archive = target.fetch(&url).await?;

        let build_dir = self.build_dir();
        let built = self.build(&archive, &dest, &build_dir).await;
        if let Err(e) = target.remove_dir(&build_dir).await {
            warn!(dir = %build_dir.display(), error = %e, "Failed to remove R build directory");
        }
        built?;

        info!(version = self.version(), dir = %dest.display(), "R installed");
        Ok(dest)
    }

    fn setup(&self, installed: &Path, env: &mut Environment) -> Result<()> {
        env.prepend_path(&installed.join("bin"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::tools::testing::RecordingTarget;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn provider(version: &str, temp: &TempDir, target: Arc<RecordingTarget>) -> RLangProvider {
        RLangProvider::new(ToolSpec::new(version, temp.path(), temp.path().join("pkg"), target))
    }

    #[test]
    fn test_download_url() {
        let temp = TempDir::new().unwrap();
        let r = provider("4.3.2", &temp, Arc::new(RecordingTarget::default()));
        assert_eq!(
            r.download_url(&Platform::current()).unwrap(),
            "https://cloud.r-project.org/src/base/R-4/R-4.3.2.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_install_builds_from_source_and_publishes() {
        let temp = TempDir::new().unwrap();
        let target = Arc::new(RecordingTarget::default());
        let r = provider("4.3.2", &temp, target.clone());

        let dir = r.install().await.unwrap();
        let dest = temp.path().join("R/R-4.3.2");
        assert_eq!(dir, dest);

        let recorded = target.recorded();
        let build_dir = temp.path().join("R/.build-R-4.3.2");
        let source_dir = build_dir.join("src/R-4.3.2");

        assert_eq!(
            recorded.fetched,
            ["https://cloud.r-project.org/src/base/R-4/R-4.3.2.tar.gz"]
        );
        let runs: Vec<(String, Vec<String>)> = recorded
            .runs
            .iter()
            .map(|(program, args, dir)| {
                assert_eq!(dir, &source_dir);
                (program.clone(), args.clone())
            })
            .collect();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].0, source_dir.join("configure").to_string_lossy());
        assert_eq!(
            runs[0].1,
            ["--with-x=no".to_string(), format!("--prefix={}", dest.display())]
        );
        assert_eq!(runs[1], ("make".to_string(), Vec::new()));
        assert_eq!(runs[2].1[0], "install");

        let staged = build_dir
            .join("stage")
            .join(dest.strip_prefix("/").unwrap());
        assert_eq!(recorded.published, [(staged, dest.clone())]);
        assert_eq!(recorded.removed, [build_dir]);
        assert!(recorded.existing.contains(&dest));
    }

    #[tokio::test]
    async fn test_second_install_skips_build() {
        let temp = TempDir::new().unwrap();
        let target = Arc::new(RecordingTarget::default());
        let r = provider("4.3.2", &temp, target.clone());

        r.install().await.unwrap();
        r.install().await.unwrap();

        assert_eq!(target.fetch_count(), 1);
        assert_eq!(target.recorded().runs.len(), 3);
    }

    #[test]
    fn test_setup_puts_bin_on_path() {
        let temp = TempDir::new().unwrap();
        let r = provider("4.3.2", &temp, Arc::new(RecordingTarget::default()));
        let mut env = Environment::new();
        r.setup(Path::new("/opt/R/R-4.3.2"), &mut env).unwrap();
        assert!(env.get("PATH").unwrap().starts_with("/opt/R/R-4.3.2/bin"));
    }
}
