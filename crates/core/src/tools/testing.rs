//! Instrumented install target for provider tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::provider::Platform;
use super::target::InstallTarget;
use crate::{Error, Result};

/// Everything a [`RecordingTarget`] has been asked to do.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    /// Paths that currently "exist"
    pub existing: HashSet<PathBuf>,
    /// URLs fetched, in order
    pub fetched: Vec<String>,
    /// `(archive, dest)` pairs unpacked
    pub unarchived: Vec<(PathBuf, PathBuf)>,
    /// `(program, args, working_dir)` runs
    pub runs: Vec<(String, Vec<String>, PathBuf)>,
    /// `(from, to)` publishes
    pub published: Vec<(PathBuf, PathBuf)>,
    /// Directories removed
    pub removed: Vec<PathBuf>,
}

/// In-memory [`InstallTarget`] that records calls instead of performing them.
///
/// Only install locks touch the real filesystem, so install directories in
/// tests should live under a temporary directory.
#[derive(Debug)]
pub struct RecordingTarget {
    platform: Platform,
    fail_fetch: bool,
    recorded: Mutex<Recorded>,
}

impl Default for RecordingTarget {
    fn default() -> Self {
        Self::with_platform(Platform::current())
    }
}

impl RecordingTarget {
    /// Target reporting `platform`
    #[must_use]
    pub fn with_platform(platform: Platform) -> Self {
        Self {
            platform,
            fail_fetch: false,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Target whose every fetch fails with a download error
    #[must_use]
    pub fn failing_fetch() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    /// Pretend `path` already exists
    pub fn mark_existing(&self, path: impl Into<PathBuf>) {
        self.lock().existing.insert(path.into());
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn recorded(&self) -> Recorded {
        self.lock().clone()
    }

    /// Number of fetches performed
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.lock().fetched.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InstallTarget for RecordingTarget {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn path_exists(&self, path: &Path) -> bool {
        self.lock().existing.contains(path)
    }

    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        self.lock().fetched.push(url.to_string());
        if self.fail_fetch {
            return Err(Error::tool_download(url, "connection refused"));
        }
        let name = url.rsplit('/').next().unwrap_or("download");
        Ok(Path::new("/downloads").join(name))
    }

    async fn unarchive(&self, archive: &Path, dest: &Path) -> Result<()> {
        let mut recorded = self.lock();
        recorded
            .unarchived
            .push((archive.to_path_buf(), dest.to_path_buf()));
        recorded.existing.insert(dest.to_path_buf());
        Ok(())
    }

    async fn run(&self, program: &str, args: &[String], working_dir: &Path) -> Result<()> {
        self.lock().runs.push((
            program.to_string(),
            args.to_vec(),
            working_dir.to_path_buf(),
        ));
        Ok(())
    }

    async fn publish(&self, from: &Path, to: &Path) -> Result<()> {
        let mut recorded = self.lock();
        recorded.published.push((from.to_path_buf(), to.to_path_buf()));
        recorded.existing.remove(from);
        recorded.existing.insert(to.to_path_buf());
        Ok(())
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        let mut recorded = self.lock();
        recorded.removed.push(path.to_path_buf());
        recorded.existing.remove(path);
        Ok(())
    }
}
