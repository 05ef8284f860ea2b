//! Idempotent installation into the shared tool cache.
//!
//! Installs are serialized per version with an exclusive lock file next to
//! the install directory. The directory itself only appears through an atomic
//! rename, so its existence means the install completed.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::provider::ToolProvider;
use crate::{Error, Result};

/// Exclusive lock on one install directory; released on drop.
#[derive(Debug)]
pub struct InstallLock {
    _file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Block (off the async runtime) until the lock for `install_dir` is held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheUnwritable`] if the lock file cannot be created.
    pub async fn acquire(install_dir: &Path) -> Result<Self> {
        let path = lock_path(install_dir);
        let lock_path = path.clone();

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            fs4::fs_std::FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(|e| Error::cache_unwritable(&path, std::io::Error::other(e)))?
        .map_err(|e| Error::cache_unwritable(&path, e))?;

        debug!(lock = %path.display(), "Acquired install lock");
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(install_dir: &Path) -> PathBuf {
    let name = install_dir
        .file_name()
        .map_or_else(|| "install".into(), |n| n.to_string_lossy().into_owned());
    install_dir.with_file_name(format!(".{name}.lock"))
}

/// Default install flow: fast path on an existing directory, otherwise lock,
/// re-check, fetch and unpack.
///
/// # Errors
///
/// Returns the first resolution, download, extraction or cache error.
pub async fn install_archive<P: ToolProvider + ?Sized>(provider: &P) -> Result<PathBuf> {
    let dest = provider.install_dir();
    let target = provider.spec().target.clone();

    if target.path_exists(&dest).await {
        debug!(tool = provider.name(), version = provider.version(), dir = %dest.display(), "Tool already installed");
        return Ok(dest);
    }

    let url = provider.download_url(&target.platform())?;

    let _lock = InstallLock::acquire(&dest).await?;
    if target.path_exists(&dest).await {
        debug!(tool = provider.name(), version = provider.version(), "Installed by another build while waiting for lock");
        return Ok(dest);
    }

    info!(tool = provider.name(), version = provider.version(), %url, "Installing tool");
    let archive = target.fetch(&url).await?;
    target.unarchive(&archive, &dest).await?;

    info!(tool = provider.name(), version = provider.version(), dir = %dest.display(), "Tool installed");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_is_hidden_sibling() {
        assert_eq!(
            lock_path(Path::new("/cache/tools/gradle/gradle-7.6")),
            PathBuf::from("/cache/tools/gradle/.gradle-7.6.lock")
        );
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("maven").join("maven-3.9.6");

        let first = InstallLock::acquire(&dir).await.unwrap();
        assert!(first.path().exists());
        drop(first);

        let second = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            InstallLock::acquire(&dir),
        )
        .await
        .expect("lock should be free after drop")
        .unwrap();
        drop(second);
    }
}
