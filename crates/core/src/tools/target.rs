//! Install targets: where provisioning side effects happen.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::archive;
use super::download::DownloadCache;
use super::provider::Platform;
use crate::{Error, Result};

/// Effects a provider needs to install itself.
///
/// Providers never touch the filesystem or network directly; they go through
/// the target in their [`ToolSpec`](super::ToolSpec). This keeps provider
/// logic testable with an instrumented target.
#[async_trait]
pub trait InstallTarget: Send + Sync {
    /// Platform that installed binaries must run on.
    fn platform(&self) -> Platform;

    /// Whether `path` exists.
    async fn path_exists(&self, path: &Path) -> bool;

    /// Download `url` through the shared cache, returning the local file.
    async fn fetch(&self, url: &str) -> Result<PathBuf>;

    /// Unpack `archive` so it appears at `dest` atomically.
    async fn unarchive(&self, archive: &Path, dest: &Path) -> Result<()>;

    /// Run `program` with `args` in `working_dir`, failing on non-zero exit.
    async fn run(&self, program: &str, args: &[String], working_dir: &Path) -> Result<()>;

    /// Atomically move `from` to `to`, replacing any existing `to`.
    async fn publish(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove a directory tree if it exists.
    async fn remove_dir(&self, path: &Path) -> Result<()>;
}

/// Installs onto the machine kiln runs on.
#[derive(Debug, Clone)]
pub struct HostTarget {
    downloads: DownloadCache,
    platform: Platform,
}

impl HostTarget {
    /// Create a host target caching downloads under `downloads_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            downloads: DownloadCache::new(downloads_dir)?,
            platform: Platform::current(),
        })
    }
}

#[async_trait]
impl InstallTarget for HostTarget {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        self.downloads.fetch(url).await
    }

    async fn unarchive(&self, archive: &Path, dest: &Path) -> Result<()> {
        let (from, to) = (archive.to_path_buf(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || archive::extract_atomic(&from, &to))
            .await
            .map_err(|e| Error::tool_extraction(archive, format!("extraction task failed: {e}")))?
    }

    async fn run(&self, program: &str, args: &[String], working_dir: &Path) -> Result<()> {
        let shown = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %shown, dir = %working_dir.display(), "Running install step");

        let output = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::execution(&shown, format!("failed to spawn: {e}"), None))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Err(Error::execution(
            &shown,
            format!("exited with {}\n{}", output.status, tail.join("\n")),
            output.status.code(),
        ))
    }

    async fn publish(&self, from: &Path, to: &Path) -> Result<()> {
        if tokio::fs::try_exists(to).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(to)
                .await
                .map_err(|e| Error::io(e, to, "remove stale install"))?;
        }
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| Error::io(e, to, "publish install"))
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| Error::io(e, path, "remove directory"))
    }
}
