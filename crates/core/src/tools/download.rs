//! URL-keyed download cache.
//!
//! Each download lands in `<root>/<sha256(url)>/<file-name>`. A file that
//! exists there is complete: bodies are streamed to a `.partial` sibling and
//! renamed only after the last chunk is written.

use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{Error, Result};

/// Shared cache of downloaded archives
#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
    client: Client,
}

impl DownloadCache {
    /// Create a cache rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            root: root.into(),
            client,
        })
    }

    /// Cache root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `url` is (or would be) cached.
    #[must_use]
    pub fn cached_path(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        self.root.join(digest).join(file_name_from_url(url))
    }

    /// Return the cached file for `url`, downloading it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolDownload`] for transport failures and non-success
    /// statuses, and [`Error::CacheUnwritable`] if the cache cannot be written.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf> {
        let path = self.cached_path(url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(%url, path = %path.display(), "Download cache hit");
            return Ok(path);
        }

        let Some(dir) = path.parent() else {
            return Err(Error::configuration(format!(
                "Invalid download cache path {}",
                path.display()
            )));
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::cache_unwritable(dir, e))?;

        info!(%url, "Downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::tool_download(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::tool_download(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let partial = path.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| Error::cache_unwritable(&partial, e))?;

        let written = async {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| Error::tool_download(url, e.to_string()))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| Error::cache_unwritable(&partial, e))?;
            }
            file.flush()
                .await
                .map_err(|e| Error::cache_unwritable(&partial, e))
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| Error::io(e, &path, "rename download"))?;
        debug!(%url, path = %path.display(), "Download cached");
        Ok(path)
    }
}

/// Last path segment of `url`, without query or fragment.
fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
        .to_string()
}
