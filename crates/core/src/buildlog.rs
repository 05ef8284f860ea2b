//! Build log upload to the management API
//!
//! The captured build output is posted to `<api>/buildlogs`; the uuid in the
//! response becomes a link into the management UI. Upload is best effort
//! and never changes a build's outcome.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::{Error, Result};

/// Build log as exchanged with the management API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLog {
    /// Captured output
    pub contents: String,
    /// Server-assigned id, present in responses
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

/// Posts captured build output to the management API
#[derive(Debug, Clone)]
pub struct LogPublisher {
    client: Client,
    settings: Settings,
}

impl LogPublisher {
    /// Publisher using the endpoints and token from `settings`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(settings: Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    /// Upload `contents` and return the URL to view it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] on transport failure, a non-200 status
    /// (with the response body) or an unreadable response.
    pub async fn upload(&self, contents: impl Into<String>) -> Result<String> {
        let log = BuildLog {
            contents: contents.into(),
            uuid: String::new(),
        };

        let mut request = self
            .client
            .post(self.settings.api_endpoint("buildlogs"))
            .json(&log);
        if let Some(token) = self.settings.api_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::upload(format!("request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upload(format!("status {status}: {}", body.trim())));
        }

        let stored: BuildLog = response
            .json()
            .await
            .map_err(|e| Error::upload(format!("unreadable response: {e}")))?;
        if stored.uuid.is_empty() {
            return Err(Error::upload("response did not include a build log id"));
        }

        Ok(self
            .settings
            .management_link(&format!("buildlogs/{}", stored.uuid)))
    }

    /// Upload `contents`, logging instead of failing.
    ///
    /// Returns the view URL when the upload succeeded.
    pub async fn publish(&self, contents: impl Into<String>) -> Option<String> {
        info!("Uploading build logs...");
        match self.upload(contents).await {
            Ok(url) => {
                info!(%url, "Build log uploaded");
                Some(url)
            }
            Err(e) => {
                warn!(error = %e, "Build log upload failed");
                None
            }
        }
    }
}
