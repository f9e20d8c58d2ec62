//! Download configuration accepted at `start`.
//!
//! This is the wire shape a caller hands over the command-dispatch boundary.
//! It is validated into a `TransferRequest` before any native transfer exists.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::TransferError;
use super::types::TransferRequest;

const MISSING_REQUIRED: &str = "missing or invalid configuration. \
    The configuration should at least have targetFile and downloadURL.";

/// Configuration for a background download task.
///
/// ```json
/// {
///   "targetFile": "/path/to/local/file",
///   "downloadURL": "https://example.com/file",
///   "requestHeaders": { "Authorization": "Bearer ..." },
///   "sessionId": "sync-42",
///   "downloadDelay": 2
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfiguration {
    /// Path to the local file that receives the download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<String>,
    /// URL to download from.
    #[serde(
        default,
        rename = "downloadURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
    /// Headers added verbatim to the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,
    /// Identifier grouping related transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Delay in seconds before the first request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_delay: Option<f64>,
    /// Pattern identifying the same resource behind different URIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_matcher: Option<String>,
    /// Title for facilities that show a system notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_title: Option<String>,
}

impl DownloadConfiguration {
    /// Create a configuration with the two required fields.
    pub fn new(download_url: impl Into<String>, target_file: impl Into<String>) -> Self {
        Self {
            target_file: Some(target_file.into()),
            download_url: Some(download_url.into()),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, TransferError> {
        serde_json::from_str(json).map_err(|e| {
            TransferError::configuration(format!("{MISSING_REQUIRED} ({e})"))
        })
    }

    /// Validate into an immutable transfer request.
    pub fn into_request(self) -> Result<TransferRequest, TransferError> {
        let (Some(download_url), Some(target_file)) = (self.download_url, self.target_file) else {
            return Err(TransferError::configuration(MISSING_REQUIRED));
        };

        let mut request = TransferRequest::new(&download_url, &target_file)?
            .with_headers(self.request_headers.unwrap_or_default());

        if let Some(session_id) = self.session_id {
            request = request.with_session_id(session_id);
        }
        if let Some(title) = self.notification_title {
            request = request.with_notification_title(title);
        }
        if let Some(pattern) = self.uri_matcher.as_deref().filter(|p| !p.is_empty()) {
            request = request.with_uri_matcher(pattern)?;
        }
        if let Some(secs) = self.download_delay {
            match Duration::try_from_secs_f64(secs) {
                Ok(delay) if delay.is_zero() => {}
                Ok(delay) => request = request.with_download_delay(delay),
                Err(e) => {
                    tracing::warn!(download_delay = secs, error = %e, "Ignoring invalid downloadDelay");
                }
            }
        }

        Ok(request)
    }
}
