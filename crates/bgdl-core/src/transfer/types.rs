//! Core domain types for transfers.
//!
//! Pure data types with no I/O dependencies.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::TransferError;

/// De-duplication key for a transfer, derived from the destination path.
///
/// Two requests whose destinations normalize to the same tag target the same
/// file and can never run concurrently.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferTag(String);

impl TransferTag {
    /// Normalize a caller-visible destination into a tag.
    ///
    /// Strips a `file://` scheme, unifies separators to `/`, drops empty and
    /// `.` segments and folds `..` lexically. The file system is not touched.
    pub fn from_destination(destination: &str) -> Result<Self, TransferError> {
        let trimmed = destination.trim();
        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        if path.is_empty() {
            return Err(TransferError::configuration(
                "missing or invalid configuration: targetFile is empty",
            ));
        }

        let unified = path.replace('\\', "/");
        let absolute = unified.starts_with('/');
        let mut parts: Vec<&str> = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if parts.last().is_some_and(|p| *p != "..") {
                        parts.pop();
                    } else if !absolute {
                        parts.push("..");
                    }
                }
                other => parts.push(other),
            }
        }

        if parts.is_empty() || parts.last() == Some(&"..") {
            return Err(TransferError::configuration(format!(
                "missing or invalid configuration: targetFile '{destination}' does not name a file"
            )));
        }

        let joined = parts.join("/");
        Ok(Self(if absolute { format!("/{joined}") } else { joined }))
    }

    /// The normalized destination string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The normalized destination as a path.
    #[must_use]
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// Last segment of the destination (the file name).
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TransferTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier assigned by the native transfer facility.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeHandleId(String);

impl NativeHandleId {
    /// Wrap a facility-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NativeHandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Native transfer created or attached, no data yet.
    Pending,
    /// Bytes are flowing.
    Active,
    /// Payload received and moved into the destination.
    Completed,
    /// Transfer or finalization failed.
    Failed,
    /// Cancelled by the owner before reaching another terminal state.
    Cancelled,
}

impl TransferStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether this status occupies its tag (`Pending` or `Active`).
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regular expression used to recognize the same remote resource behind
/// different URIs (e.g. signed URLs whose query string rotates).
#[derive(Clone, Debug)]
pub struct UriMatcher {
    pattern: Regex,
}

impl UriMatcher {
    /// Compile a matcher pattern.
    pub fn new(pattern: &str) -> Result<Self, TransferError> {
        Regex::new(pattern)
            .map(|pattern| Self { pattern })
            .map_err(|e| TransferError::configuration(format!("invalid uriMatcher: {e}")))
    }

    /// The source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// First match of the pattern in `uri`.
    #[must_use]
    pub fn first_match<'a>(&self, uri: &'a str) -> Option<&'a str> {
        self.pattern.find(uri).map(|m| m.as_str())
    }

    /// Whether both URIs contain the pattern and the first matches are equal.
    #[must_use]
    pub fn same_resource(&self, a: &str, b: &str) -> bool {
        match (self.first_match(a), self.first_match(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

/// An immutable request to download `source_uri` into `destination_path`.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    source_uri: Url,
    destination_path: PathBuf,
    tag: TransferTag,
    request_headers: BTreeMap<String, String>,
    session_id: Option<String>,
    uri_matcher: Option<UriMatcher>,
    notification_title: Option<String>,
    download_delay: Option<Duration>,
}

impl TransferRequest {
    /// Create a request, validating the source URI and destination.
    pub fn new(source_uri: &str, destination: impl AsRef<Path>) -> Result<Self, TransferError> {
        let source_uri = parse_source_uri(source_uri)?;
        let destination = destination.as_ref().to_string_lossy();
        let tag = TransferTag::from_destination(&destination)?;

        Ok(Self {
            source_uri,
            destination_path: tag.to_path(),
            tag,
            request_headers: BTreeMap::new(),
            session_id: None,
            uri_matcher: None,
            notification_title: None,
            download_delay: None,
        })
    }

    /// Add a request header, passed through verbatim.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    /// Add several request headers.
    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.request_headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the session grouping identifier.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the URI matcher used during reconciliation.
    pub fn with_uri_matcher(mut self, pattern: &str) -> Result<Self, TransferError> {
        self.uri_matcher = Some(UriMatcher::new(pattern)?);
        Ok(self)
    }

    /// Set the title shown by facilities that surface a notification.
    #[must_use]
    pub fn with_notification_title(mut self, title: impl Into<String>) -> Self {
        self.notification_title = Some(title.into());
        self
    }

    /// Delay before the facility issues its first request.
    #[must_use]
    pub const fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    /// The absolute source URL.
    #[must_use]
    pub const fn source_uri(&self) -> &Url {
        &self.source_uri
    }

    /// The caller-visible final location.
    #[must_use]
    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    /// The de-duplication tag derived from the destination.
    #[must_use]
    pub const fn tag(&self) -> &TransferTag {
        &self.tag
    }

    /// Request headers.
    #[must_use]
    pub const fn request_headers(&self) -> &BTreeMap<String, String> {
        &self.request_headers
    }

    /// Session grouping identifier.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// URI matcher, if configured.
    #[must_use]
    pub const fn uri_matcher(&self) -> Option<&UriMatcher> {
        self.uri_matcher.as_ref()
    }

    /// Notification title, if configured.
    #[must_use]
    pub fn notification_title(&self) -> Option<&str> {
        self.notification_title.as_deref()
    }

    /// Delay before the first request, if configured.
    #[must_use]
    pub const fn download_delay(&self) -> Option<Duration> {
        self.download_delay
    }
}

fn parse_source_uri(source_uri: &str) -> Result<Url, TransferError> {
    let trimmed = source_uri.trim();
    if trimmed.is_empty() {
        return Err(TransferError::configuration(
            "missing or invalid configuration: downloadURL is empty",
        ));
    }

    let url = Url::parse(trimmed).map_err(|e| {
        TransferError::configuration(format!(
            "missing or invalid configuration: downloadURL '{trimmed}' is not an absolute URL ({e})"
        ))
    })?;

    if matches!(url.scheme(), "http" | "https") && url.has_host() {
        Ok(url)
    } else {
        Err(TransferError::configuration(format!(
            "missing or invalid configuration: unsupported downloadURL '{trimmed}'"
        )))
    }
}

/// Registry entry describing one known transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// De-duplication key.
    pub tag: TransferTag,
    /// Identifier assigned by the native facility.
    pub native_handle_id: NativeHandleId,
    /// Source URI the transfer was created for.
    pub source_uri: String,
    /// Current lifecycle state.
    pub status: TransferStatus,
    /// Bytes received so far.
    pub bytes_received: u64,
    /// Total bytes, 0 until the facility reports it.
    pub bytes_total: u64,
    /// Description of the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TransferRecord {
    /// Create a pending record.
    pub fn new(
        tag: TransferTag,
        native_handle_id: NativeHandleId,
        source_uri: impl Into<String>,
    ) -> Self {
        Self {
            tag,
            native_handle_id,
            source_uri: source_uri.into(),
            status: TransferStatus::Pending,
            bytes_received: 0,
            bytes_total: 0,
            last_error: None,
        }
    }

    /// Set the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: TransferStatus) -> Self {
        self.status = status;
        self
    }

    /// Apply a native progress report.
    ///
    /// Returns `false` when the report is stale (fewer bytes than already
    /// recorded) and was dropped. The first report with a known total moves
    /// a pending record to `Active`.
    pub fn apply_progress(&mut self, bytes_received: u64, bytes_total: u64) -> bool {
        if self.status.is_terminal() || bytes_received < self.bytes_received {
            return false;
        }
        self.bytes_received = bytes_received;
        if bytes_total > 0 {
            self.bytes_total = bytes_total;
            if self.status == TransferStatus::Pending {
                self.status = TransferStatus::Active;
            }
        }
        true
    }

    /// Record a failure.
    pub fn fail(&mut self, error: &TransferError) {
        self.status = TransferStatus::Failed;
        self.last_error = Some(error.to_string());
    }
}
