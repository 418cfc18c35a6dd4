//! Core types for the Seglake versioned object namespace

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool version identifier — uses crate name and version from Cargo.toml
pub const SEGLAKE_TOOL: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// State of a single object version as recorded by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    /// Regular readable version.
    Active,
    /// Versioned tombstone hiding prior versions without physical deletion.
    DeleteMarker,
    /// Version whose replicas disagree; readable but flagged on egress.
    Conflict,
}

/// Bucket versioning state. `Disabled` means versioning was never enabled;
/// such buckets hold at most a single null version per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Versioning {
    #[default]
    Disabled,
    Enabled,
    Suspended,
}

impl Versioning {
    /// S3 wire value for GetBucketVersioning. Disabled buckets render an
    /// empty configuration, so they have no status string.
    pub fn status_str(&self) -> Option<&'static str> {
        match self {
            Versioning::Disabled => None,
            Versioning::Enabled => Some("Enabled"),
            Versioning::Suspended => Some("Suspended"),
        }
    }
}

/// One row of the versioned namespace, as returned by the metadata store.
///
/// `last_modified` is kept as the stored RFC3339Nano string and only
/// re-rendered at the wire boundary; see [`format_last_modified`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
    pub bucket: String,
    pub key: String,
    pub version_id: String,
    /// Opaque hex digest; quoted only at the wire boundary.
    pub etag: String,
    pub size: u64,
    pub last_modified: String,
    pub state: VersionState,
    /// The single non-versioned version of a key that predates or bypasses
    /// versioning; surfaces externally as versionId="null".
    pub is_null: bool,
}

impl ObjectVersion {
    /// ETag value as rendered in XML and headers (quoted).
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }

    /// Version ID as surfaced to clients: the literal "null" for null
    /// versions irrespective of the internal UUID.
    pub fn display_version_id(&self) -> &str {
        if self.is_null {
            "null"
        } else {
            &self.version_id
        }
    }
}

/// Bucket descriptor for ListBuckets.
#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// In-flight multipart upload descriptor.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    pub key: String,
    pub upload_id: String,
    /// Stored RFC3339Nano, re-rendered like object timestamps.
    pub initiated: String,
}

/// Cursor into the cross-bucket conflict listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCursor {
    pub bucket: String,
    pub key: String,
    pub version_id: String,
}

/// Re-render a stored RFC3339Nano timestamp as RFC3339 in UTC
/// (`YYYY-MM-DDTHH:MM:SSZ`). Malformed stored values pass through unchanged.
pub fn format_last_modified(stored: &str) -> String {
    match DateTime::parse_from_rfc3339(stored) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        Err(_) => stored.to_string(),
    }
}

/// Render a stored timestamp as an HTTP date for the Last-Modified header.
/// Falls back to the stored string when it does not parse.
pub fn format_http_date(stored: &str) -> String {
    match DateTime::parse_from_rfc3339(stored) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
        Err(_) => stored.to_string(),
    }
}

/// Current time in the stored RFC3339Nano representation.
pub fn now_rfc3339nano() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Errors produced by [`validate_bucket_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNameError(String);

impl fmt::Display for BucketNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BucketNameError {}

impl BucketNameError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

const PROHIBITED_PREFIXES: &[&str] = &["xn--", "sthree-", "amzn-s3-demo-"];
const PROHIBITED_SUFFIXES: &[&str] = &["-s3alias", "--ol-s3", ".mrap", "--x-s3", "--table-s3"];

/// Enforce the S3 bucket naming rules. Called before any storage operation
/// that takes a bucket name from the client.
pub fn validate_bucket_name(name: &str) -> Result<(), BucketNameError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(BucketNameError::new(
            "Bucket name must be between 3 and 63 characters long",
        ));
    }
    for prefix in PROHIBITED_PREFIXES {
        if name.starts_with(prefix) {
            return Err(BucketNameError::new(format!(
                "Bucket name must not start with '{prefix}'"
            )));
        }
    }
    for suffix in PROHIBITED_SUFFIXES {
        if name.ends_with(suffix) {
            return Err(BucketNameError::new(format!(
                "Bucket name must not end with '{suffix}'"
            )));
        }
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return Err(BucketNameError::new(
            "Bucket name may only contain lowercase letters, digits, '.' and '-'",
        ));
    }
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    for edge in [first, last] {
        if !(edge.is_ascii_lowercase() || edge.is_ascii_digit()) {
            return Err(BucketNameError::new(
                "Bucket name must begin and end with a letter or digit",
            ));
        }
    }
    for pair in ["..", ".-", "-."] {
        if name.contains(pair) {
            return Err(BucketNameError::new(format!(
                "Bucket name must not contain '{pair}'"
            )));
        }
    }
    if name.parse::<std::net::IpAddr>().is_ok() {
        return Err(BucketNameError::new(
            "Bucket name must not be formatted as an IP address",
        ));
    }
    for label in name.split('.') {
        if label.is_empty() {
            return Err(BucketNameError::new(
                "Bucket name must not contain empty dot-separated labels",
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(BucketNameError::new(
                "Bucket name labels must not begin or end with '-'",
            ));
        }
    }
    Ok(())
}
