//! Paginated listing over the versioned object namespace
//!
//! Four listing modes share one pagination mechanic: pages of
//! `min(max_keys, 1000)` rows are pulled from the metadata store with an
//! `(after_key, after_version)` cursor until either enough entries have
//! been emitted (truncated) or the store returns a short page (done). The
//! engine trusts the store's (key asc, version desc) ordering and performs
//! no re-sorting of its own.

pub mod token;

use crate::meta::{MetaError, MetadataStore};
use crate::types::{BucketInfo, ConflictCursor, MultipartUpload, ObjectVersion, VersionState, Versioning};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Hard ceiling on a single listing page, matching S3.
const MAX_PAGE: u32 = 1000;

/// Errors surfaced by the listing engine
#[derive(Debug, Error)]
pub enum ListError {
    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error("listing cancelled")]
    Cancelled,
}

/// Clamp a raw `max-keys` query value to [1, 1000]. Absent, non-numeric,
/// and non-positive inputs all default to 1000.
pub fn clamp_max_keys(raw: Option<&str>) -> u32 {
    match raw {
        None => MAX_PAGE,
        Some(s) => match s.trim().parse::<i64>() {
            Ok(n) if n >= 1 => (n as u64).min(MAX_PAGE as u64) as u32,
            _ => MAX_PAGE,
        },
    }
}

/// Validate the `encoding-type` query value. Returns true when keys must be
/// URL-encoded in the response.
pub fn parse_encoding_type(raw: Option<&str>) -> Result<bool, ListError> {
    match raw {
        None | Some("") => Ok(false),
        Some("url") => Ok(true),
        Some(other) => Err(ListError::InvalidArgument(format!(
            "Invalid Encoding Method specified in Request: {other}"
        ))),
    }
}

/// Fold `key` into a delimiter-bounded common prefix, if the delimiter
/// occurs in the part of the key after `prefix`.
fn fold_common_prefix(prefix: &str, delimiter: &str, key: &str) -> Option<String> {
    let rest = &key[prefix.len()..];
    rest.find(delimiter)
        .map(|idx| format!("{prefix}{}", &rest[..idx + delimiter.len()]))
}

/// One page of a flat (V1/V2) object listing.
#[derive(Debug, Default)]
pub struct ObjectPage {
    pub contents: Vec<ObjectVersion>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// V2: opaque token resuming after the last processed row.
    pub next_continuation_token: Option<String>,
    /// V1: last processed key.
    pub next_marker: Option<String>,
}

/// Version row as emitted to clients: null versions already surface as the
/// literal "null" version ID.
#[derive(Debug, Clone)]
pub struct VersionRow {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub etag: String,
    pub size: u64,
    pub last_modified: String,
}

/// Delete marker row as emitted to clients.
#[derive(Debug, Clone)]
pub struct DeleteMarkerRow {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: String,
}

/// One page of a Versions listing.
#[derive(Debug, Default)]
pub struct VersionsPage {
    pub versions: Vec<VersionRow>,
    pub delete_markers: Vec<DeleteMarkerRow>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

/// One page of a MultipartUploads listing.
#[derive(Debug, Default)]
pub struct MultipartPage {
    pub uploads: Vec<MultipartUpload>,
    pub is_truncated: bool,
}

/// One page of the conflicts listing.
#[derive(Debug, Default)]
pub struct ConflictPage {
    pub items: Vec<ObjectVersion>,
    pub next: Option<ConflictCursor>,
}

/// Listing engine over a metadata store.
#[derive(Clone)]
pub struct ListingEngine {
    store: Arc<dyn MetadataStore>,
    cancel: CancellationToken,
}

impl ListingEngine {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Scope this engine to a request cancellation token. Cancellation is
    /// observed before each metadata-store page; partial progress is
    /// discarded.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cancel,
        }
    }

    fn check_cancel(&self) -> Result<(), ListError> {
        if self.cancel.is_cancelled() {
            Err(ListError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// ListObjectsV2: continuation-token (or start-after) driven flat
    /// listing with delimiter folding.
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: u32,
        continuation_token: Option<&str>,
        start_after: Option<&str>,
    ) -> Result<ObjectPage, ListError> {
        let (after_key, after_version) = match continuation_token {
            Some(tok) => token::decode_continuation(tok),
            None => (start_after.unwrap_or("").to_string(), String::new()),
        };
        let mut page = self
            .walk_flat(bucket, prefix, delimiter, max_keys, after_key, after_version)
            .await?;
        if page.is_truncated {
            if let Some(last_key) = page.next_marker.as_deref().filter(|k| !k.is_empty()) {
                page.next_continuation_token = Some(token::encode_continuation(
                    last_key,
                    page.next_marker_version.as_deref().unwrap_or(""),
                ));
            }
        }
        Ok(ObjectPage {
            contents: page.contents,
            common_prefixes: page.common_prefixes,
            is_truncated: page.is_truncated,
            next_continuation_token: page.next_continuation_token,
            next_marker: None,
        })
    }

    /// ListObjects (V1): marker-driven flat listing.
    pub async fn list_objects_v1(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: u32,
        marker: Option<&str>,
    ) -> Result<ObjectPage, ListError> {
        let page = self
            .walk_flat(
                bucket,
                prefix,
                delimiter,
                max_keys,
                marker.unwrap_or("").to_string(),
                String::new(),
            )
            .await?;
        Ok(ObjectPage {
            contents: page.contents,
            common_prefixes: page.common_prefixes,
            is_truncated: page.is_truncated,
            next_continuation_token: None,
            next_marker: if page.is_truncated { page.next_marker } else { None },
        })
    }

    async fn walk_flat(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: u32,
        mut after_key: String,
        mut after_version: String,
    ) -> Result<FlatWalk, ListError> {
        let page_size = max_keys.min(MAX_PAGE) as usize;
        let mut walk = FlatWalk::default();
        let mut seen_prefixes = BTreeSet::new();
        let mut count = 0u32;
        let delimiter = delimiter.filter(|d| !d.is_empty());

        'pages: loop {
            self.check_cancel()?;
            let rows = self
                .store
                .list_objects(bucket, prefix, &after_key, &after_version, page_size)
                .await?;
            let short_page = rows.len() < page_size;
            for row in rows {
                after_key = row.key.clone();
                after_version = row.version_id.clone();
                // The store is expected to honor the prefix; skip strays.
                if !row.key.starts_with(prefix) {
                    continue;
                }
                if let Some(delim) = delimiter.as_deref() {
                    if let Some(folded) = fold_common_prefix(prefix, delim, &row.key) {
                        if seen_prefixes.insert(folded.clone()) {
                            walk.common_prefixes.push(folded);
                            count += 1;
                            if count >= max_keys {
                                walk.is_truncated = true;
                                break 'pages;
                            }
                        }
                        continue;
                    }
                }
                walk.contents.push(row);
                count += 1;
                if count >= max_keys {
                    walk.is_truncated = true;
                    break 'pages;
                }
            }
            if short_page {
                walk.is_truncated = false;
                break;
            }
        }
        walk.next_marker = Some(after_key);
        walk.next_marker_version = Some(after_version);
        Ok(walk)
    }

    /// ListObjectVersions: every version of every key, newest first, with
    /// IsLatest resolution and delete markers split out.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_versions(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: u32,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionsPage, ListError> {
        // Disabled (never-enabled) buckets have no version history to
        // paginate; skip the store entirely.
        if self.store.bucket_versioning(bucket).await? == Versioning::Disabled {
            return Ok(VersionsPage::default());
        }

        let mut after_key = key_marker.unwrap_or("").to_string();
        let mut after_version = version_id_marker.unwrap_or("").to_string();
        // Clients address the null version by the literal "null"; resolve
        // it to the concrete version ID before cursoring. On failure the
        // literal is used as-is, which loses the marker position for that
        // one key.
        if after_version == "null" && !after_key.is_empty() {
            match self.store.get_null_object_version(bucket, &after_key).await {
                Ok(Some(null_version)) => after_version = null_version.version_id,
                Ok(None) => {
                    warn!(bucket, key = %after_key, "null version-id-marker did not resolve");
                }
                Err(e) => {
                    warn!(bucket, key = %after_key, error = %e, "null version-id-marker lookup failed");
                }
            }
        }

        let page_size = max_keys.min(MAX_PAGE) as usize;
        let delimiter = delimiter.filter(|d| !d.is_empty());
        let mut page = VersionsPage::default();
        let mut seen_prefixes = BTreeSet::new();
        let mut count = 0u32;
        let mut prev_emitted_key: Option<String> = None;
        let mut last_is_null = false;

        'pages: loop {
            self.check_cancel()?;
            let rows = self
                .store
                .list_object_versions(bucket, prefix, &after_key, &after_version, page_size)
                .await?;
            let short_page = rows.len() < page_size;
            for row in rows {
                after_key = row.key.clone();
                after_version = row.version_id.clone();
                last_is_null = row.is_null;
                if !row.key.starts_with(prefix) {
                    continue;
                }
                if let Some(delim) = delimiter.as_deref() {
                    if let Some(folded) = fold_common_prefix(prefix, delim, &row.key) {
                        if seen_prefixes.insert(folded.clone()) {
                            page.common_prefixes.push(folded);
                            count += 1;
                            if count >= max_keys {
                                page.is_truncated = true;
                                break 'pages;
                            }
                        }
                        continue;
                    }
                }
                // First emitted row per key carries IsLatest. The store
                // returns versions of a key contiguously and newest first,
                // so a key change marks a fresh newest version.
                let is_latest = prev_emitted_key.as_deref() != Some(row.key.as_str());
                prev_emitted_key = Some(row.key.clone());
                let version_id = row.display_version_id().to_string();
                match row.state {
                    VersionState::DeleteMarker => page.delete_markers.push(DeleteMarkerRow {
                        key: row.key,
                        version_id,
                        is_latest,
                        last_modified: row.last_modified,
                    }),
                    VersionState::Active | VersionState::Conflict => {
                        page.versions.push(VersionRow {
                            key: row.key,
                            version_id,
                            is_latest,
                            etag: row.etag,
                            size: row.size,
                            last_modified: row.last_modified,
                        })
                    }
                }
                count += 1;
                if count >= max_keys {
                    page.is_truncated = true;
                    break 'pages;
                }
            }
            if short_page {
                page.is_truncated = false;
                break;
            }
        }

        if page.is_truncated {
            page.next_key_marker = Some(after_key);
            page.next_version_id_marker = Some(if last_is_null {
                "null".to_string()
            } else {
                after_version
            });
        }
        Ok(page)
    }

    /// ListMultipartUploads: flat page, pagination stubbed out (never
    /// truncated).
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        max_uploads: u32,
    ) -> Result<MultipartPage, ListError> {
        self.check_cancel()?;
        let uploads = self
            .store
            .list_multipart_uploads(bucket, prefix, max_uploads.min(MAX_PAGE) as usize)
            .await?;
        Ok(MultipartPage {
            uploads,
            is_truncated: false,
        })
    }

    /// All buckets, for ListAllMyBucketsResult.
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>, ListError> {
        self.check_cancel()?;
        Ok(self.store.list_buckets().await?)
    }

    /// Conflict-state versions across the namespace, as served by the JSON
    /// conflicts endpoint. `limit` must be in (0, 10000].
    pub async fn list_conflicts(
        &self,
        bucket: &str,
        prefix: &str,
        after: Option<ConflictCursor>,
        limit: i64,
    ) -> Result<ConflictPage, ListError> {
        if limit <= 0 || limit > 10_000 {
            return Err(ListError::InvalidArgument(format!(
                "limit must be in (0, 10000], got {limit}"
            )));
        }
        self.check_cancel()?;
        let items = self
            .store
            .list_conflicts(bucket, prefix, after.as_ref(), limit as usize)
            .await?;
        let next = (items.len() == limit as usize)
            .then(|| {
                items.last().map(|last| ConflictCursor {
                    bucket: last.bucket.clone(),
                    key: last.key.clone(),
                    version_id: last.version_id.clone(),
                })
            })
            .flatten();
        Ok(ConflictPage { items, next })
    }
}

#[derive(Debug, Default)]
struct FlatWalk {
    contents: Vec<ObjectVersion>,
    common_prefixes: Vec<String>,
    is_truncated: bool,
    next_marker: Option<String>,
    next_marker_version: Option<String>,
    next_continuation_token: Option<String>,
}
