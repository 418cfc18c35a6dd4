//! Metadata store contract
//!
//! The listing engine consumes this query surface only; schema and
//! transactions belong to the store implementation. Every listing method
//! returns a finite, totally ordered slice: keys ascending, versions of a
//! key contiguous and newest first, resumable via an
//! `(after_key, after_version)` cursor.

mod memory;

pub use memory::MemoryMetaStore;

use crate::types::{BucketInfo, ConflictCursor, MultipartUpload, ObjectVersion, Versioning};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a metadata store implementation
#[derive(Debug, Clone, Error)]
pub enum MetaError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("metadata store error: {0}")]
    Store(String),
}

/// Query surface of the versioned metadata store.
///
/// This trait is object-safe and used as `Arc<dyn MetadataStore>`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Check whether a bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MetaError>;

    /// Versioning state of a bucket.
    async fn bucket_versioning(&self, bucket: &str) -> Result<Versioning, MetaError>;

    /// All buckets, name ascending.
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, MetaError>;

    /// Latest live version per key (delete markers hidden), key ascending,
    /// starting strictly after `after_key` when non-empty. At most `limit`
    /// rows.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        after_key: &str,
        after_version: &str,
        limit: usize,
    ) -> Result<Vec<ObjectVersion>, MetaError>;

    /// Every version including delete markers, key ascending then newest
    /// version first, starting strictly after `(after_key, after_version)`.
    /// An empty `after_version` positions after all versions of
    /// `after_key`.
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        after_key: &str,
        after_version: &str,
        limit: usize,
    ) -> Result<Vec<ObjectVersion>, MetaError>;

    /// In-flight multipart uploads, key ascending.
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<MultipartUpload>, MetaError>;

    /// Conflict-state versions across buckets (or one bucket when `bucket`
    /// is non-empty), ordered (bucket asc, key asc, version desc).
    async fn list_conflicts(
        &self,
        bucket: &str,
        prefix: &str,
        after: Option<&ConflictCursor>,
        limit: usize,
    ) -> Result<Vec<ObjectVersion>, MetaError>;

    /// Resolve the concrete version row of the null version for a key, if
    /// one exists.
    async fn get_null_object_version(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectVersion>, MetaError>;
}
