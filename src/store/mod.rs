//! Object (blob) engine contract
//!
//! The gateway consumes the blob engine through this narrow surface: the
//! decoded bytes of an upload go in, a byte stream comes back out. Blob
//! layout, durability, and compaction are the engine's business.

mod memory;

pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors that can occur during blob operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Other(String),
}

/// Descriptor of a stored blob.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    /// MD5 of the content, lowercase hex, unquoted.
    pub etag: String,
    pub size: u64,
}

/// Abstract blob engine keyed by (bucket, key, version).
///
/// This trait is object-safe and used as `Arc<dyn ObjectStore>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the decoded bytes of one object version.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        data: Bytes,
    ) -> Result<BlobInfo, StoreError>;

    /// Stream a blob's contents without requiring the caller to hold the
    /// whole object.
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(BlobInfo, BoxStream<'static, Result<Bytes, StoreError>>), StoreError>;

    /// Drop one object version's bytes.
    async fn delete(&self, bucket: &str, key: &str, version_id: &str) -> Result<(), StoreError>;
}
