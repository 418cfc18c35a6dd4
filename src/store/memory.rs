//! In-memory blob engine backing the gateway binary and the test suites.

use super::{BlobInfo, ObjectStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Blobs keyed by (bucket, key, version).
#[derive(Default)]
pub struct MemoryObjectStore {
    blobs: RwLock<HashMap<(String, String, String), Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn blob_key(bucket: &str, key: &str, version_id: &str) -> (String, String, String) {
    (bucket.to_string(), key.to_string(), version_id.to_string())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        data: Bytes,
    ) -> Result<BlobInfo, StoreError> {
        let info = BlobInfo {
            etag: hex::encode(Md5::digest(&data)),
            size: data.len() as u64,
        };
        self.blobs
            .write()
            .insert(blob_key(bucket, key, version_id), data);
        Ok(info)
    }

    async fn get(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<(BlobInfo, BoxStream<'static, Result<Bytes, StoreError>>), StoreError> {
        let data = self
            .blobs
            .read()
            .get(&blob_key(bucket, key, version_id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{bucket}/{key}@{version_id}")))?;
        let info = BlobInfo {
            etag: hex::encode(Md5::digest(&data)),
            size: data.len() as u64,
        };
        Ok((info, Box::pin(stream::once(async move { Ok(data) }))))
    }

    async fn delete(&self, bucket: &str, key: &str, version_id: &str) -> Result<(), StoreError> {
        self.blobs.write().remove(&blob_key(bucket, key, version_id));
        Ok(())
    }
}
