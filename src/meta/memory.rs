//! In-memory metadata store
//!
//! Backs the gateway binary and the test suites. Keeps the same ordering
//! contract a persistent store must honor: keys ascending, versions of a
//! key contiguous and newest first, stable across paginated reads.

use super::{MetaError, MetadataStore};
use crate::types::{
    now_rfc3339nano, BucketInfo, ConflictCursor, MultipartUpload, ObjectVersion, VersionState,
    Versioning,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct VersionRecord {
    version_id: String,
    etag: String,
    size: u64,
    last_modified: String,
    state: VersionState,
    is_null: bool,
}

#[derive(Debug)]
struct BucketRecord {
    created_at: chrono::DateTime<Utc>,
    versioning: Versioning,
    /// Versions newest first.
    objects: BTreeMap<String, Vec<VersionRecord>>,
    /// Keyed by (object key, upload id) so iteration is key-ascending.
    uploads: BTreeMap<(String, String), MultipartUpload>,
}

impl BucketRecord {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            versioning: Versioning::Disabled,
            objects: BTreeMap::new(),
            uploads: BTreeMap::new(),
        }
    }
}

/// In-memory implementation of [`MetadataStore`] plus the write surface the
/// gateway handlers use.
#[derive(Default)]
pub struct MemoryMetaStore {
    buckets: RwLock<BTreeMap<String, BucketRecord>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bucket. Returns false when it already existed.
    pub fn create_bucket(&self, bucket: &str) -> bool {
        let mut buckets = self.buckets.write();
        if buckets.contains_key(bucket) {
            return false;
        }
        buckets.insert(bucket.to_string(), BucketRecord::new());
        true
    }

    /// Delete a bucket. The caller is responsible for the emptiness check.
    pub fn delete_bucket(&self, bucket: &str) -> Result<(), MetaError> {
        let mut buckets = self.buckets.write();
        buckets
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))
    }

    pub fn set_versioning(&self, bucket: &str, versioning: Versioning) -> Result<(), MetaError> {
        let mut buckets = self.buckets.write();
        let record = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        record.versioning = versioning;
        Ok(())
    }

    /// Record a new object version. On versioning-enabled buckets each put
    /// stacks a fresh version; otherwise the put replaces the null version.
    pub fn put_object_version(
        &self,
        bucket: &str,
        key: &str,
        etag: &str,
        size: u64,
    ) -> Result<ObjectVersion, MetaError> {
        let mut buckets = self.buckets.write();
        let record = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        let versioned = record.versioning == Versioning::Enabled;
        let row = VersionRecord {
            version_id: Uuid::new_v4().to_string(),
            etag: etag.to_string(),
            size,
            last_modified: now_rfc3339nano(),
            state: VersionState::Active,
            is_null: !versioned,
        };
        let versions = record.objects.entry(key.to_string()).or_default();
        if !versioned {
            versions.retain(|v| !v.is_null);
        }
        versions.insert(0, row.clone());
        Ok(to_object_version(bucket, key, &row))
    }

    /// Place a delete marker atop a key on a versioning-enabled bucket.
    pub fn put_delete_marker(&self, bucket: &str, key: &str) -> Result<ObjectVersion, MetaError> {
        let mut buckets = self.buckets.write();
        let record = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        let versioned = record.versioning == Versioning::Enabled;
        let row = VersionRecord {
            version_id: Uuid::new_v4().to_string(),
            etag: String::new(),
            size: 0,
            last_modified: now_rfc3339nano(),
            state: VersionState::DeleteMarker,
            is_null: !versioned,
        };
        let versions = record.objects.entry(key.to_string()).or_default();
        if !versioned {
            versions.retain(|v| !v.is_null);
        }
        versions.insert(0, row.clone());
        Ok(to_object_version(bucket, key, &row))
    }

    /// Remove every version of a key (unversioned delete).
    pub fn delete_object(&self, bucket: &str, key: &str) -> Result<(), MetaError> {
        let mut buckets = self.buckets.write();
        let record = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        record.objects.remove(key);
        Ok(())
    }

    /// Flag one version as Conflict. Returns false when the version was
    /// not found.
    pub fn mark_conflict(&self, bucket: &str, key: &str, version_id: &str) -> bool {
        let mut buckets = self.buckets.write();
        let Some(record) = buckets.get_mut(bucket) else {
            return false;
        };
        let Some(versions) = record.objects.get_mut(key) else {
            return false;
        };
        for version in versions.iter_mut() {
            if version.version_id == version_id {
                version.state = VersionState::Conflict;
                return true;
            }
        }
        false
    }

    /// Newest version of a key, delete markers included.
    pub fn get_latest(&self, bucket: &str, key: &str) -> Result<Option<ObjectVersion>, MetaError> {
        let buckets = self.buckets.read();
        let record = buckets
            .get(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        Ok(record
            .objects
            .get(key)
            .and_then(|versions| versions.first())
            .map(|row| to_object_version(bucket, key, row)))
    }

    /// Specific version of a key. The literal "null" selects the null
    /// version.
    pub fn get_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<Option<ObjectVersion>, MetaError> {
        let buckets = self.buckets.read();
        let record = buckets
            .get(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        Ok(record.objects.get(key).and_then(|versions| {
            versions
                .iter()
                .find(|v| {
                    if version_id == "null" {
                        v.is_null
                    } else {
                        v.version_id == version_id
                    }
                })
                .map(|row| to_object_version(bucket, key, row))
        }))
    }

    /// Register an in-flight multipart upload.
    pub fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<MultipartUpload, MetaError> {
        let mut buckets = self.buckets.write();
        let record = buckets
            .get_mut(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        let upload = MultipartUpload {
            key: key.to_string(),
            upload_id: Uuid::new_v4().to_string(),
            initiated: now_rfc3339nano(),
        };
        record
            .uploads
            .insert((key.to_string(), upload.upload_id.clone()), upload.clone());
        Ok(upload)
    }
}

fn to_object_version(bucket: &str, key: &str, row: &VersionRecord) -> ObjectVersion {
    ObjectVersion {
        bucket: bucket.to_string(),
        key: key.to_string(),
        version_id: row.version_id.clone(),
        etag: row.etag.clone(),
        size: row.size,
        last_modified: row.last_modified.clone(),
        state: row.state,
        is_null: row.is_null,
    }
}

#[async_trait]
impl MetadataStore for MemoryMetaStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MetaError> {
        Ok(self.buckets.read().contains_key(bucket))
    }

    async fn bucket_versioning(&self, bucket: &str) -> Result<Versioning, MetaError> {
        let buckets = self.buckets.read();
        buckets
            .get(bucket)
            .map(|record| record.versioning)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, MetaError> {
        let buckets = self.buckets.read();
        Ok(buckets
            .iter()
            .map(|(name, record)| BucketInfo {
                name: name.clone(),
                created_at: record.created_at,
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        after_key: &str,
        _after_version: &str,
        limit: usize,
    ) -> Result<Vec<ObjectVersion>, MetaError> {
        let buckets = self.buckets.read();
        let record = buckets
            .get(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        let range = if after_key.is_empty() {
            record.objects.range::<String, _>(..)
        } else {
            record.objects.range::<String, _>((
                Bound::Excluded(after_key.to_string()),
                Bound::Unbounded,
            ))
        };
        let mut out = Vec::new();
        for (key, versions) in range {
            if out.len() >= limit {
                break;
            }
            if !key.starts_with(prefix) {
                continue;
            }
            let Some(latest) = versions.first() else {
                continue;
            };
            if latest.state == VersionState::DeleteMarker {
                continue;
            }
            out.push(to_object_version(bucket, key, latest));
        }
        Ok(out)
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        after_key: &str,
        after_version: &str,
        limit: usize,
    ) -> Result<Vec<ObjectVersion>, MetaError> {
        let buckets = self.buckets.read();
        let record = buckets
            .get(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        let mut out = Vec::new();
        for (key, versions) in record.objects.iter() {
            if out.len() >= limit {
                break;
            }
            if !key.starts_with(prefix) {
                continue;
            }
            let skip_versions = match key.as_str().cmp(after_key) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => {
                    if after_version.is_empty() {
                        continue;
                    }
                    match versions.iter().position(|v| v.version_id == after_version) {
                        Some(pos) => pos + 1,
                        None => continue,
                    }
                }
                std::cmp::Ordering::Greater => 0,
            };
            for row in versions.iter().skip(skip_versions) {
                if out.len() >= limit {
                    break;
                }
                out.push(to_object_version(bucket, key, row));
            }
        }
        Ok(out)
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<MultipartUpload>, MetaError> {
        let buckets = self.buckets.read();
        let record = buckets
            .get(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        Ok(record
            .uploads
            .values()
            .filter(|upload| upload.key.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_conflicts(
        &self,
        bucket: &str,
        prefix: &str,
        after: Option<&ConflictCursor>,
        limit: usize,
    ) -> Result<Vec<ObjectVersion>, MetaError> {
        let buckets = self.buckets.read();
        let mut out = Vec::new();
        for (bucket_name, record) in buckets.iter() {
            if out.len() >= limit {
                break;
            }
            if !bucket.is_empty() && bucket_name != bucket {
                continue;
            }
            for (key, versions) in record.objects.iter() {
                if out.len() >= limit {
                    break;
                }
                if !key.starts_with(prefix) {
                    continue;
                }
                let skip_versions = match after {
                    None => 0,
                    Some(cursor) => {
                        match (bucket_name.as_str(), key.as_str())
                            .cmp(&(cursor.bucket.as_str(), cursor.key.as_str()))
                        {
                            std::cmp::Ordering::Less => continue,
                            std::cmp::Ordering::Equal => {
                                match versions
                                    .iter()
                                    .position(|v| v.version_id == cursor.version_id)
                                {
                                    Some(pos) => pos + 1,
                                    None => continue,
                                }
                            }
                            std::cmp::Ordering::Greater => 0,
                        }
                    }
                };
                for row in versions.iter().skip(skip_versions) {
                    if out.len() >= limit {
                        break;
                    }
                    if row.state == VersionState::Conflict {
                        out.push(to_object_version(bucket_name, key, row));
                    }
                }
            }
        }
        Ok(out)
    }

    async fn get_null_object_version(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectVersion>, MetaError> {
        let buckets = self.buckets.read();
        let record = buckets
            .get(bucket)
            .ok_or_else(|| MetaError::BucketNotFound(bucket.to_string()))?;
        Ok(record.objects.get(key).and_then(|versions| {
            versions
                .iter()
                .find(|v| v.is_null)
                .map(|row| to_object_version(bucket, key, row))
        }))
    }
}
