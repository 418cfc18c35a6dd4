//! Bucket-level S3 handlers: CREATE, DELETE, HEAD, the four listing modes,
//! and sub-operations (GetBucketLocation, Get/PutBucketVersioning).

use super::{ensure_bucket, xml_response, AppState, S3Error};
use crate::api::xml::{
    location_constraint_xml, versioning_configuration_xml, ListBucketResult, ListBucketsResult,
    ListMultipartUploadsResult, ListVersionsResult, VersioningConfigurationRequest,
};
use crate::listing::{clamp_max_keys, parse_encoding_type};
use crate::meta::MetadataStore;
use crate::types::{validate_bucket_name, Versioning};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{info, instrument};

/// Query parameters for bucket-level GET operations. Numeric fields stay
/// raw strings so the engine's clamping rules (non-numeric input defaults)
/// apply instead of serde rejections.
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketGetQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<String>,
    /// v2 pagination
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    pub start_after: Option<String>,
    /// v1 pagination
    pub marker: Option<String>,
    /// Versions pagination
    #[serde(rename = "key-marker")]
    pub key_marker: Option<String>,
    #[serde(rename = "version-id-marker")]
    pub version_id_marker: Option<String>,
    /// Encoding type for keys/prefixes in the response (e.g. "url")
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
    #[serde(rename = "max-uploads")]
    pub max_uploads: Option<String>,
    /// GetBucketLocation query parameter
    pub location: Option<String>,
    /// Get/PutBucketVersioning query parameter
    pub versioning: Option<String>,
    /// ListMultipartUploads query parameter
    pub uploads: Option<String>,
    /// ListObjectVersions query parameter
    pub versions: Option<String>,
}

/// Bucket-level GET handler - dispatches to the operation selected by the
/// query string:
/// GET /{bucket}?location           -> GetBucketLocation
/// GET /{bucket}?versioning         -> GetBucketVersioning
/// GET /{bucket}?uploads            -> ListMultipartUploads
/// GET /{bucket}?versions           -> ListObjectVersions
/// GET /{bucket}?list-type=2        -> ListObjectsV2
/// GET /{bucket}                    -> ListObjects (v1)
#[instrument(skip(state, query))]
pub async fn bucket_get_handler(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(query): Query<BucketGetQuery>,
) -> Result<Response, S3Error> {
    ensure_bucket(&state, &bucket).await?;

    if query.location.is_some() {
        info!("GET bucket location: {}", bucket);
        let xml = location_constraint_xml(&state.region);
        return Ok(xml_response(xml));
    }

    if query.versioning.is_some() {
        info!("GET bucket versioning: {}", bucket);
        let status = state.meta.bucket_versioning(&bucket).await?;
        let xml = versioning_configuration_xml(status.status_str());
        return Ok(xml_response(xml));
    }

    if query.uploads.is_some() {
        info!("LIST multipart uploads: {}", bucket);
        return list_multipart_uploads(&state, &bucket, &query).await;
    }

    if query.versions.is_some() {
        info!("LIST object versions: {}", bucket);
        return list_object_versions(&state, &bucket, &query).await;
    }

    let is_v2 = query.list_type.as_deref() == Some("2");
    let prefix = query.prefix.clone().unwrap_or_default();
    let delimiter = query.delimiter.clone().filter(|d| !d.is_empty());
    let max_keys = clamp_max_keys(query.max_keys.as_deref());
    let encoding_type_url = parse_encoding_type(query.encoding_type.as_deref())?;

    info!(
        "LIST {}/{}* (v{})",
        bucket,
        prefix,
        if is_v2 { "2" } else { "1" }
    );

    // The engine handles prefix filtering, delimiter folding, and
    // pagination as one operation: folded prefixes count toward max-keys
    // and must be deduplicated within the response.
    let page = if is_v2 {
        state
            .listing
            .list_objects_v2(
                &bucket,
                &prefix,
                delimiter.as_deref(),
                max_keys,
                query.continuation_token.as_deref(),
                query.start_after.as_deref(),
            )
            .await?
    } else {
        state
            .listing
            .list_objects_v1(
                &bucket,
                &prefix,
                delimiter.as_deref(),
                max_keys,
                query.marker.as_deref(),
            )
            .await?
    };

    let xml = ListBucketResult {
        name: &bucket,
        prefix: &prefix,
        delimiter: delimiter.as_deref(),
        max_keys,
        encoding_type_url,
        page: &page,
        continuation_token: query.continuation_token.as_deref(),
        start_after: query.start_after.as_deref(),
        marker: query.marker.as_deref(),
        is_v1: !is_v2,
    }
    .to_xml();

    Ok(xml_response(xml))
}

/// ListObjectVersions handler
/// GET /{bucket}?versions
async fn list_object_versions(
    state: &Arc<AppState>,
    bucket: &str,
    query: &BucketGetQuery,
) -> Result<Response, S3Error> {
    let prefix = query.prefix.clone().unwrap_or_default();
    let delimiter = query.delimiter.clone().filter(|d| !d.is_empty());
    let max_keys = clamp_max_keys(query.max_keys.as_deref());
    let encoding_type_url = parse_encoding_type(query.encoding_type.as_deref())?;

    let page = state
        .listing
        .list_versions(
            bucket,
            &prefix,
            delimiter.as_deref(),
            max_keys,
            query.key_marker.as_deref(),
            query.version_id_marker.as_deref(),
        )
        .await?;

    let xml = ListVersionsResult {
        name: bucket,
        prefix: &prefix,
        delimiter: delimiter.as_deref(),
        max_keys,
        encoding_type_url,
        key_marker: query.key_marker.as_deref(),
        version_id_marker: query.version_id_marker.as_deref(),
        page: &page,
    }
    .to_xml();

    Ok(xml_response(xml))
}

/// ListMultipartUploads handler
/// GET /{bucket}?uploads
async fn list_multipart_uploads(
    state: &Arc<AppState>,
    bucket: &str,
    query: &BucketGetQuery,
) -> Result<Response, S3Error> {
    let prefix = query.prefix.clone().unwrap_or_default();
    let max_uploads = clamp_max_keys(query.max_uploads.as_deref());
    let page = state
        .listing
        .list_multipart_uploads(bucket, &prefix, max_uploads)
        .await?;
    let xml = ListMultipartUploadsResult {
        bucket,
        prefix: &prefix,
        max_uploads,
        page: &page,
    }
    .to_xml();
    Ok(xml_response(xml))
}

/// CREATE bucket / PutBucketVersioning handler
/// PUT /{bucket}              -> CreateBucket
/// PUT /{bucket}?versioning   -> PutBucketVersioning
#[instrument(skip(state, query, body))]
pub async fn bucket_put_handler(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(query): Query<BucketGetQuery>,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.versioning.is_some() {
        info!("PUT bucket versioning: {}", bucket);
        ensure_bucket(&state, &bucket).await?;
        let text = std::str::from_utf8(&body)
            .map_err(|_| S3Error::InvalidRequest("versioning body is not UTF-8".to_string()))?;
        let request = VersioningConfigurationRequest::from_xml(text)
            .map_err(|e| S3Error::InvalidRequest(format!("malformed versioning body: {e}")))?;
        let versioning = match request.status.as_deref() {
            Some("Enabled") => Versioning::Enabled,
            Some("Suspended") => Versioning::Suspended,
            other => {
                return Err(S3Error::InvalidArgument(format!(
                    "invalid versioning status {other:?}"
                )))
            }
        };
        state.meta.set_versioning(&bucket, versioning)?;
        return Ok(StatusCode::OK.into_response());
    }

    info!("CREATE bucket {}", bucket);
    validate_bucket_name(&bucket).map_err(|e| S3Error::InvalidBucketName(e.to_string()))?;
    // Re-creating an existing bucket is a no-op, matching the us-east-1
    // behavior our region default implies.
    state.meta.create_bucket(&bucket);
    Ok((StatusCode::OK, [("Location", format!("/{bucket}"))], "").into_response())
}

/// DELETE bucket handler
/// DELETE /{bucket}
#[instrument(skip(state))]
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    info!("DELETE bucket {}", bucket);
    ensure_bucket(&state, &bucket).await?;

    // S3 requires buckets to be empty (of versions too) before deletion.
    let versions = state
        .meta
        .list_object_versions(&bucket, "", "", "", 1)
        .await?;
    if !versions.is_empty() {
        return Err(S3Error::BucketNotEmpty(bucket));
    }

    state.meta.delete_bucket(&bucket)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// HEAD bucket handler
/// HEAD /{bucket}
#[instrument(skip(state))]
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    ensure_bucket(&state, &bucket).await?;
    Ok((StatusCode::OK, [("x-amz-bucket-region", state.region.clone())]).into_response())
}

/// LIST buckets handler
/// GET /
#[instrument(skip(state))]
pub async fn list_buckets(State(state): State<Arc<AppState>>) -> Result<Response, S3Error> {
    info!("LIST buckets");
    let buckets = state.listing.list_buckets().await?;
    let xml = ListBucketsResult {
        owner_id: "seglake",
        owner_display_name: "Seglake Gateway",
        buckets: &buckets,
    }
    .to_xml();
    Ok(xml_response(xml))
}
