//! Object-level S3 handlers: PUT (plain and aws-chunked streaming), GET,
//! HEAD, DELETE.

use super::{ensure_bucket, hval, AppState, S3Error};
use crate::api::auth::chunk_sigv4_context;
use crate::chunked::{ChunkedBodyReader, ChunkedConfig, ChunkedMode};
use crate::meta::MetadataStore;
use crate::store::ObjectStore;
use crate::types::{format_http_date, ObjectVersion, VersionState, Versioning};
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::TryStreamExt;
use md5::{Digest, Md5};
use sha2::Sha256;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument};

/// Query parameters for object-level operations
#[derive(Debug, serde::Deserialize, Default)]
pub struct ObjectQuery {
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
}

/// Map the x-amz-content-sha256 header onto a streaming mode, if any.
fn streaming_mode(headers: &HeaderMap) -> Option<ChunkedMode> {
    match headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
    {
        Some("STREAMING-AWS4-HMAC-SHA256-PAYLOAD") => Some(ChunkedMode::Signed),
        Some("STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER") => Some(ChunkedMode::SignedTrailer),
        Some("STREAMING-UNSIGNED-PAYLOAD-TRAILER") => Some(ChunkedMode::UnsignedTrailer),
        Some("STREAMING-UNSIGNED-PAYLOAD") => Some(ChunkedMode::Unsigned),
        _ => None,
    }
}

/// Build the per-request decoder config from the streaming headers.
fn chunked_config(
    state: &AppState,
    headers: &HeaderMap,
    mode: ChunkedMode,
) -> Result<ChunkedConfig, S3Error> {
    let expected_decoded_len = headers
        .get("x-amz-decoded-content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(S3Error::MissingContentLength)?;
    if expected_decoded_len > state.max_object_size {
        return Err(S3Error::EntityTooLarge);
    }

    // x-amz-trailer is only meaningful for the trailer modes; ignore it
    // elsewhere rather than failing the request.
    let trailer_keys: Vec<String> = if mode.has_trailer() {
        headers
            .get("x-amz-trailer")
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(|name| name.trim().to_ascii_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    if mode.has_trailer() && trailer_keys.is_empty() {
        return Err(S3Error::InvalidRequest(
            "streaming trailer mode requires the x-amz-trailer header".to_string(),
        ));
    }

    let sigv4 = if mode.is_signed() {
        let auth = state.auth.as_ref().ok_or_else(|| {
            S3Error::AuthorizationHeaderMalformed(
                "signed streaming upload without configured credentials".to_string(),
            )
        })?;
        Some(chunk_sigv4_context(headers, auth)?)
    } else {
        None
    };

    Ok(ChunkedConfig {
        mode,
        expected_decoded_len,
        trailer_keys,
        sigv4,
    })
}

/// PUT object handler
/// PUT /{bucket}/{key}
#[instrument(skip(state, request))]
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    request: Request,
) -> Result<Response, S3Error> {
    ensure_bucket(&state, &bucket).await?;
    let key = key.trim_start_matches('/').to_string();
    let (parts, body) = request.into_parts();

    let data: Vec<u8> = match streaming_mode(&parts.headers) {
        Some(mode) => {
            debug!("PUT {}/{} via aws-chunked ({mode:?})", bucket, key);
            let config = chunked_config(&state, &parts.headers, mode)?;
            let transport = StreamReader::new(
                body.into_data_stream()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
            );
            let mut reader = ChunkedBodyReader::new(transport, config)?;
            reader.read_to_end().await?
        }
        None => {
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| S3Error::InvalidRequest(format!("cannot read body: {e}")))?;
            verify_plain_content_sha256(&parts.headers, &bytes)?;
            bytes.to_vec()
        }
    };

    if data.len() as u64 > state.max_object_size {
        return Err(S3Error::EntityTooLarge);
    }

    let etag = hex::encode(Md5::digest(&data));
    let size = data.len() as u64;
    let version = state.meta.put_object_version(&bucket, &key, &etag, size)?;
    state
        .blobs
        .put(&bucket, &key, &version.version_id, Bytes::from(data))
        .await?;

    info!("PUT {}/{} ({} bytes)", bucket, key, size);

    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert("ETag", hval(&version.quoted_etag()));
    if !version.is_null {
        headers.insert("x-amz-version-id", hval(&version.version_id));
    }
    Ok(response)
}

/// Verify a plain (non-streaming) body against a hex x-amz-content-sha256
/// header when one was supplied.
fn verify_plain_content_sha256(headers: &HeaderMap, body: &[u8]) -> Result<(), S3Error> {
    let Some(declared) = headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(());
    };
    if declared == "UNSIGNED-PAYLOAD" {
        return Ok(());
    }
    let actual = hex::encode(Sha256::digest(body));
    if declared != actual {
        return Err(S3Error::ContentSha256Mismatch);
    }
    Ok(())
}

/// Resolve the version a GET/HEAD/DELETE addresses.
async fn resolve_version(
    state: &AppState,
    bucket: &str,
    key: &str,
    version_id: Option<&str>,
) -> Result<ObjectVersion, S3Error> {
    match version_id {
        Some(version_id) => state
            .meta
            .get_version(bucket, key, version_id)?
            .ok_or_else(|| S3Error::NoSuchVersion(format!("{bucket}/{key}"))),
        None => {
            let latest = state
                .meta
                .get_latest(bucket, key)?
                .ok_or_else(|| S3Error::NoSuchKey(format!("{bucket}/{key}")))?;
            if latest.state == VersionState::DeleteMarker {
                return Err(S3Error::NoSuchKey(format!("{bucket}/{key}")));
            }
            Ok(latest)
        }
    }
}

/// Common response headers for GET and HEAD.
fn object_headers(version: &ObjectVersion) -> Vec<(&'static str, String)> {
    let mut itoa_buf = itoa::Buffer::new();
    let mut headers = vec![
        ("ETag", version.quoted_etag()),
        ("Content-Type", "application/octet-stream".to_string()),
        (
            "Content-Length",
            itoa_buf.format(version.size).to_string(),
        ),
        ("Last-Modified", format_http_date(&version.last_modified)),
        (
            "x-amz-version-id",
            version.display_version_id().to_string(),
        ),
    ];
    if version.state == VersionState::Conflict {
        headers.push(("x-seglake-conflict", "true".to_string()));
    }
    headers
}

/// GET object handler
/// GET /{bucket}/{key}
#[instrument(skip(state, query))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    ensure_bucket(&state, &bucket).await?;
    let key = key.trim_start_matches('/').to_string();
    let version = resolve_version(&state, &bucket, &key, query.version_id.as_deref()).await?;

    let (_, stream) = state
        .blobs
        .get(&bucket, &key, &version.version_id)
        .await?;

    let mut response = Body::from_stream(stream).into_response();
    *response.status_mut() = StatusCode::OK;
    for (name, value) in object_headers(&version) {
        response.headers_mut().insert(name, hval(&value));
    }
    Ok(response)
}

/// HEAD object handler
/// HEAD /{bucket}/{key}
#[instrument(skip(state, query))]
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    ensure_bucket(&state, &bucket).await?;
    let key = key.trim_start_matches('/').to_string();
    let version = resolve_version(&state, &bucket, &key, query.version_id.as_deref()).await?;

    let mut response = StatusCode::OK.into_response();
    for (name, value) in object_headers(&version) {
        response.headers_mut().insert(name, hval(&value));
    }
    Ok(response)
}

/// DELETE object handler
/// DELETE /{bucket}/{key}
///
/// On versioning-enabled buckets this places a delete marker; otherwise it
/// removes the object outright.
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    ensure_bucket(&state, &bucket).await?;
    let key = key.trim_start_matches('/').to_string();

    if state.meta.bucket_versioning(&bucket).await? == Versioning::Enabled {
        let marker = state.meta.put_delete_marker(&bucket, &key)?;
        info!("DELETE {}/{} (marker {})", bucket, key, marker.version_id);
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert("x-amz-delete-marker", hval("true"));
        headers.insert("x-amz-version-id", hval(&marker.version_id));
        return Ok(response);
    }

    if let Some(latest) = state.meta.get_latest(&bucket, &key)? {
        state
            .blobs
            .delete(&bucket, &key, &latest.version_id)
            .await?;
        state.meta.delete_object(&bucket, &key)?;
        info!("DELETE {}/{}", bucket, key);
    }
    // Deleting a missing key succeeds, as in S3.
    Ok(StatusCode::NO_CONTENT.into_response())
}
