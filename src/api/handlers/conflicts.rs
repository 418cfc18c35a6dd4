//! Conflict-inspection endpoint
//!
//! `GET /v1/meta/conflicts` pages through Conflict-state versions across
//! the namespace as JSON. This is an operator surface, not part of the S3
//! API, so errors still use the S3 envelope but the payload is JSON.

use super::{AppState, S3Error};
use crate::types::{format_last_modified, ConflictCursor};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

const DEFAULT_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize, Default)]
pub struct ConflictsQuery {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub after_bucket: Option<String>,
    pub after_key: Option<String>,
    pub after_version: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConflictItem {
    bucket: String,
    key: String,
    version_id: String,
    etag: String,
    size: u64,
    last_modified_utc: String,
}

#[derive(Debug, Serialize)]
struct ConflictsResponse {
    items: Vec<ConflictItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_version: Option<String>,
}

/// GET /v1/meta/conflicts?bucket=&prefix=&after_bucket=&after_key=&after_version=&limit=
#[instrument(skip(state, query))]
pub async fn list_conflicts_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConflictsQuery>,
) -> Result<Response, S3Error> {
    let limit = match query.limit.as_deref() {
        None | Some("") => DEFAULT_LIMIT,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| S3Error::InvalidArgument(format!("invalid limit '{raw}'")))?,
    };

    let after = match (&query.after_bucket, &query.after_key, &query.after_version) {
        (Some(bucket), Some(key), Some(version))
            if !bucket.is_empty() && !key.is_empty() && !version.is_empty() =>
        {
            Some(ConflictCursor {
                bucket: bucket.clone(),
                key: key.clone(),
                version_id: version.clone(),
            })
        }
        _ => None,
    };

    let page = state
        .listing
        .list_conflicts(
            query.bucket.as_deref().unwrap_or(""),
            query.prefix.as_deref().unwrap_or(""),
            after,
            limit,
        )
        .await?;

    let response = ConflictsResponse {
        items: page
            .items
            .into_iter()
            .map(|item| ConflictItem {
                last_modified_utc: format_last_modified(&item.last_modified),
                bucket: item.bucket,
                key: item.key,
                version_id: item.version_id,
                etag: item.etag,
                size: item.size,
            })
            .collect(),
        next_bucket: page.next.as_ref().map(|c| c.bucket.clone()),
        next_key: page.next.as_ref().map(|c| c.key.clone()),
        next_version: page.next.as_ref().map(|c| c.version_id.clone()),
    };
    Ok(Json(response).into_response())
}
