//! S3 API request handlers
//!
//! Split into submodules by domain:
//! - `object` — GET, HEAD, PUT, DELETE for individual objects
//! - `bucket` — Bucket CRUD and the four listing modes
//! - `conflicts` — JSON conflict-inspection endpoint

mod bucket;
mod conflicts;
mod object;

use super::errors::S3Error;
use crate::config::AuthKeys;
use crate::listing::ListingEngine;
use crate::meta::{MemoryMetaStore, MetadataStore};
use crate::store::MemoryObjectStore;
use crate::types::validate_bucket_name;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// Re-export all public handlers so callers don't change.
pub use bucket::{
    bucket_get_handler, bucket_put_handler, delete_bucket, head_bucket, list_buckets,
    BucketGetQuery,
};
pub use conflicts::list_conflicts_handler;
pub use object::{delete_object, get_object, head_object, put_object};

/// Application state shared across handlers
pub struct AppState {
    pub meta: Arc<MemoryMetaStore>,
    pub blobs: Arc<MemoryObjectStore>,
    pub listing: ListingEngine,
    pub auth: Option<AuthKeys>,
    pub region: String,
    pub max_object_size: u64,
}

impl AppState {
    pub fn new(
        meta: Arc<MemoryMetaStore>,
        blobs: Arc<MemoryObjectStore>,
        auth: Option<AuthKeys>,
        region: String,
        max_object_size: u64,
    ) -> Self {
        let listing = ListingEngine::new(meta.clone() as Arc<dyn MetadataStore>);
        Self {
            meta,
            blobs,
            listing,
            auth,
            region,
            max_object_size,
        }
    }
}

/// Build the gateway router. Routing is a thin dispatcher; all validation
/// depth lives in the core modules.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_buckets).head(head_root))
        .route("/health", get(health_check))
        .route("/v1/meta/conflicts", get(list_conflicts_handler))
        .route(
            "/:bucket",
            get(bucket_get_handler)
                .put(bucket_put_handler)
                .head(head_bucket)
                .delete(delete_bucket),
        )
        .route(
            "/:bucket/*key",
            get(get_object)
                .put(put_object)
                .head(head_object)
                .delete(delete_object),
        )
        .layer(middleware::from_fn(request_id_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Every response carries x-amz-request-id and x-amz-id-2; error responses
/// set their own, this fills in the rest.
async fn request_id_layer(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if !headers.contains_key("x-amz-request-id") {
        if let Ok(value) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
            headers.insert("x-amz-request-id", value);
        }
    }
    if !headers.contains_key("x-amz-id-2") {
        if let Ok(value) = HeaderValue::from_str(&uuid::Uuid::new_v4().simple().to_string()) {
            headers.insert("x-amz-id-2", value);
        }
    }
    response
}

/// Health check for load balancers and container orchestration.
async fn health_check() -> &'static str {
    "OK"
}

/// S3 clients probe HEAD / as a connection check before real requests.
async fn head_root() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Shared utility functions used across handler submodules
// ---------------------------------------------------------------------------

/// Build an XML response with correct Content-Type header.
fn xml_response(xml: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "application/xml")],
        xml.into(),
    )
        .into_response()
}

fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_bytes(s.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Bucket-name validation plus existence check, shared by every handler
/// that takes a client-supplied bucket.
async fn ensure_bucket(state: &AppState, bucket: &str) -> Result<(), S3Error> {
    validate_bucket_name(bucket).map_err(|e| S3Error::InvalidBucketName(e.to_string()))?;
    if !state.meta.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket(bucket.to_string()));
    }
    Ok(())
}
