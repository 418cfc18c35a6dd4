//! Shared helpers for the integration suites: an in-process gateway driven
//! through the router, no sockets involved.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use seglake::api::handlers::{router, AppState};
use seglake::config::AuthKeys;
use seglake::meta::MemoryMetaStore;
use seglake::store::MemoryObjectStore;
use std::sync::Arc;
use tower::ServiceExt;

pub const ACCESS_KEY: &str = "AKIASEGLAKETEST";
pub const SECRET_KEY: &str = "seglake-test-secret";

pub struct TestGateway {
    pub app: Router,
    pub meta: Arc<MemoryMetaStore>,
}

/// Gateway with SigV4 credentials configured.
pub fn gateway() -> TestGateway {
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryObjectStore::new());
    let state = Arc::new(AppState::new(
        meta.clone(),
        blobs,
        Some(AuthKeys {
            access_key_id: ACCESS_KEY.to_string(),
            secret_access_key: SECRET_KEY.to_string(),
        }),
        "us-east-1".to_string(),
        64 * 1024 * 1024,
    ));
    TestGateway {
        app: router(state),
        meta,
    }
}

/// Drive one request through the router.
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("infallible")
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Create a bucket through the API and assert success.
pub async fn create_bucket(app: &Router, bucket: &str) {
    let response = send(
        app,
        Request::builder()
            .method("PUT")
            .uri(format!("/{bucket}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "create bucket {bucket}");
}

/// Enable versioning on a bucket through the API.
pub async fn enable_versioning(app: &Router, bucket: &str) {
    let body = r#"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>"#;
    let response = send(
        app,
        Request::builder()
            .method("PUT")
            .uri(format!("/{bucket}?versioning"))
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "enable versioning");
}

/// PUT an object with a plain (non-streaming) body.
pub async fn put_plain(app: &Router, bucket: &str, key: &str, body: &[u8]) {
    let response = send(
        app,
        Request::builder()
            .method("PUT")
            .uri(format!("/{bucket}/{key}"))
            .body(Body::from(body.to_vec()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "put {bucket}/{key}");
}

/// GET an object's bytes, asserting 200.
pub async fn get_body(app: &Router, bucket: &str, key: &str) -> Vec<u8> {
    let response = send(
        app,
        Request::builder()
            .uri(format!("/{bucket}/{key}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "get {bucket}/{key}");
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}
