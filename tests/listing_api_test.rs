//! Listing behavior through the S3 XML surface: the four listing modes,
//! pagination via continuation tokens, delimiter folding, versioned
//! namespaces, and parameter clamping.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_string, create_bucket, enable_versioning, gateway, put_plain, send};

async fn get_xml(app: &axum::Router, uri: &str) -> String {
    let response = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    body_string(response).await
}

/// Count non-overlapping occurrences of a needle.
fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Pull every <Key> element value out of a listing body, in order.
fn keys_in(xml: &str) -> Vec<String> {
    xml.split("<Key>")
        .skip(1)
        .filter_map(|rest| rest.split("</Key>").next())
        .map(|k| k.to_string())
        .collect()
}

#[tokio::test]
async fn test_versioned_put_put_delete_lists_three_entries() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    enable_versioning(&gw.app, "bkt").await;

    put_plain(&gw.app, "bkt", "k", b"first").await;
    put_plain(&gw.app, "bkt", "k", b"second").await;
    let response = send(
        &gw.app,
        Request::builder()
            .method("DELETE")
            .uri("/bkt/k")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("x-amz-delete-marker").unwrap(),
        "true"
    );

    let xml = get_xml(&gw.app, "/bkt?versions").await;
    // Three entries total: one delete marker atop two versions.
    assert_eq!(count(&xml, "<DeleteMarker>"), 1, "{xml}");
    assert_eq!(count(&xml, "<Version>"), 2, "{xml}");
    // The marker is the latest; both versions are shadowed.
    let marker_block = xml
        .split("<DeleteMarker>")
        .nth(1)
        .unwrap()
        .split("</DeleteMarker>")
        .next()
        .unwrap();
    assert!(marker_block.contains("<IsLatest>true</IsLatest>"));
    let version_blocks: Vec<&str> = xml
        .split("<Version>")
        .skip(1)
        .filter_map(|rest| rest.split("</Version>").next())
        .collect();
    assert_eq!(version_blocks.len(), 2);
    for block in &version_blocks {
        assert!(block.contains("<IsLatest>false</IsLatest>"), "{block}");
    }
    // Newest first: MD5("second") precedes MD5("first").
    assert!(version_blocks[0].contains(&md5_hex(b"second")), "{xml}");
    assert!(version_blocks[1].contains(&md5_hex(b"first")), "{xml}");
}

/// ETags in listings are MD5 hex digests; recompute them the same way.
fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(data))
}

#[tokio::test]
async fn test_common_prefix_folding_via_api() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    for key in ["a/b", "a/c/d", "a/c/e", "a/f"] {
        put_plain(&gw.app, "bkt", key, b"x").await;
    }

    let xml = get_xml(&gw.app, "/bkt?list-type=2&prefix=a/&delimiter=/").await;
    assert_eq!(keys_in(&xml), vec!["a/b", "a/f"]);
    assert_eq!(count(&xml, "<CommonPrefixes>"), 1);
    assert!(xml.contains("<Prefix>a/c/</Prefix>"));
    assert!(xml.contains("<KeyCount>3</KeyCount>"));
}

#[tokio::test]
async fn test_v2_pagination_completeness_via_tokens() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    let expected: Vec<String> = (0..12).map(|i| format!("key-{i:02}")).collect();
    for key in &expected {
        put_plain(&gw.app, "bkt", key, b"x").await;
    }

    for max_keys in [1usize, 2, 3, 5, 11, 12, 20] {
        let mut collected = Vec::new();
        let mut uri = format!("/bkt?list-type=2&max-keys={max_keys}");
        loop {
            let xml = get_xml(&gw.app, &uri).await;
            collected.extend(keys_in(&xml));
            if xml.contains("<IsTruncated>false</IsTruncated>") {
                break;
            }
            let token = xml
                .split("<NextContinuationToken>")
                .nth(1)
                .and_then(|rest| rest.split("</NextContinuationToken>").next())
                .expect("truncated listing must carry a token");
            uri = format!("/bkt?list-type=2&max-keys={max_keys}&continuation-token={token}");
        }
        assert_eq!(collected, expected, "max_keys={max_keys}");
    }
}

#[tokio::test]
async fn test_v1_marker_pagination_via_api() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    for key in ["a", "b", "c"] {
        put_plain(&gw.app, "bkt", key, b"x").await;
    }

    let xml = get_xml(&gw.app, "/bkt?max-keys=2").await;
    assert_eq!(keys_in(&xml), vec!["a", "b"]);
    assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
    assert!(xml.contains("<NextMarker>b</NextMarker>"));

    let xml = get_xml(&gw.app, "/bkt?max-keys=2&marker=b").await;
    assert_eq!(keys_in(&xml), vec!["c"]);
    assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
    assert!(!xml.contains("NextMarker"));
}

#[tokio::test]
async fn test_invalid_max_keys_defaults_to_1000() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    put_plain(&gw.app, "bkt", "k", b"x").await;

    for uri in [
        "/bkt?list-type=2&max-keys=banana",
        "/bkt?list-type=2&max-keys=0",
        "/bkt?list-type=2&max-keys=-7",
        "/bkt?list-type=2&max-keys=99999",
    ] {
        let xml = get_xml(&gw.app, uri).await;
        assert!(xml.contains("<MaxKeys>1000</MaxKeys>"), "{uri}: {xml}");
        assert_eq!(keys_in(&xml), vec!["k"], "{uri}");
    }
    // In-range values are honored.
    let xml = get_xml(&gw.app, "/bkt?list-type=2&max-keys=7").await;
    assert!(xml.contains("<MaxKeys>7</MaxKeys>"));
}

#[tokio::test]
async fn test_invalid_encoding_type_rejected() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    let response = send(
        &gw.app,
        Request::builder()
            .uri("/bkt?list-type=2&encoding-type=base64")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response).await;
    assert!(body.contains("<Code>InvalidArgument</Code>"), "{body}");
}

#[tokio::test]
async fn test_url_encoding_type_applies_to_keys() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    // Percent-encoded on the wire; the router decodes it to "dir/my file.txt".
    put_plain(&gw.app, "bkt", "dir/my%20file.txt", b"x").await;

    let xml = get_xml(&gw.app, "/bkt?list-type=2&encoding-type=url").await;
    assert!(xml.contains("<EncodingType>url</EncodingType>"));
    assert!(xml.contains("dir%2Fmy%20file.txt"), "{xml}");
}

#[tokio::test]
async fn test_versions_listing_on_disabled_bucket_is_empty() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    put_plain(&gw.app, "bkt", "k", b"x").await;

    let xml = get_xml(&gw.app, "/bkt?versions").await;
    assert_eq!(count(&xml, "<Version>"), 0);
    assert_eq!(count(&xml, "<DeleteMarker>"), 0);
    assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
}

#[tokio::test]
async fn test_versions_null_version_id_rendered() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    put_plain(&gw.app, "bkt", "k", b"pre-versioning").await;
    enable_versioning(&gw.app, "bkt").await;
    put_plain(&gw.app, "bkt", "k", b"post-versioning").await;

    let xml = get_xml(&gw.app, "/bkt?versions").await;
    assert_eq!(count(&xml, "<Version>"), 2, "{xml}");
    assert!(xml.contains("<VersionId>null</VersionId>"), "{xml}");
}

#[tokio::test]
async fn test_versions_pagination_with_markers() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    enable_versioning(&gw.app, "bkt").await;
    put_plain(&gw.app, "bkt", "k", b"v1").await;
    put_plain(&gw.app, "bkt", "k", b"v2").await;
    put_plain(&gw.app, "bkt", "z", b"zz").await;

    let xml = get_xml(&gw.app, "/bkt?versions&max-keys=1").await;
    assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
    let next_key = xml
        .split("<NextKeyMarker>")
        .nth(1)
        .and_then(|rest| rest.split("</NextKeyMarker>").next())
        .unwrap()
        .to_string();
    let next_version = xml
        .split("<NextVersionIdMarker>")
        .nth(1)
        .and_then(|rest| rest.split("</NextVersionIdMarker>").next())
        .unwrap()
        .to_string();
    assert_eq!(next_key, "k");

    let xml = get_xml(
        &gw.app,
        &format!("/bkt?versions&key-marker={next_key}&version-id-marker={next_version}"),
    )
    .await;
    let keys = keys_in(&xml);
    assert_eq!(keys, vec!["k", "z"], "{xml}");
}

#[tokio::test]
async fn test_multipart_uploads_listing_stub() {
    let gw = gateway();
    create_bucket(&gw.app, "bkt").await;
    gw.meta.create_multipart_upload("bkt", "part-a").unwrap();
    gw.meta.create_multipart_upload("bkt", "part-b").unwrap();

    let xml = get_xml(&gw.app, "/bkt?uploads").await;
    assert_eq!(count(&xml, "<Upload>"), 2);
    assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
    assert!(xml.contains("<Key>part-a</Key>"));

    let xml = get_xml(&gw.app, "/bkt?uploads&prefix=part-b").await;
    assert_eq!(count(&xml, "<Upload>"), 1);
}

#[tokio::test]
async fn test_list_buckets_and_location() {
    let gw = gateway();
    create_bucket(&gw.app, "alpha").await;
    create_bucket(&gw.app, "beta").await;

    let xml = get_xml(&gw.app, "/").await;
    assert!(xml.contains("<ListAllMyBucketsResult"));
    assert!(xml.contains("<Name>alpha</Name>"));
    assert!(xml.contains("<Name>beta</Name>"));

    let xml = get_xml(&gw.app, "/alpha?location").await;
    assert!(xml.contains("<LocationConstraint"));

    let xml = get_xml(&gw.app, "/alpha?versioning").await;
    assert!(xml.contains("<VersioningConfiguration"));
    assert!(!xml.contains("<Status>"));
    enable_versioning(&gw.app, "alpha").await;
    let xml = get_xml(&gw.app, "/alpha?versioning").await;
    assert!(xml.contains("<Status>Enabled</Status>"));
}

#[tokio::test]
async fn test_bucket_name_rules_enforced_on_create() {
    let gw = gateway();
    for bad in ["ab", "xn--foo", "foo.mrap", "-ab", "a..b"] {
        let response = send(
            &gw.app,
            Request::builder()
                .method("PUT")
                .uri(format!("/{bad}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad}");
        let body = body_string(response).await;
        assert!(body.contains("<Code>InvalidBucketName</Code>"), "{body}");
    }
    create_bucket(&gw.app, "ok-bucket").await;
}

#[tokio::test]
async fn test_listing_missing_bucket_is_404() {
    let gw = gateway();
    let response = send(
        &gw.app,
        Request::builder()
            .uri("/no-such-bucket?list-type=2")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_string(response).await;
    assert!(body.contains("<Code>NoSuchBucket</Code>"), "{body}");
}
