//! End-to-end pipeline tests driving the router directly.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use objvault_common::ServerConfig;
use objvault_engine::FsEngine;
use objvault_s3::{build_router, AppState};
use objvault_store::Store;
use std::sync::Arc;
use tower::ServiceExt;

fn setup() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("meta.redb")).unwrap());
    let engine = Arc::new(FsEngine::open(dir.path().join("data")).unwrap());
    let config = ServerConfig {
        data_dir: dir.path().join("data"),
        metadata_path: dir.path().join("meta.redb"),
        ..Default::default()
    };
    let state = AppState::single_node_no_auth(config, store, engine);
    (dir, build_router(Arc::new(state)))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_vec())).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn text(body: &Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}

// ── Scenario 1: bucket CRUD ───────────────────────────────────────────────────

#[tokio::test]
async fn bucket_crud() {
    let (_dir, router) = setup();

    let (status, ..) = send(&router, Method::PUT, "/b", &[], b"").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&router, Method::PUT, "/b", &[], b"").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(text(&body).contains("BucketAlreadyExists"));

    let (status, _, body) = send(&router, Method::GET, "/", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&body).contains("<Name>b</Name>"));

    let (status, ..) = send(&router, Method::HEAD, "/b", &[], b"").await;
    assert_eq!(status, StatusCode::OK);

    let (status, ..) = send(&router, Method::DELETE, "/b", &[], b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, ..) = send(&router, Method::HEAD, "/b", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bucket_name_validation() {
    let (_dir, router) = setup();
    let (status, _, body) = send(&router, Method::PUT, "/ab", &[], b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("InvalidBucketName"));

    let (status, ..) = send(&router, Method::PUT, "/Bad_Bucket", &[], b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_nonempty_bucket_conflicts() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(&router, Method::PUT, "/b/k", &[], b"data").await;

    let (status, _, body) = send(&router, Method::DELETE, "/b", &[], b"").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(text(&body).contains("BucketNotEmpty"));
}

// ── Scenario 2: versioning ────────────────────────────────────────────────────

#[tokio::test]
async fn versioning_lifecycle() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    let config = b"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>";
    let (status, ..) = send(&router, Method::PUT, "/b?versioning", &[], config).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, _) = send(&router, Method::PUT, "/b/k", &[], b"v1").await;
    assert_eq!(status, StatusCode::OK);
    let v1 = headers["x-amz-version-id"].to_str().unwrap().to_string();

    let (status, headers, _) = send(&router, Method::PUT, "/b/k", &[], b"v2").await;
    assert_eq!(status, StatusCode::OK);
    let v2 = headers["x-amz-version-id"].to_str().unwrap().to_string();
    assert_ne!(v1, v2);

    let (status, _, body) = send(&router, Method::GET, "/b/k", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"v2");

    let (status, _, body) =
        send(&router, Method::GET, &format!("/b/k?versionId={v1}"), &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"v1");

    let (status, headers, _) = send(&router, Method::DELETE, "/b/k", &[], b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(headers["x-amz-delete-marker"], "true");

    let (status, headers, _) = send(&router, Method::GET, "/b/k", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["x-amz-delete-marker"], "true");

    // Both data versions plus the marker show in the version listing.
    let (status, _, body) = send(&router, Method::GET, "/b?versions", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    let listing = text(&body);
    assert!(listing.contains(&v1));
    assert!(listing.contains(&v2));
    assert!(listing.contains("<DeleteMarker>"));
}

#[tokio::test]
async fn suspended_versioning_uses_null_version() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(
        &router,
        Method::PUT,
        "/b?versioning",
        &[],
        b"<VersioningConfiguration><Status>Suspended</Status></VersioningConfiguration>",
    )
    .await;

    let (status, headers, _) = send(&router, Method::PUT, "/b/k", &[], b"one").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-amz-version-id").is_none());

    send(&router, Method::PUT, "/b/k", &[], b"two").await;
    let (_, _, body) = send(&router, Method::GET, "/b/k?versionId=null", &[], b"").await;
    assert_eq!(&body[..], b"two");
}

// ── Scenario 3: multipart ─────────────────────────────────────────────────────

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[tokio::test]
async fn multipart_upload() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    let (status, _, body) = send(&router, Method::POST, "/b/big?uploads", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    let response = text(&body);
    let upload_id = response
        .split("<UploadId>")
        .nth(1)
        .and_then(|s| s.split("</UploadId>").next())
        .unwrap()
        .to_string();

    let part_a = b"AAAAAAAAAA";
    let part_b = b"BBBBB";
    let (status, headers, _) = send(
        &router,
        Method::PUT,
        &format!("/b/big?partNumber=1&uploadId={upload_id}"),
        &[],
        part_a,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let etag_a = headers["etag"].to_str().unwrap().to_string();
    assert_eq!(etag_a, format!("\"{}\"", md5_hex(part_a)));

    let (status, headers, _) = send(
        &router,
        Method::PUT,
        &format!("/b/big?partNumber=2&uploadId={upload_id}"),
        &[],
        part_b,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let etag_b = headers["etag"].to_str().unwrap().to_string();

    // Parts listing shows both.
    let (status, _, body) = send(
        &router,
        Method::GET,
        &format!("/b/big?uploadId={upload_id}"),
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&body).contains("<PartNumber>1</PartNumber>"));
    assert!(text(&body).contains("<PartNumber>2</PartNumber>"));

    let complete = format!(
        "<CompleteMultipartUpload>\
         <Part><PartNumber>1</PartNumber><ETag>{etag_a}</ETag></Part>\
         <Part><PartNumber>2</PartNumber><ETag>{etag_b}</ETag></Part>\
         </CompleteMultipartUpload>"
    );
    let (status, _, body) = send(
        &router,
        Method::POST,
        &format!("/b/big?uploadId={upload_id}"),
        &[],
        complete.as_bytes(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Composite ETag: md5 over the raw part digests, dash, part count.
    let mut combined = hex::decode(md5_hex(part_a)).unwrap();
    combined.extend(hex::decode(md5_hex(part_b)).unwrap());
    let expected = format!("\"{:x}-2\"", md5::compute(&combined));
    assert!(text(&body).contains(&expected));

    let (status, headers, body) = send(&router, Method::GET, "/b/big", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"AAAAAAAAAABBBBB");
    assert_eq!(headers["x-amz-mp-parts-count"], "2");

    // ?partNumber serves one recorded part range.
    let (status, headers, body) =
        send(&router, Method::GET, "/b/big?partNumber=2", &[], b"").await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(&body[..], part_b);
    assert_eq!(headers["content-range"], "bytes 10-14/15");
}

#[tokio::test]
async fn multipart_complete_missing_part() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    let (_, _, body) = send(&router, Method::POST, "/b/k?uploads", &[], b"").await;
    let response = text(&body);
    let upload_id = response
        .split("<UploadId>")
        .nth(1)
        .and_then(|s| s.split("</UploadId>").next())
        .unwrap();

    let complete = "<CompleteMultipartUpload>\
        <Part><PartNumber>1</PartNumber><ETag>\"missing\"</ETag></Part>\
        </CompleteMultipartUpload>";
    let (status, _, body) = send(
        &router,
        Method::POST,
        &format!("/b/k?uploadId={upload_id}"),
        &[],
        complete.as_bytes(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("InvalidPart"));
}

#[tokio::test]
async fn multipart_abort() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    let (_, _, body) = send(&router, Method::POST, "/b/k?uploads", &[], b"").await;
    let response = text(&body);
    let upload_id = response
        .split("<UploadId>")
        .nth(1)
        .and_then(|s| s.split("</UploadId>").next())
        .unwrap()
        .to_string();

    send(
        &router,
        Method::PUT,
        &format!("/b/k?partNumber=1&uploadId={upload_id}"),
        &[],
        b"data",
    )
    .await;

    let (status, ..) = send(
        &router,
        Method::DELETE,
        &format!("/b/k?uploadId={upload_id}"),
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, ..) = send(
        &router,
        Method::GET,
        &format!("/b/k?uploadId={upload_id}"),
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Scenario 4: conditional PUT ───────────────────────────────────────────────

#[tokio::test]
async fn conditional_put() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    let (status, headers, _) = send(&router, Method::PUT, "/b/k", &[], b"1").await;
    assert_eq!(status, StatusCode::OK);
    let e1 = headers["etag"].to_str().unwrap().to_string();

    let (status, _, body) = send(
        &router,
        Method::PUT,
        "/b/k",
        &[("if-none-match", "*")],
        b"x",
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(text(&body).contains("PreconditionFailed"));

    let (status, ..) = send(&router, Method::PUT, "/b/k", &[("if-match", e1.as_str())], b"2").await;
    assert_eq!(status, StatusCode::OK);

    let (status, ..) = send(
        &router,
        Method::PUT,
        "/b/k",
        &[("if-match", e1.as_str())],
        b"3",
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

// ── Scenario 5: range GET ─────────────────────────────────────────────────────

#[tokio::test]
async fn range_get() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(&router, Method::PUT, "/b/k", &[], b"0123456789").await;

    let (status, headers, body) =
        send(&router, Method::GET, "/b/k", &[("range", "bytes=2-5")], b"").await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers["content-range"], "bytes 2-5/10");
    assert_eq!(&body[..], b"2345");

    let (status, _, body) =
        send(&router, Method::GET, "/b/k", &[("range", "bytes=-3")], b"").await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(&body[..], b"789");

    let (status, _, body) =
        send(&router, Method::GET, "/b/k", &[("range", "bytes=20-")], b"").await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert!(text(&body).contains("InvalidRange"));
}

// ── Scenario 6: object lock ───────────────────────────────────────────────────

#[tokio::test]
async fn object_lock_blocks_version_delete() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(
        &router,
        Method::PUT,
        "/b?versioning",
        &[],
        b"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>",
    )
    .await;

    let (status, headers, _) = send(
        &router,
        Method::PUT,
        "/b/k",
        &[
            ("x-amz-object-lock-mode", "COMPLIANCE"),
            ("x-amz-object-lock-retain-until-date", "2099-01-01T00:00:00Z"),
        ],
        b"locked",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let vid = headers["x-amz-version-id"].to_str().unwrap().to_string();

    let (status, _, body) = send(
        &router,
        Method::DELETE,
        &format!("/b/k?versionId={vid}"),
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(text(&body).contains("AccessDenied"));

    // A delete marker is still fine; the version itself is protected.
    let (status, ..) = send(&router, Method::DELETE, "/b/k", &[], b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn governance_retention_bypass() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(
        &router,
        Method::PUT,
        "/b?versioning",
        &[],
        b"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>",
    )
    .await;

    let (_, headers, _) = send(
        &router,
        Method::PUT,
        "/b/k",
        &[
            ("x-amz-object-lock-mode", "GOVERNANCE"),
            ("x-amz-object-lock-retain-until-date", "2099-01-01T00:00:00Z"),
        ],
        b"governed",
    )
    .await;
    let vid = headers["x-amz-version-id"].to_str().unwrap().to_string();

    let (status, ..) = send(
        &router,
        Method::DELETE,
        &format!("/b/k?versionId={vid}"),
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin (auth disabled) may bypass governance with the header.
    let (status, ..) = send(
        &router,
        Method::DELETE,
        &format!("/b/k?versionId={vid}"),
        &[("x-amz-bypass-governance-retention", "true")],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// ── Supporting behaviors ──────────────────────────────────────────────────────

#[tokio::test]
async fn copy_object_inherits_metadata() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/src", &[], b"").await;
    send(&router, Method::PUT, "/dst", &[], b"").await;
    send(
        &router,
        Method::PUT,
        "/src/orig.txt",
        &[("content-type", "text/plain"), ("x-amz-meta-team", "core")],
        b"payload",
    )
    .await;

    let (status, _, body) = send(
        &router,
        Method::PUT,
        "/dst/copy.txt",
        &[("x-amz-copy-source", "/src/orig.txt")],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&body).contains("<CopyObjectResult"));

    let (status, headers, body) = send(&router, Method::GET, "/dst/copy.txt", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"payload");
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(headers["x-amz-meta-team"], "core");
}

#[tokio::test]
async fn copy_precondition_failure() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(&router, Method::PUT, "/b/src", &[], b"data").await;

    let (status, ..) = send(
        &router,
        Method::PUT,
        "/b/dst",
        &[
            ("x-amz-copy-source", "/b/src"),
            ("x-amz-copy-source-if-match", "\"not-the-etag\""),
        ],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn batch_delete() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(&router, Method::PUT, "/b/a", &[], b"1").await;
    send(&router, Method::PUT, "/b/c", &[], b"2").await;

    let delete = b"<Delete><Object><Key>a</Key></Object><Object><Key>c</Key></Object></Delete>";
    let (status, _, body) = send(&router, Method::POST, "/b?delete", &[], delete).await;
    assert_eq!(status, StatusCode::OK);
    let result = text(&body);
    assert!(result.contains("<Key>a</Key>"));
    assert!(result.contains("<Key>c</Key>"));

    let (status, ..) = send(&router, Method::GET, "/b/a", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_objects_prefix_and_delimiter() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    for key in ["logs/2024/a.log", "logs/2025/b.log", "readme.md"] {
        send(&router, Method::PUT, &format!("/b/{key}"), &[], b"x").await;
    }

    let (status, _, body) = send(
        &router,
        Method::GET,
        "/b?list-type=2&prefix=logs/&delimiter=/",
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listing = text(&body);
    assert!(listing.contains("<Prefix>logs/2024/</Prefix>"));
    assert!(listing.contains("<Prefix>logs/2025/</Prefix>"));
    assert!(!listing.contains("readme.md"));

    let (_, _, body) = send(&router, Method::GET, "/b?list-type=2", &[], b"").await;
    assert!(text(&body).contains("<Key>readme.md</Key>"));
}

#[tokio::test]
async fn object_tagging_roundtrip() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(&router, Method::PUT, "/b/k", &[], b"x").await;

    let tagging =
        b"<Tagging><TagSet><Tag><Key>env</Key><Value>prod</Value></Tag></TagSet></Tagging>";
    let (status, ..) = send(&router, Method::PUT, "/b/k?tagging", &[], tagging).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&router, Method::GET, "/b/k?tagging", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&body).contains("<Key>env</Key>"));
    assert!(text(&body).contains("<Value>prod</Value>"));

    let (status, ..) = send(&router, Method::DELETE, "/b/k?tagging", &[], b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, body) = send(&router, Method::GET, "/b/k?tagging", &[], b"").await;
    assert!(!text(&body).contains("<Key>env</Key>"));
}

#[tokio::test]
async fn quota_rejects_oversize_write() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(
        &router,
        Method::PUT,
        "/b?quota",
        &[],
        br#"{"max_size_bytes":8,"max_objects":0,"fifo":false}"#,
    )
    .await;

    let (status, ..) = send(&router, Method::PUT, "/b/small", &[], b"1234").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&router, Method::PUT, "/b/big", &[], b"123456789").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(text(&body).contains("QuotaExceeded"));
}

#[tokio::test]
async fn fifo_quota_evicts_oldest() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(
        &router,
        Method::PUT,
        "/b?quota",
        &[],
        br#"{"max_size_bytes":10,"max_objects":0,"fifo":true}"#,
    )
    .await;

    send(&router, Method::PUT, "/b/old", &[], b"AAAAAA").await;
    // Distinct last-modified for deterministic eviction order.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    send(&router, Method::PUT, "/b/new", &[], b"BBBB").await;

    let (status, ..) = send(&router, Method::PUT, "/b/incoming", &[], b"CCCCCC").await;
    assert_eq!(status, StatusCode::OK);

    // The oldest object was evicted to make room.
    let (status, ..) = send(&router, Method::GET, "/b/old", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, ..) = send(&router, Method::GET, "/b/incoming", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn checksum_validation() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    // CRC32("123456789") in base64.
    let (status, headers, _) = send(
        &router,
        Method::PUT,
        "/b/k",
        &[("x-amz-checksum-crc32", "y/Q5Jg==")],
        b"123456789",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-amz-checksum-crc32"], "y/Q5Jg==");

    let (status, _, body) = send(
        &router,
        Method::PUT,
        "/b/bad",
        &[("x-amz-checksum-crc32", "AAAAAA==")],
        b"123456789",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("BadDigest"));
}

#[tokio::test]
async fn content_md5_validation() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    use base64::Engine as _;
    let good = base64::engine::general_purpose::STANDARD.encode(md5::compute(b"body").0);
    let (status, ..) = send(
        &router,
        Method::PUT,
        "/b/k",
        &[("content-md5", good.as_str())],
        b"body",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, ..) = send(
        &router,
        Method::PUT,
        "/b/k2",
        &[("content-md5", good.as_str())],
        b"different",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conditional_get() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    let (_, headers, _) = send(&router, Method::PUT, "/b/k", &[], b"data").await;
    let etag = headers["etag"].to_str().unwrap().to_string();

    let (status, ..) = send(
        &router,
        Method::GET,
        "/b/k",
        &[("if-none-match", etag.as_str())],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);

    let (status, ..) = send(
        &router,
        Method::GET,
        "/b/k",
        &[("if-match", "\"someone-else\"")],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn response_header_overrides() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;
    send(&router, Method::PUT, "/b/k.bin", &[], b"x").await;

    let (status, headers, _) = send(
        &router,
        Method::GET,
        "/b/k.bin?response-content-type=text/weird&response-cache-control=no-store",
        &[],
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/weird");
    assert_eq!(headers["cache-control"], "no-store");
}

#[tokio::test]
async fn bucket_policy_roundtrip() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    let policy = br#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":"*","Action":"s3:GetObject","Resource":"arn:aws:s3:::b/*"}]}"#;
    let (status, ..) = send(&router, Method::PUT, "/b?policy", &[], policy).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, headers, body) = send(&router, Method::GET, "/b?policy", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json");
    assert!(text(&body).contains("s3:GetObject"));

    let (status, ..) = send(&router, Method::DELETE, "/b?policy", &[], b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, ..) = send(&router, Method::GET, "/b?policy", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snowball_auto_extract() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    // A minimal two-file ustar archive.
    fn tar_entry(name: &str, data: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; 512];
        header[..name.len()].copy_from_slice(name.as_bytes());
        let size = format!("{:011o}\0", data.len());
        header[124..124 + size.len()].copy_from_slice(size.as_bytes());
        header[156] = b'0';
        header[257..262].copy_from_slice(b"ustar");
        let mut out = header;
        out.extend_from_slice(data);
        out.extend(std::iter::repeat_n(0u8, data.len().div_ceil(512) * 512 - data.len()));
        out
    }
    let mut archive = tar_entry("one.txt", b"first");
    archive.extend(tar_entry("dir/two.txt", b"second"));
    archive.extend(std::iter::repeat_n(0u8, 1024));

    let (status, ..) = send(
        &router,
        Method::PUT,
        "/b/bundle.tar",
        &[("x-amz-meta-snowball-auto-extract", "true")],
        &archive,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&router, Method::GET, "/b/one.txt", &[], b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"first");
    let (_, _, body) = send(&router, Method::GET, "/b/dir/two.txt", &[], b"").await;
    assert_eq!(&body[..], b"second");

    // The archive itself was not stored as an object.
    let (status, ..) = send(&router, Method::GET, "/b/bundle.tar", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_key_and_version_errors() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    let (status, _, body) = send(&router, Method::GET, "/b/nope", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).contains("NoSuchKey"));

    let (status, _, body) = send(&router, Method::GET, "/nope/k", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).contains("NoSuchBucket"));

    send(&router, Method::PUT, "/b/k", &[], b"x").await;
    let (status, _, body) =
        send(&router, Method::GET, "/b/k?versionId=does-not-exist", &[], b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).contains("NoSuchVersion"));
}

#[tokio::test]
async fn object_lock_config_requires_versioning() {
    let (_dir, router) = setup();
    send(&router, Method::PUT, "/b", &[], b"").await;

    let config = b"<ObjectLockConfiguration><ObjectLockEnabled>Enabled</ObjectLockEnabled></ObjectLockConfiguration>";
    let (status, _, body) = send(&router, Method::PUT, "/b?object-lock", &[], config).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(text(&body).contains("InvalidBucketState"));

    send(
        &router,
        Method::PUT,
        "/b?versioning",
        &[],
        b"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>",
    )
    .await;
    let (status, ..) = send(&router, Method::PUT, "/b?object-lock", &[], config).await;
    assert_eq!(status, StatusCode::OK);
}
