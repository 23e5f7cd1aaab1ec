use std::time::Duration;

use serde_json::json;
use sigpad::codec::{self, ImageFile};
use sigpad::errors::PadErrorKind;
use sigpad::upload::{HttpUploader, SignatureUploader};
use tiny_skia::Pixmap;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signature_file() -> ImageFile {
    let surface = Pixmap::new(12, 8).expect("surface should allocate");
    let encoded = codec::encode(&surface).expect("blank surface should encode");
    codec::decode_to_file(&encoded.to_data_url(), "signature.png").expect("data url should decode")
}

fn uploader_for(server: &MockServer) -> HttpUploader {
    let endpoint = Url::parse(&format!("{}/upload/signature", server.uri()))
        .expect("mock endpoint should parse");
    HttpUploader::with_timeout(endpoint, "signature", Duration::from_secs(5))
        .expect("client should build")
}

#[tokio::test]
async fn upload_posts_multipart_and_returns_storage_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "path": "uploads/abc.png" })))
        .expect(1)
        .mount(&server)
        .await;

    let file = signature_file();
    let stored = uploader_for(&server)
        .upload(&file)
        .await
        .expect("upload should succeed");
    assert_eq!(stored, "uploads/abc.png");

    let requests = server
        .received_requests()
        .await
        .expect("request recording should be enabled");
    assert_eq!(requests.len(), 1);
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(content_type.starts_with("multipart/form-data"), "{content_type}");

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"signature\""));
    assert!(body.contains("filename=\"signature.png\""));
    assert!(body.contains("image/png"));
}

#[tokio::test]
async fn alternate_path_field_names_are_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/signature"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "filePath": "/uploads/def.png" })),
        )
        .mount(&server)
        .await;

    let stored = uploader_for(&server)
        .upload(&signature_file())
        .await
        .expect("upload should succeed");
    assert_eq!(stored, "/uploads/def.png");
}

#[tokio::test]
async fn non_success_status_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/signature"))
        .respond_with(
            ResponseTemplate::new(413).set_body_json(json!({ "message": "file too large" })),
        )
        .mount(&server)
        .await;

    let error = uploader_for(&server)
        .upload(&signature_file())
        .await
        .expect_err("413 should be rejected");
    assert_eq!(error.kind, PadErrorKind::UploadRejected);
    assert_eq!(error.message, "file too large");
    assert_eq!(error.details, Some(json!({ "status": 413 })));
    assert!(error.notification().contains("file too large"));
}

#[tokio::test]
async fn rejection_without_json_body_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let error = uploader_for(&server)
        .upload(&signature_file())
        .await
        .expect_err("500 should be rejected");
    assert_eq!(error.kind, PadErrorKind::UploadRejected);
    assert!(error.message.contains("500"), "{}", error.message);
}

#[tokio::test]
async fn success_without_path_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let error = uploader_for(&server)
        .upload(&signature_file())
        .await
        .expect_err("missing path should be rejected");
    assert_eq!(error.kind, PadErrorKind::UploadRejected);
}

#[tokio::test]
async fn unreachable_server_is_network_unavailable() {
    let endpoint = Url::parse("http://127.0.0.1:1/upload/signature").expect("url should parse");
    let uploader = HttpUploader::with_timeout(endpoint, "signature", Duration::from_secs(2))
        .expect("client should build");

    let error = uploader
        .upload(&signature_file())
        .await
        .expect_err("nothing listens on port 1");
    assert_eq!(error.kind, PadErrorKind::NetworkUnavailable);
}
