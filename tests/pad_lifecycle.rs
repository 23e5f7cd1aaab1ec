use serde_json::json;
use sigpad::codec;
use sigpad::config::PadConfig;
use sigpad::errors::PadErrorKind;
use sigpad::loader::MemoryImageLoader;
use sigpad::locator::Locator;
use sigpad::pad::{PadController, PadState};
use sigpad::stroke::{PointerEvent, PointerPhase, PointerSource};
use sigpad::upload::{DirectoryUploader, HttpUploader};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn draw_stroke<U, L>(pad: &mut PadController<U, L>, y: f32, source: PointerSource)
where
    U: sigpad::upload::SignatureUploader,
    L: sigpad::loader::ImageLoader,
{
    let event = |phase, x: f32| PointerEvent::new(phase, source, x, y, (x * 10.0) as u64);
    pad.pointer(&event(PointerPhase::Down, 4.0));
    for x in [12.0, 24.0, 36.0, 48.0] {
        pad.pointer(&event(PointerPhase::Move, x));
    }
    pad.pointer(&event(PointerPhase::Leave, 48.0));
}

fn memory_loader(config: &PadConfig) -> MemoryImageLoader {
    MemoryImageLoader::new(config.origin().expect("origin should parse"))
}

#[test]
fn undoing_k_of_n_strokes_matches_the_raster_after_n_minus_k() {
    let dir = tempdir().expect("tempdir should create");
    let config = PadConfig::new("https://api.example.com");
    let mut pad = PadController::standalone(
        &config,
        64,
        64,
        DirectoryUploader::new(dir.path(), "uploads/"),
        memory_loader(&config),
    )
    .expect("pad should build");

    let sources = [PointerSource::Mouse, PointerSource::Touch, PointerSource::Pen];
    let mut after = vec![pad.surface().clone()];
    for (index, y) in [6.0, 18.0, 30.0, 42.0, 54.0].into_iter().enumerate() {
        draw_stroke(&mut pad, y, sources[index % sources.len()]);
        after.push(pad.surface().clone());
    }

    let n = after.len() - 1;
    for k in 1..=n {
        assert!(pad.undo(), "undo {k} should apply");
        assert!(pad.surface() == &after[n - k], "raster after {k} undos");
    }
    assert!(!pad.undo(), "undo at the first entry is a no-op");
    assert!(pad.surface() == &after[0]);
}

#[tokio::test]
async fn saving_nothing_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "path": "uploads/x.png" })))
        .expect(0)
        .mount(&server)
        .await;

    let config = PadConfig::new(server.uri());
    let uploader = HttpUploader::new(
        reqwest::Client::new(),
        config.upload_endpoint().expect("endpoint"),
        "signature",
    );
    let mut pad = PadController::standalone(&config, 32, 32, uploader, memory_loader(&config))
        .expect("pad should build");

    assert!(!pad.can_save());
    let error = pad.save().await.expect_err("empty pad should not save");
    assert_eq!(error.kind, PadErrorKind::EmptyCapture);
    assert_eq!(pad.state(), PadState::Empty);
}

#[tokio::test]
async fn stroke_save_display_round_trip_against_mock_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "path": "uploads/abc.png" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = PadConfig::new(format!("{}/", server.uri()));
    let uploader = HttpUploader::new(
        reqwest::Client::new(),
        config.upload_endpoint().expect("endpoint"),
        config.upload_field.clone(),
    );
    let mut pad = PadController::standalone(&config, 64, 32, uploader, memory_loader(&config))
        .expect("pad should build");

    draw_stroke(&mut pad, 16.0, PointerSource::Touch);
    assert_eq!(pad.state(), PadState::Drawing);
    assert!(pad.can_undo());

    let locator = pad.save().await.expect("save should succeed");
    assert_eq!(locator, Locator::RelativePath("uploads/abc.png".to_owned()));
    assert_eq!(pad.state(), PadState::Saved);
    assert_eq!(
        pad.display_url(),
        Some(format!("{}/uploads/abc.png", server.uri()))
    );

    let requests = server.received_requests().await.expect("recording enabled");
    let uploaded = codec::encode(pad.surface()).expect("surface should encode");
    let body = &requests[0].body;
    assert!(
        body.windows(uploaded.bytes().len())
            .any(|window| window == uploaded.bytes()),
        "multipart body should carry the encoded surface"
    );
}

#[tokio::test]
async fn rejected_upload_leaves_error_until_cleared() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "error": "bad image" })))
        .mount(&server)
        .await;

    let config = PadConfig::new(server.uri());
    let uploader = HttpUploader::new(
        reqwest::Client::new(),
        config.upload_endpoint().expect("endpoint"),
        "signature",
    );
    let mut pad = PadController::standalone(&config, 32, 32, uploader, memory_loader(&config))
        .expect("pad should build");
    draw_stroke(&mut pad, 10.0, PointerSource::Mouse);

    let error = pad.save().await.expect_err("422 should fail");
    assert_eq!(error.kind, PadErrorKind::UploadRejected);
    assert_eq!(pad.state(), PadState::Error(PadErrorKind::UploadRejected));
    let notification = pad.notification().expect("failure should be explained");
    assert!(notification.contains("bad image"), "{notification}");

    pad.clear();
    assert_eq!(pad.state(), PadState::Empty);
    assert!(!pad.can_undo());
    assert!(pad.notification().is_none());
    assert!(pad.surface().pixels().iter().all(|pixel| pixel.alpha() == 0));
}

#[tokio::test]
async fn directory_store_writes_the_composed_png() {
    let dir = tempdir().expect("tempdir should create");
    let config = PadConfig::new("https://api.example.com");
    let mut pad = PadController::standalone(
        &config,
        40,
        20,
        DirectoryUploader::new(dir.path(), config.upload_prefix.clone()),
        memory_loader(&config),
    )
    .expect("pad should build");
    draw_stroke(&mut pad, 10.0, PointerSource::Pen);

    let locator = pad.save().await.expect("save should succeed");
    let Locator::RelativePath(relative) = &locator else {
        panic!("expected a relative path, got {locator:?}");
    };
    let stored = std::fs::read(dir.path().join(relative)).expect("stored file should exist");
    let decoded = codec::decode_raster(&stored).expect("stored file should decode");
    assert_eq!((decoded.width(), decoded.height()), (40, 20));
    assert!(pad
        .display_url()
        .expect("saved")
        .starts_with("https://api.example.com/uploads/signature-"));
}
