use serde_json::json;
use sigpad::codec;
use sigpad::compositor::{resolve_layers, Compositor, Layer, Overlay};
use sigpad::config::PadConfig;
use sigpad::errors::PadErrorKind;
use sigpad::loader::{HttpImageLoader, MemoryImageLoader};
use sigpad::locator::{Locator, DEFAULT_UPLOAD_PREFIX};
use sigpad::pad::{PadController, PadState};
use sigpad::placement::{Placement, Point, Size};
use sigpad::stroke::{PointerEvent, PointerPhase, PointerSource};
use sigpad::upload::{DirectoryUploader, HttpUploader};
use tempfile::tempdir;
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn solid(width: u32, height: u32, color: Color) -> Pixmap {
    let mut pixmap = Pixmap::new(width, height).expect("raster should allocate");
    let mut paint = Paint::default();
    paint.set_color(color);
    pixmap.fill_rect(
        Rect::from_xywh(0.0, 0.0, width as f32, height as f32).expect("rect"),
        &paint,
        Transform::identity(),
        None,
    );
    pixmap
}

fn inked(raster: &Pixmap, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> bool {
    ys.clone().any(|y| {
        xs.clone()
            .any(|x| raster.pixel(x, y).map_or(false, |pixel| pixel.alpha() > 0))
    })
}

#[tokio::test]
async fn saved_signature_and_text_land_on_an_800_by_600_page() {
    let dir = tempdir().expect("tempdir should create");
    let config = PadConfig::new("https://api.example.com/");
    let mut loader = MemoryImageLoader::new(config.origin().expect("origin"));
    loader.insert(
        "https://api.example.com/uploads/sig.png",
        solid(200, 100, Color::BLACK),
    );

    let mut pad = PadController::document(
        &config,
        Pixmap::new(800, 600).expect("page"),
        Size::new(800.0, 600.0),
        DirectoryUploader::new(dir.path(), "uploads/"),
        loader,
    )
    .expect("document pad should build");

    let signature = Locator::classify("/uploads/sig.png", DEFAULT_UPLOAD_PREFIX).expect("classify");
    pad.place_signature(signature, Point::new(600.0, 450.0), Size::new(200.0, 100.0))
        .await
        .expect("signature should place")
        .expect("document mode accepts overlays");
    pad.add_text("Approved", Point::new(20.0, 560.0))
        .expect("document mode accepts text");
    assert_eq!(pad.state(), PadState::Captured);

    let composed = pad.compose().await.expect("compose should succeed");
    assert_eq!((composed.width(), composed.height()), (800, 600));
    assert!(inked(&composed, 600..800, 450..550));
    assert!(inked(&composed, 20..120, 560..580));
    assert!(!inked(&composed, 0..590, 0..440));

    let locator = pad.save().await.expect("save should succeed");
    assert_eq!(pad.state(), PadState::Saved);
    let Locator::RelativePath(relative) = locator else {
        panic!("directory store returns relative paths");
    };
    let stored = std::fs::read(dir.path().join(relative)).expect("stored image");
    let decoded = codec::decode_raster(&stored).expect("stored image decodes");
    assert_eq!((decoded.width(), decoded.height()), (800, 600));
}

#[tokio::test]
async fn ink_from_a_scaled_container_lands_in_page_pixels() {
    let dir = tempdir().expect("tempdir should create");
    let config = PadConfig::new("https://api.example.com");
    let page = solid(400, 200, Color::WHITE);
    let mut pad = PadController::document(
        &config,
        page,
        Size::new(200.0, 100.0),
        DirectoryUploader::new(dir.path(), "uploads/"),
        MemoryImageLoader::new(config.origin().expect("origin")),
    )
    .expect("document pad should build");

    let event = |phase, x| PointerEvent::new(phase, PointerSource::Pen, x, 50.0, 0);
    pad.pointer(&event(PointerPhase::Down, 20.0));
    pad.pointer(&event(PointerPhase::Move, 80.0));
    pad.pointer(&event(PointerPhase::Up, 80.0));

    let composed = pad.compose().await.expect("compose should succeed");
    let at = |x, y| composed.pixel(x, y).expect("pixel in bounds");
    assert_eq!(at(100, 100).red(), 0, "ink drawn at page (100, 100)");
    assert_eq!(at(100, 150).red(), 255, "page untouched below the stroke");
    assert_eq!(at(10, 10).alpha(), 255, "page stays opaque");
}

#[tokio::test]
async fn dragging_keeps_overlays_inside_the_page() {
    let config = PadConfig::new("https://api.example.com");
    let mut pad = PadController::document(
        &config,
        Pixmap::new(800, 600).expect("page"),
        Size::new(400.0, 300.0),
        DirectoryUploader::new(std::env::temp_dir(), "uploads/"),
        MemoryImageLoader::new(config.origin().expect("origin")),
    )
    .expect("document pad should build");

    let id = pad
        .place_signature(
            Locator::RelativePath("uploads/a.png".to_owned()),
            Point::new(100.0, 100.0),
            Size::new(200.0, 100.0),
        )
        .await
        .expect("signature should place")
        .expect("placed");

    assert!(pad.begin_drag(id, Point::new(60.0, 60.0)));
    let placement = pad
        .drag_to(Point::new(10_000.0, 10_000.0))
        .expect("drag applies");
    assert_eq!(placement.position, Point::new(600.0, 500.0));

    pad.resize_container(Size::new(800.0, 600.0));
    let placement = pad.drag_to(Point::new(-50.0, 0.0)).expect("drag applies");
    assert_eq!(placement.position, Point::new(0.0, 0.0));
    assert_eq!(pad.end_drag(), Some(id));
}

#[tokio::test]
async fn failed_overlay_load_aborts_save_before_upload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/signature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "path": "uploads/x.png" })))
        .expect(0)
        .mount(&server)
        .await;

    let config = PadConfig::new(server.uri());
    let origin = config.origin().expect("origin");
    let mut pad = PadController::document(
        &config,
        Pixmap::new(100, 100).expect("page"),
        Size::default(),
        HttpUploader::new(
            reqwest::Client::new(),
            config.upload_endpoint().expect("endpoint"),
            "signature",
        ),
        HttpImageLoader::new(reqwest::Client::new(), origin),
    )
    .expect("document pad should build");

    pad.place_signature(
        Locator::RelativePath("uploads/missing.png".to_owned()),
        Point::new(0.0, 0.0),
        Size::new(50.0, 25.0),
    )
    .await
    .expect("fixed-size placement needs no load");
    let error = pad.save().await.expect_err("missing overlay should fail");
    assert_eq!(error.kind, PadErrorKind::OverlaySourceUnavailable);
    assert_eq!(
        pad.state(),
        PadState::Error(PadErrorKind::OverlaySourceUnavailable)
    );
    assert_eq!(error.details, Some(json!({ "overlay": 0, "source": "relative_path" })));
}

#[tokio::test]
async fn http_loader_fetches_relative_overlays_from_the_origin() {
    let server = MockServer::start().await;
    let signature = codec::encode(&solid(20, 10, Color::BLACK)).expect("encode");
    Mock::given(method("GET"))
        .and(path("/uploads/sig.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(signature.bytes().to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = PadConfig::new(server.uri());
    let loader = HttpImageLoader::new(reqwest::Client::new(), config.origin().expect("origin"));
    let overlays = vec![
        Overlay::Image {
            source: Locator::RelativePath("uploads/sig.png".to_owned()),
            placement: Placement::new(Point::new(5.0, 5.0), Size::new(40.0, 20.0)),
        },
        Overlay::Text {
            content: "OK".to_owned(),
            position: Point::new(0.0, 40.0),
            style: Default::default(),
        },
    ];

    let layers = resolve_layers(&loader, &overlays).await.expect("layers resolve");
    assert!(matches!(&layers[0], Layer::Image { raster, .. } if raster.width() == 20));
    assert!(matches!(&layers[1], Layer::Text { content, .. } if content == "OK"));

    let composed = Compositor::default()
        .composite(&Pixmap::new(64, 64).expect("base"), &layers)
        .expect("composite");
    assert_eq!(composed.pixel(30, 15).expect("pixel").alpha(), 255);
}
