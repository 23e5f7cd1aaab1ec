use anyhow::{anyhow, Result};
use tiny_skia::{Color, Pixmap};
use tracing::{debug, info, warn};

use crate::codec;
use crate::compositor::{resolve_layers, Compositor, Layer};
use crate::config::PadConfig;
use crate::errors::{PadError, PadErrorKind};
use crate::history::HistoryStack;
use crate::loader::ImageLoader;
use crate::locator::{BaseOrigin, Locator};
use crate::overlay::{OverlayBoard, OverlayContent, OverlayId, PlacedOverlay};
use crate::placement::{CoordinateSpace, Placement, Point, Size};
use crate::stroke::{Pen, PointerEvent, StrokeRecorder};
use crate::text::TextStyle;
use crate::upload::SignatureUploader;

/// File name the composed image is uploaded under.
pub const SIGNATURE_FILE_NAME: &str = "signature.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadState {
    Empty,
    Drawing,
    /// Document mode with overlays placed but no freehand ink.
    Captured,
    Uploading,
    Saved,
    Error(PadErrorKind),
}

impl PadState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Drawing => "drawing",
            Self::Captured => "captured",
            Self::Uploading => "uploading",
            Self::Saved => "saved",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug)]
struct Document {
    page: Pixmap,
    board: OverlayBoard,
}

/// Owns one drawing surface and drives it from first stroke to stored
/// reference.
///
/// Ink is recorded on its own transparent raster. In document mode that
/// raster matches the page size, and pointer input arrives in container
/// pixels. Overlay operations return `None` in standalone mode.
#[derive(Debug)]
pub struct PadController<U, L> {
    ink: Pixmap,
    recorder: StrokeRecorder,
    history: HistoryStack,
    document: Option<Document>,
    compositor: Compositor,
    origin: BaseOrigin,
    upload_prefix: String,
    pen: Pen,
    text_style: TextStyle,
    uploader: U,
    loader: L,
    state: PadState,
    saved: Option<Locator>,
    last_error: Option<PadError>,
}

impl<U: SignatureUploader, L: ImageLoader> PadController<U, L> {
    pub fn standalone(
        config: &PadConfig,
        width: u32,
        height: u32,
        uploader: U,
        loader: L,
    ) -> Result<Self> {
        let ink = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("pad surface must be non-empty, got {width}x{height}"))?;
        Self::build(config, ink, None, uploader, loader)
    }

    /// Document mode over `page`. `container` is the on-screen size the page
    /// is shown at; an empty size means the page is shown 1:1.
    pub fn document(
        config: &PadConfig,
        page: Pixmap,
        container: Size,
        uploader: U,
        loader: L,
    ) -> Result<Self> {
        let ink = Pixmap::new(page.width(), page.height()).ok_or_else(|| {
            anyhow!(
                "document page must be non-empty, got {}x{}",
                page.width(),
                page.height()
            )
        })?;
        let page_size = Size::new(page.width() as f32, page.height() as f32);
        let board = OverlayBoard::new(CoordinateSpace::new(container, page_size));
        Self::build(config, ink, Some(Document { page, board }), uploader, loader)
    }

    fn build(
        config: &PadConfig,
        ink: Pixmap,
        document: Option<Document>,
        uploader: U,
        loader: L,
    ) -> Result<Self> {
        let pen = config.pen();
        let mut controller = Self {
            ink,
            recorder: StrokeRecorder::new(pen),
            history: HistoryStack::new(),
            document,
            compositor: Compositor::new(config.text_painter()?),
            origin: config.origin()?,
            upload_prefix: config.upload_prefix.clone(),
            pen,
            text_style: config.text_style(),
            uploader,
            loader,
            state: PadState::Empty,
            saved: None,
            last_error: None,
        };
        controller.history.record(&controller.ink);
        Ok(controller)
    }

    pub fn state(&self) -> PadState {
        self.state
    }

    pub fn is_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn can_undo(&self) -> bool {
        self.state != PadState::Uploading && !self.recorder.is_active() && self.history.can_undo()
    }

    pub fn can_save(&self) -> bool {
        matches!(
            self.state,
            PadState::Drawing | PadState::Captured | PadState::Error(_)
        )
    }

    /// The ink raster.
    pub fn surface(&self) -> &Pixmap {
        &self.ink
    }

    pub fn page(&self) -> Option<&Pixmap> {
        self.document.as_ref().map(|document| &document.page)
    }

    pub fn overlays(&self) -> &[PlacedOverlay] {
        match &self.document {
            Some(document) => document.board.overlays(),
            None => &[],
        }
    }

    pub fn saved(&self) -> Option<&Locator> {
        self.saved.as_ref()
    }

    pub fn last_error(&self) -> Option<&PadError> {
        self.last_error.as_ref()
    }

    pub fn notification(&self) -> Option<String> {
        self.last_error.as_ref().map(PadError::notification)
    }

    /// Absolute URL of the saved reference.
    pub fn display_url(&self) -> Option<String> {
        self.saved
            .as_ref()
            .map(|locator| locator.display_url(&self.origin))
    }

    /// Feeds one pointer event. Document-mode coordinates are container
    /// pixels. A finished stroke is committed to history.
    pub fn pointer(&mut self, event: &PointerEvent) {
        if self.state == PadState::Uploading {
            return;
        }
        let mut event = *event;
        if let Some(document) = &self.document {
            let mapped = document.board.space().to_page(Point::new(event.x, event.y));
            event.x = mapped.x;
            event.y = mapped.y;
        }

        if self.recorder.handle(&mut self.ink, &event).is_some() {
            self.history.record(&self.ink);
            self.touch();
        }
    }

    /// Steps back one finished stroke. Refused while a stroke is in progress.
    pub fn undo(&mut self) -> bool {
        if self.state == PadState::Uploading || self.recorder.is_active() {
            return false;
        }
        if !self.history.undo(&mut self.ink) {
            return false;
        }
        debug!(position = self.history.position(), "undo");
        self.touch();
        true
    }

    /// Back to a blank surface from any state. Drops history, overlays, the
    /// saved reference and the last error.
    pub fn clear(&mut self) {
        self.ink.fill(Color::TRANSPARENT);
        self.recorder = StrokeRecorder::new(self.pen);
        self.history.reset();
        self.history.record(&self.ink);
        if let Some(document) = self.document.as_mut() {
            document.board.clear();
        }
        self.saved = None;
        self.last_error = None;
        self.transition(PadState::Empty);
    }

    /// Composites, encodes and uploads the current capture.
    ///
    /// From `Saved` the existing reference is returned without uploading
    /// again. An empty capture fails with `EmptyCapture` before any network
    /// call and leaves the state as it was.
    pub async fn save(&mut self) -> Result<Locator, PadError> {
        self.save_image(None).await
    }

    /// Same as `save`, but uploads `composed` instead of composing again.
    /// `composed` must come from `compose` with no edits in between.
    pub async fn save_composed(&mut self, composed: &Pixmap) -> Result<Locator, PadError> {
        self.save_image(Some(composed)).await
    }

    async fn save_image(&mut self, composed: Option<&Pixmap>) -> Result<Locator, PadError> {
        if self.state == PadState::Saved {
            if let Some(saved) = &self.saved {
                return Ok(saved.clone());
            }
        }
        if !self.has_content() {
            let error = PadError::empty_capture();
            self.last_error = Some(error.clone());
            return Err(error);
        }

        self.transition(PadState::Uploading);
        match self.compose_and_upload(composed).await {
            Ok(locator) => {
                info!(kind = locator.kind(), "signature saved");
                self.saved = Some(locator.clone());
                self.last_error = None;
                self.transition(PadState::Saved);
                Ok(locator)
            }
            Err(error) => {
                warn!(code = error.code(), message = error.message.as_str(), "save failed");
                self.last_error = Some(error.clone());
                self.transition(PadState::Error(error.kind));
                Err(error)
            }
        }
    }

    /// Classifies a previously stored reference and shows it as saved.
    pub fn load_saved(&mut self, raw: &str) -> Result<(), PadError> {
        match Locator::classify(raw, &self.upload_prefix) {
            Ok(locator) => {
                self.saved = Some(locator);
                self.last_error = None;
                self.transition(PadState::Saved);
                Ok(())
            }
            Err(error) => {
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// The image `save` would upload: ink alone in standalone mode, or page,
    /// ink and overlays in document mode. Does not change state.
    pub async fn compose(&mut self) -> Result<Pixmap, PadError> {
        let Some(document) = &self.document else {
            return Ok(self.ink.clone());
        };

        let overlays = document.board.to_overlays();
        let page_size = document.board.space().page();
        let mut layers = Vec::with_capacity(overlays.len() + 1);
        layers.push(Layer::Image {
            raster: self.ink.clone(),
            placement: Placement::new(Point::default(), page_size),
        });
        layers.extend(resolve_layers(&self.loader, &overlays).await?);

        self.compositor.composite(&document.page, &layers)
    }

    /// Places a saved signature at a page position. An empty `size` means the
    /// image's own size, which is loaded first so the placement can be kept
    /// on the page. Returns `Ok(None)` in standalone mode.
    pub async fn place_signature(
        &mut self,
        source: Locator,
        position: Point,
        size: Size,
    ) -> Result<Option<OverlayId>, PadError> {
        if self.document.is_none() {
            return Ok(None);
        }
        let size = if size.is_empty() {
            let raster = self.loader.load(&source).await?;
            Size::new(raster.width() as f32, raster.height() as f32)
        } else {
            size
        };

        let Some(document) = self.document.as_mut() else {
            return Ok(None);
        };
        let id = document.board.place(
            OverlayContent::Signature(source),
            Placement::new(position, size),
        );
        self.touch();
        Ok(Some(id))
    }

    /// Adds a text overlay at a page position, sized by measuring the text.
    pub fn add_text(&mut self, content: impl Into<String>, position: Point) -> Option<OverlayId> {
        let content = content.into();
        let size = self.compositor.painter().measure(&content, &self.text_style);
        let document = self.document.as_mut()?;
        let id = document.board.place(
            OverlayContent::Text {
                content,
                style: self.text_style,
            },
            Placement::new(position, size),
        );
        self.touch();
        Some(id)
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> bool {
        let removed = self
            .document
            .as_mut()
            .map_or(false, |document| document.board.remove(id));
        if removed {
            self.touch();
        }
        removed
    }

    /// Topmost overlay under a container point.
    pub fn overlay_at(&self, point: Point) -> Option<OverlayId> {
        self.document.as_ref()?.board.hit_test(point)
    }

    pub fn begin_drag(&mut self, id: OverlayId, point: Point) -> bool {
        self.document
            .as_mut()
            .map_or(false, |document| document.board.begin_drag(id, point))
    }

    pub fn drag_to(&mut self, point: Point) -> Option<Placement> {
        let placement = self.document.as_mut()?.board.drag_to(point)?;
        self.touch();
        Some(placement)
    }

    pub fn end_drag(&mut self) -> Option<OverlayId> {
        self.document.as_mut()?.board.end_drag()
    }

    pub fn resize_container(&mut self, container: Size) {
        if let Some(document) = self.document.as_mut() {
            document.board.resize_container(container);
        }
    }

    async fn compose_and_upload(&mut self, composed: Option<&Pixmap>) -> Result<Locator, PadError> {
        let encoded = match composed {
            Some(composed) => codec::encode(composed)?,
            None => codec::encode(&self.compose().await?)?,
        };
        let file = codec::decode_to_file(&encoded.to_data_url(), SIGNATURE_FILE_NAME)?;
        let path = self.uploader.upload(&file).await?;
        Locator::classify(&path, &self.upload_prefix)
    }

    fn has_content(&self) -> bool {
        self.history.position() > 0 || !self.overlays().is_empty()
    }

    /// Re-derives the editing state after the capture changed.
    fn touch(&mut self) {
        let next = if self.history.position() > 0 {
            PadState::Drawing
        } else if !self.overlays().is_empty() {
            PadState::Captured
        } else {
            PadState::Empty
        };
        self.transition(next);
    }

    fn transition(&mut self, next: PadState) {
        if self.state != next {
            info!(from = self.state.label(), to = next.label(), "pad state changed");
            self.state = next;
        }
    }
}
