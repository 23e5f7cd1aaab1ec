use serde_json::json;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};
use tracing::debug;

use crate::errors::PadError;
use crate::loader::ImageLoader;
use crate::locator::Locator;
use crate::placement::{Placement, Point};
use crate::text::{TextPainter, TextStyle};

/// An overlay as placed by the editor, before its source is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Image {
        source: Locator,
        placement: Placement,
    },
    Text {
        content: String,
        position: Point,
        style: TextStyle,
    },
}

/// A drawable layer. Image layers hold decoded pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Image {
        raster: Pixmap,
        placement: Placement,
    },
    Text {
        content: String,
        position: Point,
        style: TextStyle,
    },
}

/// Loads every image source in `overlays`, in order, awaiting each before the
/// next. Any failed load fails the whole set.
pub async fn resolve_layers<L: ImageLoader>(
    loader: &L,
    overlays: &[Overlay],
) -> Result<Vec<Layer>, PadError> {
    let mut layers = Vec::with_capacity(overlays.len());
    for (index, overlay) in overlays.iter().enumerate() {
        let layer = match overlay {
            Overlay::Image { source, placement } => {
                let raster = loader.load(source).await.map_err(|error| {
                    PadError::overlay_unavailable(format!(
                        "overlay {index} ({}) could not be loaded: {}",
                        source.kind(),
                        error.message
                    ))
                    .with_details(json!({ "overlay": index, "source": source.kind() }))
                })?;
                debug!(
                    index,
                    width = raster.width(),
                    height = raster.height(),
                    "overlay source loaded"
                );
                Layer::Image {
                    raster,
                    placement: *placement,
                }
            }
            Overlay::Text {
                content,
                position,
                style,
            } => Layer::Text {
                content: content.clone(),
                position: *position,
                style: *style,
            },
        };
        layers.push(layer);
    }
    Ok(layers)
}

#[derive(Debug, Default)]
pub struct Compositor {
    painter: TextPainter,
}

impl Compositor {
    pub fn new(painter: TextPainter) -> Self {
        Self { painter }
    }

    pub fn painter(&self) -> &TextPainter {
        &self.painter
    }

    /// Draws `base`, then each layer in list order, into a new raster the size
    /// of `base`. `base` itself is left untouched.
    pub fn composite(&mut self, base: &Pixmap, layers: &[Layer]) -> Result<Pixmap, PadError> {
        let mut output = base.clone();

        for (index, layer) in layers.iter().enumerate() {
            match layer {
                Layer::Image { raster, placement } => {
                    if raster.width() == 0 || raster.height() == 0 {
                        return Err(PadError::overlay_unavailable(format!(
                            "overlay {index} has no pixels"
                        )));
                    }
                    draw_image(&mut output, raster, placement);
                }
                Layer::Text {
                    content,
                    position,
                    style,
                } => self.painter.draw(&mut output, content, *position, style),
            }
        }

        debug!(
            width = output.width(),
            height = output.height(),
            layers = layers.len(),
            "composited document image"
        );
        Ok(output)
    }
}

fn draw_image(target: &mut Pixmap, raster: &Pixmap, placement: &Placement) {
    let (scale_x, scale_y) = if placement.size.is_empty() {
        (1.0, 1.0)
    } else {
        (
            placement.size.width / raster.width() as f32,
            placement.size.height / raster.height() as f32,
        )
    };
    let transform = Transform::from_scale(scale_x, scale_y)
        .post_translate(placement.position.x, placement.position.y);
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..Default::default()
    };
    target.draw_pixmap(0, 0, raster.as_ref(), &paint, transform, None);
}
