use serde::{Deserialize, Serialize};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke as SkiaStroke, Transform,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerSource {
    Mouse,
    Touch,
    Pen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Leave,
}

/// One pointer event as delivered by the host surface, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    #[serde(default = "default_source")]
    pub source: PointerSource,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub timestamp_ms: u64,
}

fn default_source() -> PointerSource {
    PointerSource::Mouse
}

impl PointerEvent {
    pub fn new(
        phase: PointerPhase,
        source: PointerSource,
        x: f32,
        y: f32,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            phase,
            source,
            x,
            y,
            timestamp_ms,
        }
    }

    pub fn sample(&self) -> Sample {
        Sample {
            x: self.x,
            y: self.y,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub timestamp_ms: u64,
}

/// A completed gesture. Handed back once so callers can log or count it; the
/// ink itself already lives in the raster.
#[derive(Debug, Clone, Default)]
pub struct Stroke {
    samples: Vec<Sample>,
}

impl Stroke {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pen {
    pub width: f32,
    pub color: Color,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            width: 2.5,
            color: Color::BLACK,
        }
    }
}

#[derive(Debug, Default)]
pub struct StrokeRecorder {
    pen: Pen,
    active: Option<Stroke>,
}

impl StrokeRecorder {
    pub fn new(pen: Pen) -> Self {
        Self { pen, active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Routes an event to the matching phase handler. Returns the stroke when
    /// the event finished one.
    pub fn handle(&mut self, surface: &mut Pixmap, event: &PointerEvent) -> Option<Stroke> {
        trace!(phase = ?event.phase, source = ?event.source, x = event.x, y = event.y, "pointer event");
        match event.phase {
            PointerPhase::Down => {
                self.pointer_down(surface, event.sample());
                None
            }
            PointerPhase::Move => {
                self.pointer_move(surface, event.sample());
                None
            }
            PointerPhase::Up | PointerPhase::Leave => self.pointer_up(),
        }
    }

    pub fn pointer_down(&mut self, surface: &mut Pixmap, sample: Sample) {
        // A down without a matching up (pointer captured elsewhere) starts over.
        if let Some(dangling) = self.active.take() {
            debug!(samples = dangling.samples.len(), "discarding unterminated stroke");
        }
        self.draw_dot(surface, sample);
        self.active = Some(Stroke {
            samples: vec![sample],
        });
    }

    pub fn pointer_move(&mut self, surface: &mut Pixmap, sample: Sample) -> bool {
        let Some(stroke) = self.active.as_mut() else {
            return false;
        };
        let Some(previous) = stroke.samples.last().copied() else {
            return false;
        };
        stroke.samples.push(sample);
        self.draw_segment(surface, previous, sample);
        true
    }

    pub fn pointer_up(&mut self) -> Option<Stroke> {
        let stroke = self.active.take()?;
        debug!(
            samples = stroke.samples.len(),
            duration_ms = stroke.duration_ms(),
            "stroke finished"
        );
        Some(stroke)
    }

    fn paint(&self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(self.pen.color);
        paint.anti_alias = true;
        paint
    }

    fn draw_segment(&self, surface: &mut Pixmap, from: Sample, to: Sample) {
        let mut builder = PathBuilder::new();
        builder.move_to(from.x, from.y);
        builder.line_to(to.x, to.y);
        let Some(path) = builder.finish() else {
            return;
        };

        let stroke = SkiaStroke {
            width: self.pen.width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };
        surface.stroke_path(&path, &self.paint(), &stroke, Transform::identity(), None);
    }

    fn draw_dot(&self, surface: &mut Pixmap, at: Sample) {
        let radius = (self.pen.width / 2.0).max(0.5);
        let Some(path) = PathBuilder::from_circle(at.x, at.y, radius) else {
            return;
        };
        surface.fill_path(
            &path,
            &self.paint(),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}
