use tiny_skia::Pixmap;
use tracing::debug;

/// Immutable copy of the raster at one point in the session. Pixels are kept
/// premultiplied exactly as the surface holds them, so restoring is lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Snapshot {
    pub fn capture(surface: &Pixmap) -> Self {
        Self {
            width: surface.width(),
            height: surface.height(),
            pixels: surface.data().to_vec(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn restore_into(&self, surface: &mut Pixmap) -> bool {
        if surface.width() != self.width || surface.height() != self.height {
            return false;
        }
        surface.data_mut().copy_from_slice(&self.pixels);
        true
    }
}

/// Linear undo over completed strokes.
///
/// `position` indexes the entry matching the visible raster. Recording after
/// an undo drops everything past `position` before appending.
#[derive(Debug, Default)]
pub struct HistoryStack {
    entries: Vec<Snapshot>,
    position: usize,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, surface: &Pixmap) {
        if !self.entries.is_empty() {
            let dropped = self.entries.len() - (self.position + 1);
            if dropped > 0 {
                debug!(dropped, "discarding undone history branch");
            }
            self.entries.truncate(self.position + 1);
        }
        self.entries.push(Snapshot::capture(surface));
        self.position = self.entries.len() - 1;
    }

    /// Steps back one entry and restores it into `surface`. Returns `false`
    /// without touching anything when already at the first entry.
    pub fn undo(&mut self, surface: &mut Pixmap) -> bool {
        if self.position == 0 {
            return false;
        }
        let target = self.position - 1;
        if !self.entries[target].restore_into(surface) {
            debug!("snapshot dimensions no longer match the surface; undo skipped");
            return false;
        }
        self.position = target;
        true
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.position)
    }
}
