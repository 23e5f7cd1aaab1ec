use crate::compositor::Overlay;
use crate::locator::Locator;
use crate::placement::{CoordinateSpace, DragGrip, Placement, Point, Size};
use crate::text::TextStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(u32);

impl OverlayId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    Signature(Locator),
    Text { content: String, style: TextStyle },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOverlay {
    pub id: OverlayId,
    pub content: OverlayContent,
    pub placement: Placement,
}

impl PlacedOverlay {
    fn to_overlay(&self) -> Overlay {
        match &self.content {
            OverlayContent::Signature(locator) => Overlay::Image {
                source: locator.clone(),
                placement: self.placement,
            },
            OverlayContent::Text { content, style } => Overlay::Text {
                content: content.clone(),
                position: self.placement.position,
                style: *style,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveDrag {
    id: OverlayId,
    grip: DragGrip,
}

/// Overlays placed on a document page, in draw order, plus the drag in
/// progress. Positions are page pixels; pointer input arrives in container
/// pixels and goes through the coordinate space.
#[derive(Debug, Clone)]
pub struct OverlayBoard {
    space: CoordinateSpace,
    overlays: Vec<PlacedOverlay>,
    drag: Option<ActiveDrag>,
    next_id: u32,
}

impl OverlayBoard {
    pub fn new(space: CoordinateSpace) -> Self {
        Self {
            space,
            overlays: Vec::new(),
            drag: None,
            next_id: 1,
        }
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    pub fn resize_container(&mut self, container: Size) {
        self.space = CoordinateSpace::new(container, self.space.page());
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn overlays(&self) -> &[PlacedOverlay] {
        &self.overlays
    }

    pub fn get(&self, id: OverlayId) -> Option<&PlacedOverlay> {
        self.overlays.iter().find(|overlay| overlay.id == id)
    }

    /// Adds an overlay on top of the existing ones, clamped to the page.
    pub fn place(&mut self, content: OverlayContent, placement: Placement) -> OverlayId {
        let id = OverlayId(self.next_id);
        self.next_id += 1;
        self.overlays.push(PlacedOverlay {
            id,
            content,
            placement: placement.clamped_within(self.space.page()),
        });
        id
    }

    pub fn remove(&mut self, id: OverlayId) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|overlay| overlay.id != id);
        if self.drag.map_or(false, |drag| drag.id == id) {
            self.drag = None;
        }
        before != self.overlays.len()
    }

    pub fn clear(&mut self) {
        self.overlays.clear();
        self.drag = None;
    }

    /// Topmost overlay under a container-space point.
    pub fn hit_test(&self, container_point: Point) -> Option<OverlayId> {
        let page_point = self.space.to_page(container_point);
        self.overlays
            .iter()
            .rev()
            .find(|overlay| overlay.placement.contains(page_point))
            .map(|overlay| overlay.id)
    }

    pub fn begin_drag(&mut self, id: OverlayId, container_point: Point) -> bool {
        let page_point = self.space.to_page(container_point);
        let Some(overlay) = self.get(id) else {
            return false;
        };
        self.drag = Some(ActiveDrag {
            id,
            grip: DragGrip::begin(&overlay.placement, page_point),
        });
        true
    }

    /// Moves the dragged overlay under the pointer and returns its new
    /// placement.
    pub fn drag_to(&mut self, container_point: Point) -> Option<Placement> {
        let drag = self.drag?;
        let page_point = self.space.to_page(container_point);
        let bounds = self.space.page();
        let overlay = self.overlays.iter_mut().find(|overlay| overlay.id == drag.id)?;
        overlay.placement = drag.grip.follow(overlay.placement, page_point, bounds);
        Some(overlay.placement)
    }

    pub fn end_drag(&mut self) -> Option<OverlayId> {
        self.drag.take().map(|drag| drag.id)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Compositor instructions in draw order.
    pub fn to_overlays(&self) -> Vec<Overlay> {
        self.overlays.iter().map(PlacedOverlay::to_overlay).collect()
    }
}
