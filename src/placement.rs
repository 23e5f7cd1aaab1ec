use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Top-left position and extent of an overlay, in page-raster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Point,
    pub size: Size,
}

impl Placement {
    pub const fn new(position: Point, size: Size) -> Self {
        Self { position, size }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.position.x
            && point.y >= self.position.y
            && point.x < self.position.x + self.size.width
            && point.y < self.position.y + self.size.height
    }

    /// Moves the placement so it stays inside `bounds`. An element larger than
    /// the bounds is pinned to the top-left edge.
    pub fn clamped_within(self, bounds: Size) -> Self {
        let max_x = (bounds.width - self.size.width).max(0.0);
        let max_y = (bounds.height - self.size.height).max(0.0);
        Self {
            position: Point::new(
                self.position.x.clamp(0.0, max_x),
                self.position.y.clamp(0.0, max_y),
            ),
            size: self.size,
        }
    }
}

/// Maps between the on-screen container an editor shows the page in and the
/// page raster itself. Both sizes are supplied by the caller; nothing here
/// measures live layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateSpace {
    container: Size,
    page: Size,
}

impl CoordinateSpace {
    pub fn new(container: Size, page: Size) -> Self {
        let container = if container.is_empty() { page } else { container };
        Self { container, page }
    }

    pub fn identity(page: Size) -> Self {
        Self::new(page, page)
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn page(&self) -> Size {
        self.page
    }

    pub fn to_page(&self, point: Point) -> Point {
        Point::new(
            point.x * self.page.width / self.container.width,
            point.y * self.page.height / self.container.height,
        )
    }

    pub fn to_container(&self, point: Point) -> Point {
        Point::new(
            point.x * self.container.width / self.page.width,
            point.y * self.container.height / self.page.height,
        )
    }
}

/// State of an in-progress drag: the offset between the pointer and the
/// dragged element's top-left corner, captured when the drag began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragGrip {
    grab_offset: Point,
}

impl DragGrip {
    pub fn begin(placement: &Placement, pointer_on_page: Point) -> Self {
        Self {
            grab_offset: Point::new(
                pointer_on_page.x - placement.position.x,
                pointer_on_page.y - placement.position.y,
            ),
        }
    }

    pub fn follow(&self, placement: Placement, pointer_on_page: Point, bounds: Size) -> Placement {
        Placement::new(
            Point::new(
                pointer_on_page.x - self.grab_offset.x,
                pointer_on_page.y - self.grab_offset.y,
            ),
            placement.size,
        )
        .clamped_within(bounds)
    }
}
