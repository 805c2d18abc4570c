/// Minimum padding, in pixels, drawn around a detection box.
pub const MIN_MARKER_PADDING_PX: f64 = 4.0;
/// Half-size, in document units, of a marker the user places by clicking.
pub const ADDED_MARKER_RADIUS: f64 = 10.0;

/// A detection box in document units (PDF points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl Position {
    pub fn from_bounds(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0,
            top,
            x1,
            bottom,
            center_x: (x0 + x1) / 2.0,
            center_y: (top + bottom) / 2.0,
        }
    }

    pub fn around(center_x: f64, center_y: f64, radius: f64) -> Self {
        Self {
            x0: center_x - radius,
            top: center_y - radius,
            x1: center_x + radius,
            bottom: center_y + radius,
            center_x,
            center_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Maps between document space `(W, H)` and a rendered page of `(w, h)` pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    page_width: f64,
    page_height: f64,
    rendered_width: f64,
    rendered_height: f64,
}

impl PageTransform {
    /// Returns `None` when either side has a non-positive extent.
    pub fn new(
        page_width: f64,
        page_height: f64,
        rendered_width: f64,
        rendered_height: f64,
    ) -> Option<Self> {
        let extents = [page_width, page_height, rendered_width, rendered_height];
        if extents.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return None;
        }
        Some(Self {
            page_width,
            page_height,
            rendered_width,
            rendered_height,
        })
    }

    pub fn to_pixels(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.rendered_width / self.page_width,
            y * self.rendered_height / self.page_height,
        )
    }

    pub fn to_document(&self, px: f64, py: f64) -> (f64, f64) {
        (
            px * self.page_width / self.rendered_width,
            py * self.page_height / self.rendered_height,
        )
    }

    /// Pixel rectangle for a detection, padded so small boxes stay clickable.
    pub fn marker_rect(&self, position: &Position) -> PixelRect {
        let (left, top) = self.to_pixels(position.x0, position.top);
        let (right, bottom) = self.to_pixels(position.x1, position.bottom);
        let (width, height) = (right - left, bottom - top);
        let padding = MIN_MARKER_PADDING_PX.max(width.min(height) / 2.0);
        PixelRect {
            left: left - padding,
            top: top - padding,
            width: width + 2.0 * padding,
            height: height + 2.0 * padding,
        }
    }
}
