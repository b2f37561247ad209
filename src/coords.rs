//! Mapping between normalized page rectangles and pixel space
//!
//! Annotations are stored as fractions of a page's intrinsic size. Every
//! overlay, draft and scrollbar computation converts through this module
//! so that the stored geometry lands on the same content at any zoom.

use crate::types::PageDimensions;

/// Rectangle expressed as fractions (0..=1) of a page's intrinsic size
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Every component lies in `[0, 1]` and the rect does not overhang the page
    #[must_use]
    pub fn is_within_page(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x)
            && unit.contains(&self.y)
            && unit.contains(&self.width)
            && unit.contains(&self.height)
            && self.x + self.width <= 1.0 + f64::EPSILON
            && self.y + self.height <= 1.0 + f64::EPSILON
    }

    /// Intersect with the unit square
    #[must_use]
    pub fn clamped(&self) -> Self {
        let x0 = self.x.clamp(0.0, 1.0);
        let y0 = self.y.clamp(0.0, 1.0);
        let x1 = (self.x + self.width).clamp(0.0, 1.0);
        let y1 = (self.y + self.height).clamp(0.0, 1.0);
        Self::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }
}

/// Rectangle in page-local pixels at some zoom level
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Axis-aligned rect spanned by two corners, in either order
    #[must_use]
    pub fn from_corners(a: PixelPoint, b: PixelPoint) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (b.x - a.x).abs(),
            (b.y - a.y).abs(),
        )
    }

    /// Same rect shifted by `dy` (page-local to document space)
    #[must_use]
    pub fn offset_y(self, dy: f64) -> Self {
        Self { y: self.y + dy, ..self }
    }
}

/// Point in page-local pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Normalized point (fractions of the page)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

/// Page size plus zoom: everything needed to map on one page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageMapping {
    pub dims: PageDimensions,
    pub zoom: f64,
}

impl PageMapping {
    #[must_use]
    pub const fn new(dims: PageDimensions, zoom: f64) -> Self {
        Self { dims, zoom }
    }

    #[must_use]
    pub fn to_pixels(&self, rect: &NormalizedRect) -> PixelRect {
        to_pixels(rect, &self.dims, self.zoom)
    }

    #[must_use]
    pub fn to_normalized(&self, rect: &PixelRect) -> NormalizedRect {
        to_normalized(rect, &self.dims, self.zoom)
    }

    #[must_use]
    pub fn point_to_normalized(&self, point: PixelPoint) -> NormalizedPoint {
        point_to_normalized(point, &self.dims, self.zoom)
    }
}

/// Normalized rect to page-local pixels at `zoom`
#[must_use]
pub fn to_pixels(rect: &NormalizedRect, dims: &PageDimensions, zoom: f64) -> PixelRect {
    let sx = dims.width * zoom;
    let sy = dims.height * zoom;
    PixelRect::new(rect.x * sx, rect.y * sy, rect.width * sx, rect.height * sy)
}

/// Exact inverse of [`to_pixels`].
///
/// A degenerate scale (zero zoom or empty page) has no inverse; the empty
/// rect is returned instead of NaNs.
#[must_use]
pub fn to_normalized(rect: &PixelRect, dims: &PageDimensions, zoom: f64) -> NormalizedRect {
    let sx = dims.width * zoom;
    let sy = dims.height * zoom;
    if !(sx > 0.0 && sy > 0.0) || !sx.is_finite() || !sy.is_finite() {
        return NormalizedRect::default();
    }
    NormalizedRect::new(rect.x / sx, rect.y / sy, rect.width / sx, rect.height / sy)
}

#[must_use]
pub fn point_to_normalized(point: PixelPoint, dims: &PageDimensions, zoom: f64) -> NormalizedPoint {
    let rect = to_normalized(&PixelRect::new(point.x, point.y, 0.0, 0.0), dims, zoom);
    NormalizedPoint {
        x: rect.x,
        y: rect.y,
    }
}

/// Normalized rect spanned by two normalized corners
#[must_use]
pub fn rect_between(a: NormalizedPoint, b: NormalizedPoint) -> NormalizedRect {
    NormalizedRect::new(
        a.x.min(b.x),
        a.y.min(b.y),
        (b.x - a.x).abs(),
        (b.y - a.y).abs(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    fn assert_rect_close(a: &NormalizedRect, b: &NormalizedRect) {
        assert!((a.x - b.x).abs() < TOLERANCE, "{a:?} vs {b:?}");
        assert!((a.y - b.y).abs() < TOLERANCE, "{a:?} vs {b:?}");
        assert!((a.width - b.width).abs() < TOLERANCE, "{a:?} vs {b:?}");
        assert!((a.height - b.height).abs() < TOLERANCE, "{a:?} vs {b:?}");
    }

    #[test]
    fn to_pixels_scales_by_page_and_zoom() {
        let dims = PageDimensions::new(1, 600.0, 800.0);
        let rect = NormalizedRect::new(0.5, 0.25, 0.1, 0.2);

        let px = to_pixels(&rect, &dims, 2.0);

        assert_eq!(px, PixelRect::new(600.0, 400.0, 120.0, 320.0));
    }

    #[test]
    fn zero_zoom_maps_to_empty_rect() {
        let dims = PageDimensions::new(1, 600.0, 800.0);
        let rect = to_normalized(&PixelRect::new(10.0, 10.0, 5.0, 5.0), &dims, 0.0);
        assert_eq!(rect, NormalizedRect::default());
    }

    #[test]
    fn same_rect_lands_on_same_content_at_any_zoom() {
        let dims = PageDimensions::new(1, 500.0, 700.0);
        let rect = NormalizedRect::new(0.2, 0.4, 0.3, 0.1);

        let at_one = to_pixels(&rect, &dims, 1.0);
        let at_three = to_pixels(&rect, &dims, 3.0);

        assert!((at_three.x - at_one.x * 3.0).abs() < TOLERANCE);
        assert!((at_three.height - at_one.height * 3.0).abs() < TOLERANCE);
    }

    #[test]
    fn corners_in_any_order() {
        let a = PixelPoint::new(50.0, 80.0);
        let b = PixelPoint::new(10.0, 100.0);
        assert_eq!(
            PixelRect::from_corners(a, b),
            PixelRect::new(10.0, 80.0, 40.0, 20.0)
        );
    }

    #[test]
    fn clamp_trims_overhang() {
        let rect = NormalizedRect::new(0.9, -0.1, 0.3, 0.5).clamped();
        assert_rect_close(&rect, &NormalizedRect::new(0.9, 0.0, 0.1, 0.4));
        assert!(rect.is_within_page());
    }
}
