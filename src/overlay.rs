//! Annotation overlay placement
//!
//! Annotations come from outside (read-only) in normalized coordinates.
//! This module places them in document-space pixels for the pages inside
//! the visible window, and as fractions of the scroll range for scrollbar
//! markers.

use log::debug;

use crate::coords::{NormalizedRect, PixelRect};
use crate::layout::DocumentLayout;
use crate::window::PageWindow;

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: String,
    pub page: usize,
    pub rects: Vec<NormalizedRect>,
}

impl Annotation {
    #[must_use]
    pub fn new(id: impl Into<String>, page: usize, rect: NormalizedRect) -> Self {
        Self::with_rects(id, page, vec![rect])
    }

    #[must_use]
    pub fn with_rects(id: impl Into<String>, page: usize, rects: Vec<NormalizedRect>) -> Self {
        Self {
            id: id.into(),
            page,
            rects,
        }
    }

    /// Topmost normalized y of any rect
    #[must_use]
    pub fn top(&self) -> f64 {
        self.rects.iter().map(|r| r.y).fold(f64::INFINITY, f64::min).clamp(0.0, 1.0)
    }
}

/// One annotation placed in document space
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayItem {
    pub id: String,
    pub page: usize,
    /// Page-local pixels
    pub local: Vec<PixelRect>,
    /// Offset by the page top, ready to draw in the scroll container
    pub document: Vec<PixelRect>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrollbarMarker {
    pub id: String,
    pub page: usize,
    /// Fraction of the total document height, `0.0..=1.0`
    pub position: f64,
}

/// Place annotations on pages inside `window`
#[must_use]
pub fn place_annotations(
    annotations: &[Annotation],
    layout: &DocumentLayout<'_>,
    window: &PageWindow,
) -> Vec<OverlayItem> {
    annotations
        .iter()
        .filter(|a| window.contains(a.page) && a.page <= layout.page_count())
        .map(|a| {
            let dims = layout.dimensions(a.page);
            let top = layout.page_top(a.page);
            let local: Vec<_> = a
                .rects
                .iter()
                .map(|r| crate::coords::to_pixels(r, &dims, layout.zoom()))
                .collect();
            let document = local.iter().map(|r| r.offset_y(top)).collect();
            OverlayItem {
                id: a.id.clone(),
                page: a.page,
                local,
                document,
            }
        })
        .collect()
}

/// Scrollbar markers for every annotation, sorted by position
#[must_use]
pub fn scrollbar_markers(annotations: &[Annotation], layout: &DocumentLayout<'_>) -> Vec<ScrollbarMarker> {
    let total = layout.total_height();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut markers: Vec<_> = annotations
        .iter()
        .filter(|a| {
            let known = (1..=layout.page_count()).contains(&a.page);
            if !known {
                debug!("Annotation {} points at missing page {}", a.id, a.page);
            }
            known
        })
        .map(|a| {
            let y = layout.page_top(a.page) + a.top() * layout.page_height(a.page);
            ScrollbarMarker {
                id: a.id.clone(),
                page: a.page,
                position: (y / total).clamp(0.0, 1.0),
            }
        })
        .collect();
    markers.sort_by(|a, b| a.position.total_cmp(&b.position));
    markers
}
