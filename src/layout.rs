//! Continuous-scroll page layout
//!
//! Pages are stacked vertically with a fixed gap. Heights come from the
//! measured [`PageDimensions`]; pages that were never measured borrow the
//! first page's size so placeholders do not jump around while the
//! document is scanned.

use std::collections::BTreeMap;

use crate::types::{DEFAULT_PAGE_SIZE, PageDimensions};

/// Above this zoom, near-equal intersections are resolved by centre distance
pub const CENTER_TIE_BREAK_ZOOM: f64 = 1.5;

/// Areas within this fraction of the best one count as a tie
const INTERSECTION_TIE_RATIO: f64 = 0.9;

/// Outcome of recording a measured page size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionUpdate {
    Inserted,
    Changed,
    Unchanged,
    Rejected,
}

impl DimensionUpdate {
    /// Whether layout has to be recomputed
    #[must_use]
    pub fn moved_layout(self) -> bool {
        matches!(self, Self::Inserted | Self::Changed)
    }
}

/// Measured intrinsic page sizes, kept for the lifetime of a session.
///
/// Cheap (a few floats per page) so they survive bitmap eviction.
#[derive(Debug, Default, Clone)]
pub struct DimensionStore {
    first: Option<PageDimensions>,
    measured: BTreeMap<usize, PageDimensions>,
}

impl DimensionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement, ignoring sub-epsilon drift
    pub fn record(&mut self, dims: PageDimensions) -> DimensionUpdate {
        if !dims.is_valid() {
            return DimensionUpdate::Rejected;
        }

        let update = match self.measured.get(&dims.page) {
            None => DimensionUpdate::Inserted,
            Some(existing) if existing.differs_materially(&dims) => DimensionUpdate::Changed,
            Some(_) => return DimensionUpdate::Unchanged,
        };

        self.measured.insert(dims.page, dims);
        if dims.page == 1 {
            self.first = Some(dims);
        }
        update
    }

    /// Measured size of `page`, if any
    #[must_use]
    pub fn measured(&self, page: usize) -> Option<PageDimensions> {
        self.measured.get(&page).copied()
    }

    /// Stable fallback used for every unmeasured page
    #[must_use]
    pub fn fallback(&self, page: usize) -> PageDimensions {
        match self.first {
            Some(first) => first.for_page(page),
            None => PageDimensions::new(page, DEFAULT_PAGE_SIZE.0, DEFAULT_PAGE_SIZE.1),
        }
    }

    /// Best known size of `page`
    #[must_use]
    pub fn get(&self, page: usize) -> PageDimensions {
        self.measured(page).unwrap_or_else(|| self.fallback(page))
    }

    #[must_use]
    pub fn measured_count(&self) -> usize {
        self.measured.len()
    }

    pub fn clear(&mut self) {
        self.first = None;
        self.measured.clear();
    }
}

/// Visible share of one page in the viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageVisibility {
    pub page: usize,
    /// Visible area in square pixels
    pub visible_area: f64,
    /// Distance between the page centre and the viewport centre
    pub center_distance: f64,
}

/// Page geometry at one zoom level.
///
/// Borrowed view over a [`DimensionStore`]; cheap to build per event.
#[derive(Clone, Copy, Debug)]
pub struct DocumentLayout<'a> {
    dims: &'a DimensionStore,
    page_count: usize,
    zoom: f64,
    gap: f64,
}

impl<'a> DocumentLayout<'a> {
    #[must_use]
    pub fn new(dims: &'a DimensionStore, page_count: usize, zoom: f64, gap: f64) -> Self {
        Self {
            dims,
            page_count,
            zoom,
            gap: gap.max(0.0),
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    #[must_use]
    pub fn dimensions(&self, page: usize) -> PageDimensions {
        self.dims.get(page)
    }

    #[must_use]
    pub fn page_height(&self, page: usize) -> f64 {
        self.dims.get(page).height * self.zoom
    }

    #[must_use]
    pub fn page_width(&self, page: usize) -> f64 {
        self.dims.get(page).width * self.zoom
    }

    fn fallback_stride(&self) -> f64 {
        self.dims.fallback(1).height * self.zoom + self.gap
    }

    /// Document-space y of the top edge of `page`.
    ///
    /// Unmeasured pages all share the fallback height, so only measured
    /// pages before `page` need to be visited.
    #[must_use]
    pub fn page_top(&self, page: usize) -> f64 {
        if page <= 1 {
            return 0.0;
        }
        let fallback_h = self.dims.fallback(1).height;
        let preceding = (page - 1) as f64;
        let correction: f64 = self
            .dims
            .measured
            .range(1..page)
            .map(|(_, d)| (d.height - fallback_h) * self.zoom)
            .sum();
        preceding * self.fallback_stride() + correction
    }

    /// Height of the whole scrollable document
    #[must_use]
    pub fn total_height(&self) -> f64 {
        if self.page_count == 0 {
            return 0.0;
        }
        self.page_top(self.page_count) + self.page_height(self.page_count)
    }

    /// Page whose slot (page plus trailing gap) contains document-space `y`
    #[must_use]
    pub fn page_at_offset(&self, y: f64) -> Option<usize> {
        if self.page_count == 0 {
            return None;
        }
        if y <= 0.0 {
            return Some(1);
        }

        // Binary search over page tops; page_top is monotonic.
        let (mut lo, mut hi) = (1usize, self.page_count);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.page_top(mid) <= y {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Some(lo)
    }

    /// Pages intersecting the viewport `[scroll_top, scroll_top + height)`
    #[must_use]
    pub fn visible_pages(&self, scroll_top: f64, viewport_height: f64) -> Vec<PageVisibility> {
        let mut out = Vec::new();
        if viewport_height <= 0.0 {
            return out;
        }
        let Some(first) = self.page_at_offset(scroll_top) else {
            return out;
        };

        let view_bottom = scroll_top + viewport_height;
        let view_center = scroll_top + viewport_height / 2.0;

        for page in first..=self.page_count {
            let top = self.page_top(page);
            if top >= view_bottom {
                break;
            }
            let height = self.page_height(page);
            let bottom = top + height;
            let visible_h = bottom.min(view_bottom) - top.max(scroll_top);
            if visible_h <= 0.0 {
                continue;
            }
            out.push(PageVisibility {
                page,
                visible_area: visible_h * self.page_width(page),
                center_distance: ((top + height / 2.0) - view_center).abs(),
            });
        }
        out
    }

    /// The page with the greatest visible area.
    ///
    /// At high zoom two pages can share the viewport almost equally while
    /// scrolling; the one closer to the viewport centre wins so the focus
    /// does not flicker between them. `None` when nothing is visible.
    #[must_use]
    pub fn most_visible_page(&self, scroll_top: f64, viewport_height: f64) -> Option<usize> {
        let visible = self.visible_pages(scroll_top, viewport_height);
        let best_area = visible
            .iter()
            .map(|v| v.visible_area)
            .fold(0.0_f64, f64::max);
        if best_area <= 0.0 {
            return None;
        }

        if self.zoom > CENTER_TIE_BREAK_ZOOM {
            visible
                .iter()
                .filter(|v| v.visible_area >= best_area * INTERSECTION_TIE_RATIO)
                .min_by(|a, b| a.center_distance.total_cmp(&b.center_distance))
                .map(|v| v.page)
        } else {
            visible
                .iter()
                .find(|v| v.visible_area >= best_area)
                .map(|v| v.page)
        }
    }

    /// Largest scroll offset that still fills the viewport
    #[must_use]
    pub fn max_scroll(&self, viewport_height: f64) -> f64 {
        (self.total_height() - viewport_height).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_store(w: f64, h: f64) -> DimensionStore {
        let mut store = DimensionStore::new();
        store.record(PageDimensions::new(1, w, h));
        store
    }

    #[test]
    fn unmeasured_pages_use_first_page_size() {
        let store = uniform_store(600.0, 800.0);
        assert_eq!(store.get(42), PageDimensions::new(42, 600.0, 800.0));
    }

    #[test]
    fn empty_store_falls_back_to_letter() {
        let store = DimensionStore::new();
        assert_eq!(store.get(1).width, DEFAULT_PAGE_SIZE.0);
    }

    #[test]
    fn small_remeasure_is_ignored() {
        let mut store = uniform_store(600.0, 800.0);
        assert_eq!(
            store.record(PageDimensions::new(1, 600.05, 800.0)),
            DimensionUpdate::Unchanged
        );
        assert_eq!(store.get(1).width, 600.0);
        assert_eq!(
            store.record(PageDimensions::new(1, 650.0, 800.0)),
            DimensionUpdate::Changed
        );
        assert_eq!(store.get(1).width, 650.0);
    }

    #[test]
    fn invalid_measurement_rejected() {
        let mut store = DimensionStore::new();
        assert_eq!(
            store.record(PageDimensions::new(2, -1.0, 10.0)),
            DimensionUpdate::Rejected
        );
        assert_eq!(store.measured_count(), 0);
    }

    #[test]
    fn page_tops_include_gap_and_zoom() {
        let store = uniform_store(600.0, 800.0);
        let layout = DocumentLayout::new(&store, 10, 1.5, 10.0);

        assert_eq!(layout.page_top(1), 0.0);
        assert_eq!(layout.page_top(2), 1210.0);
        assert_eq!(layout.page_top(4), 3.0 * 1210.0);
        assert_eq!(layout.total_height(), 9.0 * 1210.0 + 1200.0);
    }

    #[test]
    fn measured_page_shifts_following_tops() {
        let mut store = uniform_store(600.0, 800.0);
        store.record(PageDimensions::new(3, 600.0, 400.0));
        let layout = DocumentLayout::new(&store, 10, 1.0, 0.0);

        assert_eq!(layout.page_top(3), 1600.0);
        assert_eq!(layout.page_top(4), 2000.0);
        assert_eq!(layout.page_top(5), 2800.0);
    }

    #[test]
    fn page_at_offset_finds_slot() {
        let store = uniform_store(600.0, 800.0);
        let layout = DocumentLayout::new(&store, 5, 1.0, 20.0);

        assert_eq!(layout.page_at_offset(-5.0), Some(1));
        assert_eq!(layout.page_at_offset(819.0), Some(1));
        assert_eq!(layout.page_at_offset(820.0), Some(2));
        assert_eq!(layout.page_at_offset(100_000.0), Some(5));
    }

    #[test]
    fn most_visible_prefers_larger_intersection() {
        let store = uniform_store(600.0, 800.0);
        let layout = DocumentLayout::new(&store, 10, 1.0, 0.0);

        // 200px of page 1, 600px of page 2
        assert_eq!(layout.most_visible_page(600.0, 800.0), Some(2));
    }

    #[test]
    fn high_zoom_tie_breaks_on_center_distance() {
        // Short page 1 followed by a tall page 2
        let mut store = uniform_store(600.0, 200.0);
        store.record(PageDimensions::new(2, 600.0, 1000.0));

        // Zoom 1: page 2 shows slightly more and wins on area alone
        let layout = DocumentLayout::new(&store, 3, 1.0, 0.0);
        assert_eq!(layout.most_visible_page(10.0, 400.0), Some(2));

        // Zoom 2, same content in view: areas are within 10% of each other
        // and page 1's centre is much closer to the viewport centre
        let layout = DocumentLayout::new(&store, 3, 2.0, 0.0);
        assert_eq!(layout.most_visible_page(20.0, 800.0), Some(1));
    }

    #[test]
    fn nothing_visible_yields_none() {
        let store = uniform_store(600.0, 800.0);
        let layout = DocumentLayout::new(&store, 0, 1.0, 0.0);
        assert_eq!(layout.most_visible_page(0.0, 800.0), None);

        let layout = DocumentLayout::new(&store, 3, 1.0, 0.0);
        assert_eq!(layout.most_visible_page(0.0, 0.0), None);
    }
}
