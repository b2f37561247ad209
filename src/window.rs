//! Visible window computation
//!
//! Decides which pages get a real render and which stay placeholders.
//! The policy itself is the pure [`compute_window`]; [`WindowTracker`]
//! feeds it scroll events through a trailing debounce and only commits
//! windows that differ materially from the current one.

use std::time::{Duration, Instant};

use log::debug;

/// Window sizing and commit thresholds
#[derive(Clone, Debug, PartialEq)]
pub struct WindowPolicy {
    /// Above this zoom the small radius applies
    pub zoom_threshold: f64,
    /// Pages on each side of the focus at low zoom
    pub large_radius: usize,
    /// Pages on each side of the focus at high zoom
    pub small_radius: usize,
    /// Window size change (in pages) that always forces a commit
    pub min_size_delta: usize,
    /// Commit when intersection / union drops below this
    pub min_overlap_ratio: f64,
    /// Quiet period before a scroll-derived window is committed
    pub debounce: Duration,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            zoom_threshold: 1.5,
            large_radius: 5,
            small_radius: 2,
            min_size_delta: 3,
            min_overlap_ratio: 0.8,
            debounce: Duration::from_millis(100),
        }
    }
}

impl WindowPolicy {
    /// Lookahead radius for `zoom`
    #[must_use]
    pub fn radius_for_zoom(&self, zoom: f64) -> usize {
        if zoom > self.zoom_threshold {
            self.small_radius
        } else {
            self.large_radius
        }
    }

    /// Upper bound on any window this policy produces
    #[must_use]
    pub fn max_window_len(&self) -> usize {
        2 * self.large_radius.max(self.small_radius) + 1
    }
}

/// Inclusive range of page numbers that are materialized
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub start: usize,
    pub end: usize,
}

impl PageWindow {
    /// The empty window (no document, or nothing committed yet)
    pub const EMPTY: Self = Self { start: 1, end: 0 };

    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    #[must_use]
    pub fn contains(&self, page: usize) -> bool {
        !self.is_empty() && (self.start..=self.end).contains(&page)
    }

    /// `page` lies in the window or at most `margin` pages outside it
    #[must_use]
    pub fn contains_with_margin(&self, page: usize, margin: usize) -> bool {
        !self.is_empty()
            && page + margin >= self.start
            && page <= self.end.saturating_add(margin)
    }

    pub fn pages(&self) -> impl Iterator<Item = usize> + use<> {
        self.start..=self.end
    }

    /// Pages ordered by distance from `focus`, nearest first
    #[must_use]
    pub fn pages_by_distance(&self, focus: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = self.pages().collect();
        pages.sort_by_key(|&p| (p.abs_diff(focus), p));
        pages
    }

    #[must_use]
    pub fn overlap(&self, other: &Self) -> usize {
        if self.is_empty() || other.is_empty() {
            return 0;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end < start { 0 } else { end - start + 1 }
    }

    /// Intersection over union; 1.0 for identical windows
    #[must_use]
    pub fn overlap_ratio(&self, other: &Self) -> f64 {
        let inter = self.overlap(other);
        let union = self.len() + other.len() - inter;
        if union == 0 {
            1.0
        } else {
            inter as f64 / union as f64
        }
    }
}

impl std::fmt::Display for PageWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "{{}}")
        } else {
            write!(f, "{{{}..{}}}", self.start, self.end)
        }
    }
}

/// `{max(1, focus - W) ..= min(page_count, focus + W)}` with `W` chosen by zoom
#[must_use]
pub fn compute_window(
    focus: usize,
    zoom: f64,
    page_count: usize,
    policy: &WindowPolicy,
) -> PageWindow {
    if page_count == 0 {
        return PageWindow::EMPTY;
    }
    let focus = focus.clamp(1, page_count);
    let radius = policy.radius_for_zoom(zoom);
    PageWindow::new(
        focus.saturating_sub(radius).max(1),
        focus.saturating_add(radius).min(page_count),
    )
}

/// Whether `candidate` is different enough from `current` to be committed
#[must_use]
pub fn differs_materially(
    current: &PageWindow,
    candidate: &PageWindow,
    focus: usize,
    policy: &WindowPolicy,
) -> bool {
    if current == candidate {
        return false;
    }
    if current.is_empty() || !current.contains(focus) {
        return true;
    }
    current.len().abs_diff(candidate.len()) >= policy.min_size_delta
        || current.overlap_ratio(candidate) < policy.min_overlap_ratio
}

#[derive(Clone, Copy, Debug)]
struct PendingObservation {
    focus: usize,
    zoom: f64,
    at: Instant,
}

/// Debounced adapter between scroll events and [`compute_window`]
#[derive(Debug)]
pub struct WindowTracker {
    policy: WindowPolicy,
    page_count: usize,
    committed: PageWindow,
    pending: Option<PendingObservation>,
}

impl WindowTracker {
    #[must_use]
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            page_count: 0,
            committed: PageWindow::EMPTY,
            pending: None,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    #[must_use]
    pub fn committed(&self) -> PageWindow {
        self.committed
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start over for a document with `page_count` pages
    pub fn reset(&mut self, page_count: usize) {
        self.page_count = page_count;
        self.committed = PageWindow::EMPTY;
        self.pending = None;
    }

    /// Record a scroll/intersection sample.
    ///
    /// An undeterminable focus (mid-fling, nothing visible) is dropped so
    /// the current window survives.
    pub fn observe(&mut self, focus: Option<usize>, zoom: f64, now: Instant) {
        let Some(focus) = focus else {
            return;
        };
        self.pending = Some(PendingObservation {
            focus,
            zoom,
            at: now,
        });
    }

    /// Commit the latest sample once the debounce interval has passed.
    ///
    /// Returns the new window when it replaced the committed one.
    pub fn flush(&mut self, now: Instant) -> Option<PageWindow> {
        let pending = self.pending?;
        if now.saturating_duration_since(pending.at) < self.policy.debounce {
            return None;
        }
        self.pending = None;

        let candidate = compute_window(pending.focus, pending.zoom, self.page_count, &self.policy);
        if !differs_materially(&self.committed, &candidate, pending.focus, &self.policy) {
            return None;
        }
        debug!(
            "Window {} -> {} (focus {}, zoom {:.2})",
            self.committed, candidate, pending.focus, pending.zoom
        );
        self.committed = candidate;
        Some(candidate)
    }

    /// Commit immediately, bypassing debounce and similarity checks.
    ///
    /// Used for explicit navigation where the user expects the target to
    /// render right away.
    pub fn force(&mut self, focus: usize, zoom: f64) -> Option<PageWindow> {
        self.pending = None;
        let candidate = compute_window(focus, zoom, self.page_count, &self.policy);
        if candidate == self.committed {
            return None;
        }
        debug!(
            "Window {} -> {} (forced, focus {focus})",
            self.committed, candidate
        );
        self.committed = candidate;
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(page_count: usize) -> WindowTracker {
        let mut t = WindowTracker::new(WindowPolicy::default());
        t.reset(page_count);
        t
    }

    #[test]
    fn window_around_focus_at_low_zoom() {
        let w = compute_window(50, 1.0, 100, &WindowPolicy::default());
        assert_eq!(w, PageWindow::new(45, 55));
        assert_eq!(w.len(), 11);
    }

    #[test]
    fn window_shrinks_at_high_zoom() {
        let w = compute_window(50, 2.0, 100, &WindowPolicy::default());
        assert_eq!(w, PageWindow::new(48, 52));
    }

    #[test]
    fn window_clamped_to_document() {
        let policy = WindowPolicy::default();
        assert_eq!(compute_window(1, 1.0, 100, &policy), PageWindow::new(1, 6));
        assert_eq!(compute_window(99, 1.0, 100, &policy), PageWindow::new(94, 100));
        assert_eq!(compute_window(2, 1.0, 3, &policy), PageWindow::new(1, 3));
        assert!(compute_window(1, 1.0, 0, &policy).is_empty());
    }

    #[test]
    fn margin_membership() {
        let w = PageWindow::new(10, 20);
        assert!(w.contains_with_margin(8, 2));
        assert!(!w.contains_with_margin(7, 2));
        assert!(w.contains_with_margin(22, 2));
        assert!(!w.contains_with_margin(23, 2));
    }

    #[test]
    fn pages_by_distance_starts_at_focus() {
        let w = PageWindow::new(3, 7);
        assert_eq!(w.pages_by_distance(5), vec![5, 4, 6, 3, 7]);
    }

    #[test]
    fn debounce_holds_until_quiet() {
        let mut t = tracker(100);
        let t0 = Instant::now();

        t.observe(Some(50), 1.0, t0);
        assert_eq!(t.flush(t0 + Duration::from_millis(50)), None);

        let w = t.flush(t0 + Duration::from_millis(100));
        assert_eq!(w, Some(PageWindow::new(45, 55)));
        assert_eq!(t.committed(), PageWindow::new(45, 55));
    }

    #[test]
    fn later_samples_restart_debounce() {
        let mut t = tracker(100);
        let t0 = Instant::now();

        t.observe(Some(20), 1.0, t0);
        t.observe(Some(30), 1.0, t0 + Duration::from_millis(80));
        assert_eq!(t.flush(t0 + Duration::from_millis(120)), None);
        assert_eq!(
            t.flush(t0 + Duration::from_millis(180)),
            Some(PageWindow::new(25, 35))
        );
    }

    #[test]
    fn one_page_jitter_does_not_commit() {
        let mut t = tracker(100);
        let t0 = Instant::now();
        t.force(50, 1.0);

        t.observe(Some(51), 1.0, t0);
        assert_eq!(t.flush(t0 + Duration::from_secs(1)), None);
        assert_eq!(t.committed(), PageWindow::new(45, 55));

        t.observe(Some(52), 1.0, t0);
        assert_eq!(
            t.flush(t0 + Duration::from_secs(1)),
            Some(PageWindow::new(47, 57))
        );
    }

    #[test]
    fn unknown_focus_keeps_previous_window() {
        let mut t = tracker(100);
        let t0 = Instant::now();
        t.force(10, 1.0);

        t.observe(None, 1.0, t0);
        assert_eq!(t.flush(t0 + Duration::from_secs(1)), None);
        assert_eq!(t.committed(), PageWindow::new(5, 15));
    }

    #[test]
    fn zoom_crossing_threshold_commits_smaller_window() {
        let mut t = tracker(100);
        let t0 = Instant::now();
        t.force(50, 1.0);

        t.observe(Some(50), 3.0, t0);
        assert_eq!(
            t.flush(t0 + Duration::from_secs(1)),
            Some(PageWindow::new(48, 52))
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// One scroll sample: focus page, zoom, milliseconds until the next flush
    fn scroll_event() -> impl Strategy<Value = (usize, f64, u64)> {
        (1usize..=10_000, 0.1f64..8.0, 0u64..300)
    }

    proptest! {
        #[test]
        fn window_size_bounded_for_any_scroll_sequence(
            events in proptest::collection::vec(scroll_event(), 1..200),
            page_count in 1usize..10_000,
        ) {
            let policy = WindowPolicy::default();
            let bound = policy.max_window_len();
            let mut t = WindowTracker::new(policy);
            t.reset(page_count);
            let mut now = Instant::now();

            for (focus, zoom, dt) in events {
                t.observe(Some(focus), zoom, now);
                now += Duration::from_millis(dt);
                t.flush(now);
                let window = t.committed();
                prop_assert!(window.len() <= bound);
                prop_assert!(window.is_empty() || window.end <= page_count);
            }
        }

        #[test]
        fn forced_window_contains_focus(
            focus in 1usize..=500,
            zoom in 0.1f64..8.0,
            page_count in 1usize..=500,
        ) {
            let mut t = WindowTracker::new(WindowPolicy::default());
            t.reset(page_count);

            t.force(focus, zoom);

            prop_assert!(t.committed().contains(focus.min(page_count)));
        }
    }
}
