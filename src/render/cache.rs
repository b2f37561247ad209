//! Per-viewer page render cache
//!
//! Tracks one slot per page of interest: the bitmap (if any) and where the
//! page is in its render lifecycle. Every submitted job carries a fresh
//! [`RenderTicket`]; completions whose ticket no longer matches the slot are
//! discarded, which is what makes out-of-order and post-eviction completions
//! harmless.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::request::{RenderBackend, RenderCompletion, RenderJob, RenderTicket};
use crate::error::RenderFault;
use crate::layout::{DimensionStore, DimensionUpdate};
use crate::types::{Bitmap, DocumentId, PageDimensions};
use crate::window::PageWindow;

/// Retry, timeout and eviction knobs
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPolicy {
    /// Total attempts per page, including the first
    pub max_attempts: u32,
    /// Retry `n` waits `backoff_base * n`
    pub backoff_base: Duration,
    pub timeout: Duration,
    /// Pages this close to the window keep their bitmaps
    pub eviction_margin: usize,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            timeout: Duration::from_secs(10),
            eviction_margin: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SlotState {
    Idle,
    Pending {
        ticket: RenderTicket,
        attempt: u32,
        started: Instant,
    },
    RetryScheduled {
        attempt: u32,
        due: Instant,
    },
    Failed {
        attempts: u32,
        fault: RenderFault,
    },
}

#[derive(Debug)]
struct PageSlot {
    bitmap: Option<Arc<Bitmap>>,
    state: SlotState,
}

impl PageSlot {
    const fn empty() -> Self {
        Self {
            bitmap: None,
            state: SlotState::Idle,
        }
    }

    fn pending_ticket(&self) -> Option<RenderTicket> {
        match self.state {
            SlotState::Pending { ticket, .. } => Some(ticket),
            _ => None,
        }
    }
}

/// A page with pixels
#[derive(Clone, Debug)]
pub struct RenderedPage {
    pub page: usize,
    pub bitmap: Arc<Bitmap>,
    pub dims: PageDimensions,
}

/// Why a page has no pixels yet
#[derive(Clone, Debug, PartialEq)]
pub enum PlaceholderStatus {
    /// Not requested, usually because it is outside the window
    Idle,
    Loading,
    Failed { attempts: u32, fault: RenderFault },
}

/// What the host should draw for one page
#[derive(Clone, Debug)]
pub enum PageView {
    Rendered(RenderedPage),
    Placeholder {
        page: usize,
        dims: PageDimensions,
        status: PlaceholderStatus,
    },
}

impl PageView {
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    #[must_use]
    pub fn dims(&self) -> PageDimensions {
        match self {
            Self::Rendered(rendered) => rendered.dims,
            Self::Placeholder { dims, .. } => *dims,
        }
    }
}

/// Notable state transitions, reported back to the viewer
#[derive(Clone, Debug, PartialEq)]
pub enum CacheEvent {
    Rendered { page: usize, layout_moved: bool },
    RetryScheduled { page: usize, attempt: u32 },
    Failed { page: usize, fault: RenderFault },
    Discarded { ticket: RenderTicket },
}

/// What a reconcile pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub evicted: Vec<usize>,
    pub scheduled: Vec<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub rendered: usize,
    pub pending: usize,
    pub retrying: usize,
    pub failed: usize,
    pub measured: usize,
    pub retained_bytes: usize,
}

/// Bitmaps and render bookkeeping for the pages around the viewport
#[derive(Debug)]
pub struct PageRenderCache {
    policy: RenderPolicy,
    document: Option<DocumentId>,
    zoom: f64,
    slots: HashMap<usize, PageSlot>,
    dims: DimensionStore,
    next_generation: u64,
}

impl PageRenderCache {
    #[must_use]
    pub fn new(policy: RenderPolicy) -> Self {
        Self {
            policy,
            document: None,
            zoom: 1.0,
            slots: HashMap::new(),
            dims: DimensionStore::new(),
            next_generation: 1,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RenderPolicy {
        &self.policy
    }

    /// Bind to a freshly opened document. Previous state must be cleared.
    pub fn attach(&mut self, document: DocumentId, zoom: f64) {
        self.document = Some(document);
        self.zoom = zoom;
    }

    #[must_use]
    pub fn document(&self) -> Option<DocumentId> {
        self.document
    }

    #[must_use]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    #[must_use]
    pub fn dimensions(&self) -> &DimensionStore {
        &self.dims
    }

    pub fn record_dimensions(&mut self, dims: PageDimensions) -> DimensionUpdate {
        self.dims.record(dims)
    }

    /// Schedule a render for `page` unless it has a bitmap or is already
    /// being worked on. Returns whether a job was submitted.
    pub fn ensure_rendered(
        &mut self,
        page: usize,
        now: Instant,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        let slot = self.slots.entry(page).or_insert_with(PageSlot::empty);
        if slot.bitmap.is_some() || slot.state != SlotState::Idle {
            return false;
        }
        self.submit(page, 1, now, backend)
    }

    /// Render `page` again, superseding any job in flight
    pub fn request_render(&mut self, page: usize, now: Instant, backend: &mut dyn RenderBackend) {
        if let Some(ticket) = self.slots.get(&page).and_then(PageSlot::pending_ticket) {
            backend.cancel(ticket);
        }
        self.submit(page, 1, now, backend);
    }

    fn submit(
        &mut self,
        page: usize,
        attempt: u32,
        now: Instant,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        let Some(document) = self.document else {
            warn!("Render of page {page} requested with no document attached");
            return false;
        };

        let ticket = RenderTicket::new(page, self.next_generation);
        self.next_generation += 1;

        backend.submit(RenderJob {
            ticket,
            document,
            scale: self.zoom,
        });
        self.slots.entry(page).or_insert_with(PageSlot::empty).state = SlotState::Pending {
            ticket,
            attempt,
            started: now,
        };
        true
    }

    /// Evict pages outside the window (plus margin), then schedule the
    /// window's missing pages nearest-first.
    pub fn reconcile(
        &mut self,
        window: &PageWindow,
        focus: usize,
        now: Instant,
        backend: &mut dyn RenderBackend,
    ) -> ReconcileReport {
        let evicted = self.evict_outside(window, backend);
        let scheduled = window
            .pages_by_distance(focus)
            .into_iter()
            .filter(|&page| self.ensure_rendered(page, now, backend))
            .collect();
        ReconcileReport { evicted, scheduled }
    }

    /// Drop every page farther than the eviction margin from `window`.
    ///
    /// Measured dimensions are kept. Returns the evicted pages in order.
    pub fn evict_outside(
        &mut self,
        window: &PageWindow,
        backend: &mut dyn RenderBackend,
    ) -> Vec<usize> {
        let margin = self.policy.eviction_margin;
        let mut evicted: Vec<usize> = self
            .slots
            .keys()
            .copied()
            .filter(|&page| !window.contains_with_margin(page, margin))
            .collect();
        evicted.sort_unstable();

        for page in &evicted {
            if let Some(ticket) = self.slots.remove(page).and_then(|s| s.pending_ticket()) {
                backend.cancel(ticket);
            }
        }
        if !evicted.is_empty() {
            debug!("Evicted {} pages outside {window}", evicted.len());
        }
        evicted
    }

    /// Switch to a new zoom: every bitmap is stale, dimensions are not.
    ///
    /// Returns false when the zoom did not actually change.
    pub fn invalidate_for_zoom(&mut self, zoom: f64, backend: &mut dyn RenderBackend) -> bool {
        if (self.zoom - zoom).abs() <= f64::EPSILON {
            return false;
        }
        self.zoom = zoom;
        self.cancel_all(backend);
        self.slots.clear();
        true
    }

    fn cancel_all(&mut self, backend: &mut dyn RenderBackend) {
        for ticket in self.slots.values().filter_map(PageSlot::pending_ticket) {
            backend.cancel(ticket);
        }
    }

    /// Fold one completion into the cache
    pub fn apply_completion(
        &mut self,
        completion: RenderCompletion,
        now: Instant,
    ) -> Option<CacheEvent> {
        let ticket = completion.ticket;
        let page = ticket.page;

        let attempt = match self.slots.get(&page).map(|slot| &slot.state) {
            Some(SlotState::Pending {
                ticket: current,
                attempt,
                ..
            }) if *current == ticket => *attempt,
            _ => {
                debug!(
                    "Discarding stale render of page {page} (generation {})",
                    ticket.generation
                );
                return Some(CacheEvent::Discarded { ticket });
            }
        };

        match completion.result {
            Ok(output) => {
                let measured = output.intrinsic.for_page(page);
                let assumed = self.dims.get(page);
                let update = self.dims.record(measured);
                if let Some(slot) = self.slots.get_mut(&page) {
                    slot.bitmap = Some(output.bitmap);
                    slot.state = SlotState::Idle;
                }
                // A first measurement that matches the placeholder moves nothing
                let layout_moved = update.moved_layout() && assumed.differs_materially(&measured);
                Some(CacheEvent::Rendered { page, layout_moved })
            }
            Err(fault) => self.handle_failure(page, attempt, fault, now),
        }
    }

    fn handle_failure(
        &mut self,
        page: usize,
        attempt: u32,
        fault: RenderFault,
        now: Instant,
    ) -> Option<CacheEvent> {
        let slot = self.slots.get_mut(&page)?;

        if !fault.is_retryable() {
            slot.state = SlotState::Idle;
            return None;
        }

        if attempt < self.policy.max_attempts {
            let due = now + self.policy.backoff_base * attempt;
            debug!("Page {page} attempt {attempt} failed ({fault}), retrying");
            slot.state = SlotState::RetryScheduled {
                attempt: attempt + 1,
                due,
            };
            Some(CacheEvent::RetryScheduled {
                page,
                attempt: attempt + 1,
            })
        } else {
            warn!("Page {page} failed after {attempt} attempts: {fault}");
            slot.state = SlotState::Failed {
                attempts: attempt,
                fault: fault.clone(),
            };
            Some(CacheEvent::Failed { page, fault })
        }
    }

    /// Expire overdue jobs and fire due retries
    pub fn tick(&mut self, now: Instant, backend: &mut dyn RenderBackend) -> Vec<CacheEvent> {
        let mut expired = Vec::new();
        let mut due = Vec::new();
        for (&page, slot) in &self.slots {
            match slot.state {
                SlotState::Pending {
                    ticket,
                    attempt,
                    started,
                } if now.saturating_duration_since(started) >= self.policy.timeout => {
                    expired.push((page, ticket, attempt));
                }
                SlotState::RetryScheduled { attempt, due: at } if now >= at => {
                    due.push((page, attempt));
                }
                _ => {}
            }
        }
        expired.sort_unstable_by_key(|(page, ..)| *page);
        due.sort_unstable_by_key(|(page, _)| *page);

        let mut events = Vec::new();
        for (page, ticket, attempt) in expired {
            backend.cancel(ticket);
            events.extend(self.handle_failure(page, attempt, RenderFault::Timeout, now));
        }
        for (page, attempt) in due {
            self.submit(page, attempt, now, backend);
        }
        events
    }

    /// Forget everything, including dimensions and the document
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        self.cancel_all(backend);
        self.reset();
    }

    /// [`clear`](Self::clear) without a backend to notify
    pub fn reset(&mut self) {
        self.slots.clear();
        self.dims.clear();
        self.document = None;
        self.zoom = 1.0;
    }

    #[must_use]
    pub fn view(&self, page: usize) -> PageView {
        let dims = self.dims.get(page);
        let Some(slot) = self.slots.get(&page) else {
            return PageView::Placeholder {
                page,
                dims,
                status: PlaceholderStatus::Idle,
            };
        };
        if let Some(bitmap) = &slot.bitmap {
            return PageView::Rendered(RenderedPage {
                page,
                bitmap: Arc::clone(bitmap),
                dims,
            });
        }
        let status = match &slot.state {
            SlotState::Idle => PlaceholderStatus::Idle,
            SlotState::Pending { .. } | SlotState::RetryScheduled { .. } => {
                PlaceholderStatus::Loading
            }
            SlotState::Failed { attempts, fault } => PlaceholderStatus::Failed {
                attempts: *attempts,
                fault: fault.clone(),
            },
        };
        PageView::Placeholder { page, dims, status }
    }

    #[must_use]
    pub fn has_bitmap(&self, page: usize) -> bool {
        self.slots.get(&page).is_some_and(|s| s.bitmap.is_some())
    }

    #[must_use]
    pub fn is_pending(&self, page: usize) -> bool {
        self.slots
            .get(&page)
            .is_some_and(|s| matches!(s.state, SlotState::Pending { .. }))
    }

    /// Pages that currently hold a bitmap, ascending
    #[must_use]
    pub fn rendered_pages(&self) -> Vec<usize> {
        let mut pages: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, s)| s.bitmap.is_some())
            .map(|(&p, _)| p)
            .collect();
        pages.sort_unstable();
        pages
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            measured: self.dims.measured_count(),
            ..CacheStats::default()
        };
        for slot in self.slots.values() {
            if let Some(bitmap) = &slot.bitmap {
                stats.rendered += 1;
                stats.retained_bytes += bitmap.byte_len();
            }
            match slot.state {
                SlotState::Pending { .. } => stats.pending += 1,
                SlotState::RetryScheduled { .. } => stats.retrying += 1,
                SlotState::Failed { .. } => stats.failed += 1,
                SlotState::Idle => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::ScriptedBackend;

    fn cache() -> PageRenderCache {
        let mut cache = PageRenderCache::new(RenderPolicy::default());
        cache.attach(DocumentId(1), 1.0);
        cache
    }

    fn fill(cache: &mut PageRenderCache, backend: &mut ScriptedBackend, window: PageWindow) {
        let now = Instant::now();
        cache.reconcile(&window, window.start, now, backend);
        backend.complete_outstanding(600.0, 800.0);
        for completion in backend.poll() {
            cache.apply_completion(completion, now);
        }
    }

    #[test]
    fn reconcile_schedules_nearest_first() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();

        let report = cache.reconcile(&PageWindow::new(3, 7), 5, Instant::now(), &mut backend);

        assert_eq!(report.scheduled, vec![5, 4, 6, 3, 7]);
        assert_eq!(backend.submitted_pages(), vec![5, 4, 6, 3, 7]);
        assert!(cache.is_pending(5));
    }

    #[test]
    fn ensure_rendered_is_idempotent() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        let now = Instant::now();

        assert!(cache.ensure_rendered(4, now, &mut backend));
        assert!(!cache.ensure_rendered(4, now, &mut backend));
        assert_eq!(backend.submitted().len(), 1);
    }

    #[test]
    fn eviction_clears_everything_outside_margin() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        fill(&mut cache, &mut backend, PageWindow::new(1, 11));
        assert_eq!(cache.rendered_pages(), (1..=11).collect::<Vec<_>>());

        let report = cache.reconcile(&PageWindow::new(50, 60), 55, Instant::now(), &mut backend);

        assert_eq!(report.evicted, (1..=11).collect::<Vec<_>>());
        assert!(cache.rendered_pages().is_empty());
        for page in 50..=60 {
            assert!(cache.is_pending(page));
        }
        // Measurements survive eviction
        assert_eq!(cache.dimensions().measured_count(), 11);
    }

    #[test]
    fn margin_pages_keep_bitmaps() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        fill(&mut cache, &mut backend, PageWindow::new(1, 11));

        let evicted = cache.evict_outside(&PageWindow::new(5, 9), &mut backend);

        assert_eq!(evicted, vec![1, 2]);
        assert_eq!(cache.rendered_pages(), (3..=11).collect::<Vec<_>>());
    }

    #[test]
    fn eviction_cancels_in_flight_jobs() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        cache.reconcile(&PageWindow::new(1, 3), 1, Instant::now(), &mut backend);

        cache.evict_outside(&PageWindow::new(40, 42), &mut backend);

        let cancelled: Vec<_> = backend.cancelled().iter().map(|t| t.page).collect();
        assert_eq!(cancelled.len(), 3);
    }

    #[test]
    fn superseded_completion_is_discarded() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        let now = Instant::now();

        cache.ensure_rendered(5, now, &mut backend);
        let first = backend.latest_ticket(5).unwrap();
        cache.request_render(5, now, &mut backend);
        let second = backend.latest_ticket(5).unwrap();
        assert!(second.generation > first.generation);

        backend.complete(second, 600.0, 800.0);
        backend.complete(first, 600.0, 800.0);
        let events: Vec<_> = backend
            .poll()
            .into_iter()
            .filter_map(|c| cache.apply_completion(c, now))
            .collect();

        assert!(matches!(events[0], CacheEvent::Rendered { page: 5, .. }));
        assert_eq!(events[1], CacheEvent::Discarded { ticket: first });
        assert!(cache.has_bitmap(5));
    }

    #[test]
    fn completion_after_eviction_is_discarded() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        let now = Instant::now();

        cache.ensure_rendered(2, now, &mut backend);
        let ticket = backend.latest_ticket(2).unwrap();
        cache.evict_outside(&PageWindow::new(30, 40), &mut backend);

        backend.complete(ticket, 600.0, 800.0);
        for completion in backend.poll() {
            assert_eq!(
                cache.apply_completion(completion, now),
                Some(CacheEvent::Discarded { ticket })
            );
        }
        assert!(!cache.has_bitmap(2));
    }

    #[test]
    fn failures_retry_with_linear_backoff() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        let start = Instant::now();

        cache.ensure_rendered(1, start, &mut backend);
        backend.fail(backend.latest_ticket(1).unwrap(), RenderFault::backend("boom"));
        let event = cache.apply_completion(backend.poll().remove(0), start);
        assert_eq!(event, Some(CacheEvent::RetryScheduled { page: 1, attempt: 2 }));

        // Not due before 250ms
        cache.tick(start + Duration::from_millis(200), &mut backend);
        assert_eq!(backend.submitted().len(), 1);

        let t1 = start + Duration::from_millis(250);
        cache.tick(t1, &mut backend);
        assert_eq!(backend.submitted().len(), 2);

        backend.fail(backend.latest_ticket(1).unwrap(), RenderFault::backend("boom"));
        let event = cache.apply_completion(backend.poll().remove(0), t1);
        assert_eq!(event, Some(CacheEvent::RetryScheduled { page: 1, attempt: 3 }));

        // Second retry waits 2 * 250ms
        cache.tick(t1 + Duration::from_millis(499), &mut backend);
        assert_eq!(backend.submitted().len(), 2);
        let t2 = t1 + Duration::from_millis(500);
        cache.tick(t2, &mut backend);
        assert_eq!(backend.submitted().len(), 3);

        backend.fail(backend.latest_ticket(1).unwrap(), RenderFault::backend("boom"));
        let event = cache.apply_completion(backend.poll().remove(0), t2);
        assert!(matches!(event, Some(CacheEvent::Failed { page: 1, .. })));

        cache.tick(t2 + Duration::from_secs(5), &mut backend);
        assert_eq!(backend.submitted().len(), 3);
        assert!(matches!(
            cache.view(1),
            PageView::Placeholder {
                status: PlaceholderStatus::Failed { attempts: 3, .. },
                ..
            }
        ));
    }

    #[test]
    fn timeout_counts_as_failure() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        let start = Instant::now();

        cache.ensure_rendered(3, start, &mut backend);
        let ticket = backend.latest_ticket(3).unwrap();

        assert!(cache.tick(start + Duration::from_secs(9), &mut backend).is_empty());
        let events = cache.tick(start + Duration::from_secs(10), &mut backend);

        assert_eq!(events, vec![CacheEvent::RetryScheduled { page: 3, attempt: 2 }]);
        assert_eq!(backend.cancelled(), vec![ticket]);

        // The late completion of the timed-out job is stale now
        backend.complete(ticket, 600.0, 800.0);
        let event = cache.apply_completion(backend.poll().remove(0), start);
        assert_eq!(event, Some(CacheEvent::Discarded { ticket }));
    }

    #[test]
    fn cancellation_is_silent() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        let now = Instant::now();

        cache.ensure_rendered(1, now, &mut backend);
        backend.fail(backend.latest_ticket(1).unwrap(), RenderFault::Cancelled);

        assert_eq!(cache.apply_completion(backend.poll().remove(0), now), None);
        assert_eq!(cache.stats().failed, 0);
        assert_eq!(cache.stats().retrying, 0);
    }

    #[test]
    fn zoom_change_drops_bitmaps_keeps_dimensions() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        fill(&mut cache, &mut backend, PageWindow::new(1, 3));

        assert!(!cache.invalidate_for_zoom(1.0, &mut backend));
        assert!(cache.invalidate_for_zoom(1.5, &mut backend));

        assert!(cache.rendered_pages().is_empty());
        assert_eq!(cache.dimensions().measured_count(), 3);

        cache.ensure_rendered(1, Instant::now(), &mut backend);
        let job = backend.submitted().pop().unwrap();
        assert!((job.scale - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn placeholder_uses_first_page_size() {
        let mut cache = cache();
        cache.record_dimensions(PageDimensions::new(1, 500.0, 700.0));

        let view = cache.view(42);
        assert!(!view.is_rendered());
        assert_eq!(view.dims(), PageDimensions::new(42, 500.0, 700.0));
    }

    #[test]
    fn stats_track_states() {
        let mut cache = cache();
        let mut backend = ScriptedBackend::new();
        fill(&mut cache, &mut backend, PageWindow::new(1, 2));
        cache.ensure_rendered(3, Instant::now(), &mut backend);

        let stats = cache.stats();
        assert_eq!(stats.rendered, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.retained_bytes, 2 * 600 * 800 * 3);
    }
}
