//! Viewer facade
//!
//! Owns one document session and everything hanging off it: the viewport
//! state, the debounced page window, the render cache and its backend, the
//! zoom anchor and the annotation draft machine. All methods run on the
//! interactive thread; time is passed in explicitly so behaviour is
//! reproducible.

use std::sync::PoisonError;
use std::time::Instant;

use log::{debug, warn};

use crate::coords::{NormalizedRect, PageMapping, PixelPoint, PixelRect};
use crate::draft::{AnnotationTool, CompletedDraft, DraftMachine, DraftState};
use crate::error::ViewerError;
use crate::layout::DocumentLayout;
use crate::overlay::{Annotation, OverlayItem, ScrollbarMarker, place_annotations, scrollbar_markers};
use crate::provider::PageInfoProvider;
use crate::render::{
    CacheEvent, CacheStats, PageRenderCache, PageView, RenderBackend, SharedCacheHandle,
    SharedPageCache, WorkerPool,
};
use crate::session::DocumentSession;
use crate::settings::ViewerSettings;
use crate::state::{Command, Effect, ViewerState};
use crate::types::{ContainerSize, DocumentId};
use crate::window::{PageWindow, WindowTracker};
use crate::zoom::{FitMode, ZoomAnchor, ZoomScrollCoordinator, capture_anchor, restore_scroll};

/// What one [`Viewer::tick`] changed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Scroll offset the host must apply
    pub scroll_top: Option<f64>,
    /// Newly committed window
    pub window: Option<PageWindow>,
    pub rendered: Vec<usize>,
    pub failed: Vec<usize>,
    /// A measured page size moved other pages
    pub layout_changed: bool,
}

impl TickReport {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self == &Self::default()
    }
}

/// Snapshot for status lines and tests
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerStats {
    pub page_count: usize,
    pub focus_page: usize,
    pub zoom: f64,
    pub scroll_top: f64,
    pub window: PageWindow,
    pub cache: CacheStats,
    /// Pages held by the shared cache, across every viewer using it
    pub shared_cached: usize,
}

pub struct Viewer {
    settings: ViewerSettings,
    state: ViewerState,
    session: Option<DocumentSession>,
    backend: Option<Box<dyn RenderBackend>>,
    cache: PageRenderCache,
    tracker: WindowTracker,
    zoom: ZoomScrollCoordinator,
    draft: DraftMachine,
    annotations: Vec<Annotation>,
    shared_cache: Option<SharedCacheHandle>,
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("window", &self.tracker.committed())
            .finish_non_exhaustive()
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new(ViewerSettings::default())
    }
}

impl Viewer {
    #[must_use]
    pub fn new(settings: ViewerSettings) -> Self {
        let zoom_policy = settings.zoom_policy();
        let shared_cache = (settings.shared_cache_pages > 0)
            .then(|| SharedPageCache::shared(settings.shared_cache_pages));
        Self {
            state: ViewerState::new(zoom_policy.clamp(settings.default_zoom)),
            session: None,
            backend: None,
            cache: PageRenderCache::new(settings.render_policy()),
            tracker: WindowTracker::new(settings.window_policy()),
            zoom: ZoomScrollCoordinator::new(zoom_policy),
            draft: DraftMachine::new(settings.min_draft_extent),
            annotations: Vec::new(),
            shared_cache,
            settings,
        }
    }

    /// Share rendered pages with other viewers of the same document
    #[must_use]
    pub fn with_shared_cache(mut self, cache: SharedCacheHandle) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Open a document, rendering on a fresh worker pool.
    ///
    /// Returns the page count. Any previously open document is closed.
    pub fn open_document(
        &mut self,
        provider: Box<dyn PageInfoProvider>,
        now: Instant,
    ) -> Result<usize, ViewerError> {
        let session = DocumentSession::open(provider)?;
        let backend = WorkerPool::spawn(
            session.rasterizer_factory(),
            self.settings.render_workers,
            self.shared_cache.clone(),
        );
        Ok(self.install(session, Box::new(backend), now))
    }

    /// Open a document rendering through `backend`
    pub fn open_document_with_backend(
        &mut self,
        provider: Box<dyn PageInfoProvider>,
        backend: Box<dyn RenderBackend>,
        now: Instant,
    ) -> Result<usize, ViewerError> {
        let session = DocumentSession::open(provider)?;
        Ok(self.install(session, backend, now))
    }

    fn install(
        &mut self,
        session: DocumentSession,
        backend: Box<dyn RenderBackend>,
        now: Instant,
    ) -> usize {
        self.close();

        let page_count = session.page_count();
        self.cache.attach(session.id(), self.state.zoom);
        if let Some(first) = session.first_page_dimensions() {
            self.cache.record_dimensions(first);
        }
        self.tracker.reset(page_count);
        let _ = self.state.apply(Command::SetPageCount(page_count));

        self.session = Some(session);
        self.backend = Some(backend);
        self.commit_window(now);
        page_count
    }

    /// Tear down the session. Late completions are dropped with the backend.
    pub fn close(&mut self) {
        let effects = self.state.apply(Command::Reset);
        for effect in effects {
            if effect == Effect::ClearCache {
                if let Some(backend) = self.backend.as_deref_mut() {
                    self.cache.clear(backend);
                    backend.shutdown();
                }
                self.cache.reset();
            }
        }
        if let Some(session) = self.session.take() {
            debug!("Session closed: {}", session.describe());
        }
        self.backend = None;
        self.tracker.reset(0);
        self.zoom.cancel();
        self.draft.cancel();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&DocumentSession, ViewerError> {
        self.session.as_ref().ok_or(ViewerError::DocumentNotLoaded)
    }

    fn check_page(&self, page: usize) -> Result<(), ViewerError> {
        self.session()?.check_page(page).inspect_err(|e| warn!("{e}"))
    }

    fn layout(&self) -> DocumentLayout<'_> {
        DocumentLayout::new(
            self.cache.dimensions(),
            self.state.page_count,
            self.state.zoom,
            self.settings.page_gap,
        )
    }

    fn mapping(&self, page: usize) -> PageMapping {
        PageMapping::new(self.cache.dimensions().get(page), self.state.zoom)
    }

    pub fn map_rect_to_pixels(
        &self,
        page: usize,
        rect: &NormalizedRect,
    ) -> Result<PixelRect, ViewerError> {
        self.check_page(page)?;
        Ok(self.mapping(page).to_pixels(rect))
    }

    pub fn map_rect_to_normalized(
        &self,
        page: usize,
        rect: &PixelRect,
    ) -> Result<NormalizedRect, ViewerError> {
        self.check_page(page)?;
        Ok(self.mapping(page).to_normalized(rect))
    }

    /// Document-space top of `page` at the current zoom
    pub fn page_top(&self, page: usize) -> Result<f64, ViewerError> {
        self.check_page(page)?;
        Ok(self.layout().page_top(page))
    }

    #[must_use]
    pub fn total_height(&self) -> f64 {
        self.layout().total_height()
    }

    /// Report the viewport as the host sees it.
    ///
    /// The window follows after the debounce interval, on a later tick.
    pub fn set_viewport(
        &mut self,
        focus_page: usize,
        zoom: f64,
        container: ContainerSize,
        now: Instant,
    ) -> Result<(), ViewerError> {
        let page_count = self.session()?.page_count();
        if container != self.state.container {
            self.resize(container, now)?;
        }
        // The host's focus wins over the one derived from the scroll offset,
        // and a zoom change commits its window around it
        self.state.focus_page = focus_page.clamp(1, page_count);
        if (zoom - self.state.zoom).abs() > f64::EPSILON {
            self.request_zoom(zoom, now)?;
        }
        self.tracker
            .observe(Some(self.state.focus_page), self.state.zoom, now);
        Ok(())
    }

    /// The host scrolled to `scroll_top`
    pub fn on_scroll(&mut self, scroll_top: f64, now: Instant) -> Result<(), ViewerError> {
        self.session()?;
        self.zoom.cancel();
        let effects = self.state.apply(Command::ScrollTo(scroll_top));
        self.execute_effects(effects, None, now);
        Ok(())
    }

    pub fn resize(&mut self, container: ContainerSize, now: Instant) -> Result<(), ViewerError> {
        self.session()?;
        let anchor = self.current_anchor();
        let effects = self.state.apply(Command::SetContainer(container));
        self.execute_effects(effects, Some(anchor), now);
        Ok(())
    }

    /// Set the zoom (clamped). Returns the zoom actually applied.
    pub fn request_zoom(&mut self, zoom: f64, now: Instant) -> Result<f64, ViewerError> {
        self.session()?;
        let target = self.zoom.policy().clamp(zoom);
        let anchor = self.current_anchor();
        let effects = self.state.apply(Command::SetZoom(target));
        self.execute_effects(effects, Some(anchor), now);
        Ok(self.state.zoom)
    }

    pub fn zoom_in(&mut self, now: Instant) -> Result<f64, ViewerError> {
        let next = self.zoom.policy().step_in(self.state.zoom);
        self.request_zoom(next, now)
    }

    pub fn zoom_out(&mut self, now: Instant) -> Result<f64, ViewerError> {
        let next = self.zoom.policy().step_out(self.state.zoom);
        self.request_zoom(next, now)
    }

    /// Fit the focused page to the container, or back to 100% if it
    /// already fits.
    pub fn request_fit(&mut self, mode: FitMode, now: Instant) -> Result<f64, ViewerError> {
        self.session()?;
        let dims = self.cache.dimensions().get(self.state.focus_page);
        let Some(zoom) = self
            .zoom
            .resolve_fit(mode, self.state.zoom, &dims, &self.state.container)
        else {
            debug!("Fit {mode} ignored: container is {:?}", self.state.container);
            return Ok(self.state.zoom);
        };
        self.request_zoom(zoom, now)
    }

    /// Put the top of `page` at the viewport top. Returns the new scroll offset.
    pub fn scroll_to_page(&mut self, page: usize, now: Instant) -> Result<f64, ViewerError> {
        self.check_page(page)?;
        let top = self.layout().page_top(page);
        Ok(self.navigate(page, top, now))
    }

    /// Bring a normalized vertical position of `page` to the viewport top
    pub fn scroll_to_annotation(
        &mut self,
        page: usize,
        normalized_offset: f64,
        now: Instant,
    ) -> Result<f64, ViewerError> {
        self.check_page(page)?;
        let rect = NormalizedRect::new(0.0, normalized_offset.clamp(0.0, 1.0), 0.0, 0.0);
        let offset = self.mapping(page).to_pixels(&rect).y;
        let target = (self.layout().page_top(page) + offset - self.settings.scroll_margin).max(0.0);
        Ok(self.navigate(page, target, now))
    }

    fn navigate(&mut self, page: usize, scroll_top: f64, now: Instant) -> f64 {
        self.zoom.cancel();
        self.state.scroll_top = scroll_top;
        let effects = self.state.apply(Command::GoToPage(page));
        self.execute_effects(effects, None, now);
        scroll_top
    }

    fn current_anchor(&self) -> ZoomAnchor {
        capture_anchor(&self.layout(), self.state.focus_page, self.state.scroll_top)
    }

    fn execute_effects(&mut self, effects: Vec<Effect>, anchor: Option<ZoomAnchor>, now: Instant) {
        for effect in effects {
            match effect {
                Effect::InvalidateBitmaps => {
                    if let Some(backend) = self.backend.as_deref_mut() {
                        self.cache.invalidate_for_zoom(self.state.zoom, backend);
                    }
                }
                Effect::RestoreAnchor => {
                    if let Some(anchor) = anchor {
                        self.zoom.defer(anchor);
                    }
                }
                Effect::CommitWindow => self.commit_window(now),
                Effect::ObserveScroll => self.observe_scroll(now),
                Effect::ClearCache => {
                    if let Some(backend) = self.backend.as_deref_mut() {
                        self.cache.clear(backend);
                    }
                }
            }
        }
    }

    fn observe_scroll(&mut self, now: Instant) {
        let focus = self
            .layout()
            .most_visible_page(self.state.scroll_top, self.state.container.height);
        if let Some(page) = focus {
            self.state.focus_page = page;
        }
        self.tracker.observe(focus, self.state.zoom, now);
    }

    /// Commit the window around the focus page now and reconcile
    fn commit_window(&mut self, now: Instant) {
        self.tracker.force(self.state.focus_page, self.state.zoom);
        self.reconcile(now);
    }

    fn reconcile(&mut self, now: Instant) {
        let window = self.tracker.committed();
        let focus = self.state.focus_page;
        if let Some(backend) = self.backend.as_deref_mut() {
            let report = self.cache.reconcile(&window, focus, now, backend);
            if !report.scheduled.is_empty() {
                debug!("Scheduled {:?} for {window}", report.scheduled);
            }
        }
    }

    /// Drive time forward: restore anchored scroll, commit debounced
    /// windows, fold in finished renders, expire and retry.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        if self.session.is_none() {
            return report;
        }

        if let Some(anchor) = self.zoom.take_pending() {
            report.scroll_top = Some(self.restore(&anchor));
        }

        if let Some(window) = self.tracker.flush(now) {
            report.window = Some(window);
            self.reconcile(now);
        }

        // Keep the content under the viewport top still while measured
        // sizes replace placeholder sizes above it.
        let anchor = self.current_anchor();
        let Some(backend) = self.backend.as_deref_mut() else {
            return report;
        };
        for completion in backend.poll() {
            match self.cache.apply_completion(completion, now) {
                Some(CacheEvent::Rendered { page, layout_moved }) => {
                    report.rendered.push(page);
                    report.layout_changed |= layout_moved;
                }
                Some(CacheEvent::Failed { page, .. }) => report.failed.push(page),
                _ => {}
            }
        }
        for event in self.cache.tick(now, backend) {
            if let CacheEvent::Failed { page, .. } = event {
                report.failed.push(page);
            }
        }

        if report.layout_changed && report.scroll_top.is_none() && self.state.scroll_top > 0.0 {
            report.scroll_top = Some(self.restore(&anchor));
        }
        report
    }

    fn restore(&mut self, anchor: &ZoomAnchor) -> f64 {
        let layout = self.layout();
        let mut target = restore_scroll(&layout, anchor).max(0.0);
        if self.state.container.height > 0.0 {
            target = target.min(layout.max_scroll(self.state.container.height));
        }
        self.state.scroll_top = target;
        target
    }

    /// Bitmap or placeholder for `page`
    pub fn get_rendered_page(&self, page: usize) -> Result<PageView, ViewerError> {
        self.check_page(page)?;
        Ok(self.cache.view(page))
    }

    /// Re-render `page` even if it has a bitmap
    pub fn refresh_page(&mut self, page: usize, now: Instant) -> Result<(), ViewerError> {
        self.check_page(page)?;
        if let Some(backend) = self.backend.as_deref_mut() {
            self.cache.request_render(page, now, backend);
        }
        Ok(())
    }

    /// Replace the externally managed annotation list
    pub fn set_annotations(&mut self, annotations: Vec<Annotation>) {
        self.annotations = annotations;
    }

    #[must_use]
    pub fn overlay(&self) -> Vec<OverlayItem> {
        place_annotations(&self.annotations, &self.layout(), &self.tracker.committed())
    }

    #[must_use]
    pub fn scrollbar_markers(&self) -> Vec<ScrollbarMarker> {
        scrollbar_markers(&self.annotations, &self.layout())
    }

    pub fn set_tool(&mut self, tool: AnnotationTool) {
        self.draft.set_tool(tool);
    }

    #[must_use]
    pub fn tool(&self) -> AnnotationTool {
        self.draft.tool()
    }

    #[must_use]
    pub fn draft_state(&self) -> DraftState {
        self.draft.state()
    }

    pub fn on_draft_completed(&mut self, listener: impl FnMut(&CompletedDraft) + 'static) {
        self.draft.on_draft_completed(listener);
    }

    /// Pointer pressed at page-local pixel `point`
    pub fn pointer_down(&mut self, page: usize, point: PixelPoint) -> Result<bool, ViewerError> {
        self.check_page(page)?;
        let mapping = self.mapping(page);
        Ok(self.draft.pointer_down(page, point, &mapping))
    }

    pub fn pointer_move(&mut self, point: PixelPoint) {
        if let Some(page) = self.draft.draft_page() {
            let mapping = self.mapping(page);
            self.draft.pointer_move(point, &mapping);
        }
    }

    pub fn pointer_up(&mut self, point: PixelPoint) -> Option<CompletedDraft> {
        let page = self.draft.draft_page()?;
        let mapping = self.mapping(page);
        self.draft.pointer_up(point, &mapping)
    }

    pub fn selection_start(&mut self, page: usize) -> Result<bool, ViewerError> {
        self.check_page(page)?;
        Ok(self.draft.selection_start(page))
    }

    pub fn selection_end(
        &mut self,
        page: usize,
        text: &str,
        client_rects: &[PixelRect],
    ) -> Result<Option<CompletedDraft>, ViewerError> {
        self.check_page(page)?;
        let mapping = self.mapping(page);
        Ok(self.draft.selection_end(page, text, client_rects, &mapping))
    }

    pub fn cancel_draft(&mut self) {
        self.draft.cancel();
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    #[must_use]
    pub fn document_id(&self) -> Option<DocumentId> {
        self.session.as_ref().map(DocumentSession::id)
    }

    #[must_use]
    pub fn zoom(&self) -> f64 {
        self.state.zoom
    }

    #[must_use]
    pub fn scroll_top(&self) -> f64 {
        self.state.scroll_top
    }

    #[must_use]
    pub fn focus_page(&self) -> usize {
        self.state.focus_page
    }

    #[must_use]
    pub fn container(&self) -> ContainerSize {
        self.state.container
    }

    #[must_use]
    pub fn window(&self) -> PageWindow {
        self.tracker.committed()
    }

    #[must_use]
    pub fn stats(&self) -> ViewerStats {
        ViewerStats {
            page_count: self.state.page_count,
            focus_page: self.state.focus_page,
            zoom: self.state.zoom,
            scroll_top: self.state.scroll_top,
            window: self.tracker.committed(),
            cache: self.cache.stats(),
            shared_cached: self.shared_cache.as_ref().map_or(0, |shared| {
                shared.lock().unwrap_or_else(PoisonError::into_inner).len()
            }),
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::synthetic::SyntheticDocument;
    use crate::test_utils::test_helpers::ScriptedBackend;

    fn open(pages: usize) -> (Viewer, ScriptedBackend, Instant) {
        let mut viewer = Viewer::new(ViewerSettings {
            shared_cache_pages: 0,
            ..ViewerSettings::default()
        });
        let backend = ScriptedBackend::new();
        let now = Instant::now();
        viewer
            .open_document_with_backend(
                Box::new(SyntheticDocument::uniform(pages, 600.0, 800.0)),
                Box::new(backend.clone()),
                now,
            )
            .unwrap();
        (viewer, backend, now)
    }

    #[test]
    fn open_commits_initial_window() {
        let (viewer, backend, _) = open(20);

        assert_eq!(viewer.window(), PageWindow::new(1, 6));
        assert_eq!(backend.submitted_pages(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn calls_without_document_fail_softly() {
        let mut viewer = Viewer::default();
        let now = Instant::now();

        assert!(matches!(
            viewer.scroll_to_page(1, now),
            Err(ViewerError::DocumentNotLoaded)
        ));
        assert!(viewer.tick(now).is_idle());
    }

    #[test]
    fn unknown_page_is_reported_not_fatal() {
        let (mut viewer, _, now) = open(10);

        let err = viewer.scroll_to_page(11, now).unwrap_err();
        assert!(err.is_benign());
        assert_eq!(viewer.window(), PageWindow::new(1, 6));
    }

    #[test]
    fn zoom_restores_anchor_on_next_tick() {
        let (mut viewer, _, now) = open(10);
        viewer
            .resize(ContainerSize::new(800.0, 600.0), now)
            .unwrap();
        let top = viewer.scroll_to_page(5, now).unwrap();
        viewer.on_scroll(top + 0.3 * 800.0, now).unwrap();

        viewer.request_zoom(1.5, now).unwrap();
        // Not restored until layout has been reflowed
        assert!((viewer.scroll_top() - (top + 240.0)).abs() < 1e-9);

        let report = viewer.tick(now + Duration::from_millis(1));
        let expected = viewer.page_top(5).unwrap() + 0.3 * 1200.0;
        assert!((report.scroll_top.unwrap() - expected).abs() < 1e-6);
        assert!((viewer.scroll_top() - expected).abs() < 1e-6);
    }

    #[test]
    fn zoom_steps_keep_anchor_and_clamp() {
        let (mut viewer, _, now) = open(10);
        viewer
            .resize(ContainerSize::new(800.0, 600.0), now)
            .unwrap();
        let top = viewer.scroll_to_page(3, now).unwrap();
        viewer.on_scroll(top + 200.0, now).unwrap();

        assert!((viewer.zoom_in(now).unwrap() - 1.1).abs() < 1e-9);
        let report = viewer.tick(now + Duration::from_millis(1));
        let expected = viewer.page_top(3).unwrap() + 0.25 * 880.0;
        assert!((report.scroll_top.unwrap() - expected).abs() < 1e-6);

        for _ in 0..40 {
            viewer.zoom_in(now).unwrap();
        }
        assert!((viewer.zoom() - 8.0).abs() < f64::EPSILON);

        for _ in 0..60 {
            viewer.zoom_out(now).unwrap();
        }
        assert!((viewer.zoom() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn set_viewport_zoom_commits_window_around_new_focus() {
        let (mut viewer, backend, now) = open(100);
        backend.clear_history();

        viewer
            .set_viewport(50, 2.0, ContainerSize::new(800.0, 600.0), now)
            .unwrap();

        assert_eq!(viewer.window(), PageWindow::new(48, 52));
        let mut rescaled: Vec<usize> = backend
            .submitted()
            .iter()
            .filter(|job| (job.scale - 2.0).abs() < f64::EPSILON)
            .map(|job| job.ticket.page)
            .collect();
        rescaled.sort_unstable();
        assert_eq!(rescaled, vec![48, 49, 50, 51, 52]);

        viewer.tick(now + Duration::from_millis(100));
        assert_eq!(viewer.window(), PageWindow::new(48, 52));
    }

    #[test]
    fn zoom_change_rerenders_at_new_scale() {
        let (mut viewer, backend, now) = open(10);
        backend.complete_outstanding(600.0, 800.0);
        viewer.tick(now);
        assert!(viewer.get_rendered_page(1).unwrap().is_rendered());

        viewer.request_zoom(2.0, now).unwrap();

        assert!(!viewer.get_rendered_page(1).unwrap().is_rendered());
        assert_eq!(viewer.window(), PageWindow::new(1, 3));
        let last = backend.submitted().pop().unwrap();
        assert!((last.scale - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fit_width_toggles() {
        let (mut viewer, _, now) = open(4);
        viewer
            .resize(ContainerSize::new(600.0, 800.0), now)
            .unwrap();

        assert!((viewer.request_fit(FitMode::Width, now).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((viewer.request_fit(FitMode::Width, now).unwrap() - 1.0).abs() < f64::EPSILON);

        viewer
            .resize(ContainerSize::new(1220.0, 800.0), now)
            .unwrap();
        assert!((viewer.request_fit(FitMode::Width, now).unwrap() - 2.0).abs() < 1e-9);
        assert!((viewer.request_fit(FitMode::Width, now).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scroll_to_annotation_leaves_margin() {
        let (mut viewer, _, now) = open(10);

        let y = viewer.scroll_to_annotation(3, 0.5, now).unwrap();

        let expected = viewer.page_top(3).unwrap() + 400.0 - 16.0;
        assert!((y - expected).abs() < 1e-9);
        assert_eq!(viewer.focus_page(), 3);
    }

    #[test]
    fn close_cancels_and_shuts_down() {
        let (mut viewer, backend, now) = open(10);

        viewer.close();

        assert_eq!(backend.cancelled().len(), 6);
        assert!(backend.is_shut_down());
        assert!(!viewer.is_open());
        assert!(viewer.tick(now).is_idle());
        assert_eq!(viewer.stats().cache, CacheStats::default());
    }

    #[test]
    fn draft_goes_through_page_mapping() {
        let (mut viewer, _, now) = open(3);
        viewer.request_zoom(2.0, now).unwrap();
        viewer.set_tool(AnnotationTool::Rectangle);

        assert!(viewer.pointer_down(2, PixelPoint::new(120.0, 160.0)).unwrap());
        viewer.pointer_move(PixelPoint::new(300.0, 300.0));
        let draft = viewer.pointer_up(PixelPoint::new(600.0, 800.0)).unwrap();

        assert_eq!(draft.page, 2);
        let rect = draft.rects[0];
        assert!((rect.x - 0.1).abs() < 1e-9);
        assert!((rect.y - 0.1).abs() < 1e-9);
        assert!((rect.width - 0.4).abs() < 1e-9);
        assert!((rect.height - 0.4).abs() < 1e-9);
    }

    #[test]
    fn measured_page_above_keeps_viewport_content() {
        let mut viewer = Viewer::new(ViewerSettings {
            shared_cache_pages: 0,
            ..ViewerSettings::default()
        });
        let backend = ScriptedBackend::new();
        let now = Instant::now();
        viewer
            .open_document_with_backend(
                Box::new(SyntheticDocument::with_sizes(vec![(600.0, 800.0); 10])),
                Box::new(backend.clone()),
                now,
            )
            .unwrap();
        viewer
            .resize(ContainerSize::new(800.0, 600.0), now)
            .unwrap();
        let top = viewer.scroll_to_page(4, now).unwrap();

        // Page 2 turns out to be taller than the placeholder guessed
        let ticket = backend.latest_ticket(2).unwrap();
        backend.complete(ticket, 600.0, 1000.0);
        let report = viewer.tick(now);

        assert!(report.layout_changed);
        let new_top = report.scroll_top.unwrap();
        assert!((new_top - (top + 200.0)).abs() < 1e-6);
        assert!((viewer.page_top(4).unwrap() - new_top).abs() < 1e-6);
    }
}
