//! Viewport state management

use crate::types::ContainerSize;

/// Current viewport state of a viewer
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerState {
    /// Total page count (0 when no document is open)
    pub page_count: usize,

    /// Current zoom factor (1.0 = 100%)
    pub zoom: f64,

    /// Document-space offset of the viewport top, in pixels
    pub scroll_top: f64,

    /// Scroll container size
    pub container: ContainerSize,

    /// Focused page (1-indexed)
    pub focus_page: usize,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ViewerState {
    #[must_use]
    pub fn new(zoom: f64) -> Self {
        Self {
            page_count: 0,
            zoom,
            scroll_top: 0.0,
            container: ContainerSize::default(),
            focus_page: 1,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetPageCount(count) => {
                self.page_count = count;
                self.focus_page = self.focus_page.clamp(1, count.max(1));
                vec![]
            }

            Command::SetZoom(zoom) => {
                if (self.zoom - zoom).abs() > f64::EPSILON {
                    self.zoom = zoom;
                    vec![
                        Effect::InvalidateBitmaps,
                        Effect::RestoreAnchor,
                        Effect::CommitWindow,
                    ]
                } else {
                    vec![]
                }
            }

            Command::SetContainer(container) => {
                if self.container != container {
                    self.container = container;
                    vec![Effect::RestoreAnchor, Effect::ObserveScroll]
                } else {
                    vec![]
                }
            }

            Command::ScrollTo(offset) => {
                let offset = if offset.is_finite() { offset.max(0.0) } else { 0.0 };
                if (self.scroll_top - offset).abs() > f64::EPSILON {
                    self.scroll_top = offset;
                    vec![Effect::ObserveScroll]
                } else {
                    vec![]
                }
            }

            Command::GoToPage(page) => {
                self.focus_page = page.clamp(1, self.page_count.max(1));
                vec![Effect::CommitWindow]
            }

            Command::Reset => {
                let zoom = self.zoom;
                *self = Self::new(zoom);
                vec![Effect::ClearCache]
            }
        }
    }
}

/// Commands that modify viewer state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Update the page count
    SetPageCount(usize),
    /// Set an already clamped zoom factor
    SetZoom(f64),
    /// Scroll container was resized
    SetContainer(ContainerSize),
    /// User scrolled
    ScrollTo(f64),
    /// Explicit navigation to a page
    GoToPage(usize),
    /// Document closed
    Reset,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Every bitmap was rendered at the wrong zoom
    InvalidateBitmaps,
    /// Put the anchored content back at the viewport top on the next tick
    RestoreAnchor,
    /// Commit the window for the focus page immediately
    CommitWindow,
    /// Recompute the focus page and feed the debounced window tracker
    ObserveScroll,
    /// Drop all cached pages and measurements
    ClearCache,
}
