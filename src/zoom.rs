//! Zoom policy, fit modes and scroll anchoring
//!
//! A zoom change reflows every page, so the scroll offset that pointed at
//! some content before the change points somewhere else after it. The
//! anchor records which page the viewport top was on and how far into it;
//! once the new layout exists the viewport is moved back to the same spot.

use std::fmt;
use std::str::FromStr;

use crate::layout::DocumentLayout;
use crate::types::{ContainerSize, PageDimensions};

/// Which container extent a fit zoom should fill
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitMode {
    Width,
    Height,
    Page,
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "width" => Ok(Self::Width),
            "height" => Ok(Self::Height),
            "page" => Ok(Self::Page),
            other => Err(format!("unknown fit mode '{other}' (expected width, height or page)")),
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Width => "width",
            Self::Height => "height",
            Self::Page => "page",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ZoomPolicy {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Multiplier per zoom step
    pub step_rate: f64,
    /// Pixels kept free around a fitted page, per axis
    pub fit_padding: f64,
    /// Relative distance to a fit target that counts as "already fitted"
    pub fit_tolerance: f64,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 8.0,
            step_rate: 1.1,
            fit_padding: 20.0,
            fit_tolerance: 0.1,
        }
    }
}

impl ZoomPolicy {
    /// Clamp into range; non-finite input falls back to 1.0
    #[must_use]
    pub fn clamp(&self, zoom: f64) -> f64 {
        if !zoom.is_finite() {
            return 1.0;
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    #[must_use]
    pub fn step_in(&self, zoom: f64) -> f64 {
        self.clamp(zoom * self.step_rate)
    }

    #[must_use]
    pub fn step_out(&self, zoom: f64) -> f64 {
        self.clamp(zoom / self.step_rate)
    }
}

/// Where the viewport top sat before a reflow
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomAnchor {
    pub page: usize,
    /// `(viewport_top - page_top) / page_height`
    pub relative_offset: f64,
}

/// Anchor the viewport top to the content row under it.
///
/// The anchor page is the page whose slot contains `scroll_top`, not the
/// most visible one: page heights scale with zoom but the gap does not, so
/// an offset measured across a gap would drift. `focus_page` is used only
/// when the layout is empty.
#[must_use]
pub fn capture_anchor(layout: &DocumentLayout<'_>, focus_page: usize, scroll_top: f64) -> ZoomAnchor {
    let page = layout.page_at_offset(scroll_top).unwrap_or(focus_page);
    let page_height = layout.page_height(page);
    let relative_offset = if page_height > 0.0 {
        ((scroll_top - layout.page_top(page)) / page_height).clamp(0.0, 1.0)
    } else {
        0.0
    };
    ZoomAnchor {
        page,
        relative_offset,
    }
}

/// Scroll offset that puts the anchored content back at the viewport top
#[must_use]
pub fn restore_scroll(layout: &DocumentLayout<'_>, anchor: &ZoomAnchor) -> f64 {
    layout.page_top(anchor.page) + anchor.relative_offset * layout.page_height(anchor.page)
}

/// Zoom at which `dims` fills the container minus padding.
///
/// `None` when either side has no usable extent.
#[must_use]
pub fn fit_zoom(
    mode: FitMode,
    dims: &PageDimensions,
    container: &ContainerSize,
    padding: f64,
) -> Option<f64> {
    if !dims.is_valid() || container.is_empty() {
        return None;
    }
    let by_width = (container.width - padding).max(1.0) / dims.width;
    let by_height = (container.height - padding).max(1.0) / dims.height;
    Some(match mode {
        FitMode::Width => by_width,
        FitMode::Height => by_height,
        FitMode::Page => by_width.min(by_height),
    })
}

/// Fit acts as a toggle: asking for the fit you already have goes back to 100%
#[must_use]
pub fn toggle_fit(current: f64, target: f64, tolerance: f64) -> f64 {
    if target > 0.0 && (current - target).abs() / target <= tolerance {
        1.0
    } else {
        target
    }
}

/// Holds the anchor between a zoom mutation and the next tick
#[derive(Debug, Default)]
pub struct ZoomScrollCoordinator {
    policy: ZoomPolicy,
    pending: Option<ZoomAnchor>,
}

impl ZoomScrollCoordinator {
    #[must_use]
    pub fn new(policy: ZoomPolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ZoomPolicy {
        &self.policy
    }

    /// Restore `anchor` once layout has settled.
    pub fn defer(&mut self, anchor: ZoomAnchor) {
        // A waiting anchor was taken against the layout the user last saw
        if self.pending.is_none() {
            self.pending = Some(anchor);
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending(&mut self) -> Option<ZoomAnchor> {
        self.pending.take()
    }

    /// User scrolled before restoration; their position wins
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Resolve a fit request into the zoom to apply
    #[must_use]
    pub fn resolve_fit(
        &self,
        mode: FitMode,
        current: f64,
        dims: &PageDimensions,
        container: &ContainerSize,
    ) -> Option<f64> {
        let target = fit_zoom(mode, dims, container, self.policy.fit_padding)?;
        Some(self.policy.clamp(toggle_fit(current, target, self.policy.fit_tolerance)))
    }
}
