//! Annotation draft state machine
//!
//! Turns pointer and text-selection input into completed annotation
//! drafts in normalized page coordinates.
//!
//! ```text
//! Idle --pointer_down (rectangle tool)--> Drawing --pointer_up--> Idle
//! Idle --selection_start (highlight)----> TextSelecting --selection_end--> Idle
//! ```

use std::fmt;

use log::debug;

use crate::coords::{NormalizedPoint, NormalizedRect, PageMapping, PixelPoint, PixelRect, rect_between};
use crate::error::ViewerError;

/// Smallest normalized width and height a drawn draft may have
pub const MIN_DRAFT_EXTENT: f64 = 0.01;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnnotationTool {
    #[default]
    Pointer,
    Rectangle,
    Area,
    Highlight,
}

impl AnnotationTool {
    /// Tools that draw a box by dragging
    #[must_use]
    pub fn is_rectangle_like(self) -> bool {
        matches!(self, Self::Rectangle | Self::Area)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DraftState {
    Idle,
    Drawing {
        page: usize,
        start: NormalizedPoint,
        current: NormalizedPoint,
    },
    TextSelecting {
        page: usize,
    },
}

/// A finished draft, ready to become an annotation
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedDraft {
    pub page: usize,
    pub tool: AnnotationTool,
    pub rects: Vec<NormalizedRect>,
    /// Selected text, for highlights
    pub text: Option<String>,
}

pub type DraftListener = Box<dyn FnMut(&CompletedDraft)>;

pub struct DraftMachine {
    tool: AnnotationTool,
    state: DraftState,
    min_extent: f64,
    listeners: Vec<DraftListener>,
}

impl fmt::Debug for DraftMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftMachine")
            .field("tool", &self.tool)
            .field("state", &self.state)
            .field("min_extent", &self.min_extent)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for DraftMachine {
    fn default() -> Self {
        Self::new(MIN_DRAFT_EXTENT)
    }
}

impl DraftMachine {
    #[must_use]
    pub fn new(min_extent: f64) -> Self {
        Self {
            tool: AnnotationTool::Pointer,
            state: DraftState::Idle,
            min_extent,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn tool(&self) -> AnnotationTool {
        self.tool
    }

    #[must_use]
    pub fn state(&self) -> DraftState {
        self.state
    }

    /// Page the current draft is on, if any
    #[must_use]
    pub fn draft_page(&self) -> Option<usize> {
        match self.state {
            DraftState::Idle => None,
            DraftState::Drawing { page, .. } | DraftState::TextSelecting { page } => Some(page),
        }
    }

    /// Switching tools drops any draft in progress
    pub fn set_tool(&mut self, tool: AnnotationTool) {
        if tool != self.tool {
            self.cancel();
        }
        self.tool = tool;
    }

    pub fn cancel(&mut self) {
        if self.state != DraftState::Idle {
            debug!("Draft discarded");
        }
        self.state = DraftState::Idle;
    }

    pub fn on_draft_completed(&mut self, listener: impl FnMut(&CompletedDraft) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Begin drawing. Returns whether a draft was started.
    pub fn pointer_down(&mut self, page: usize, point: PixelPoint, mapping: &PageMapping) -> bool {
        if !self.tool.is_rectangle_like() || self.state != DraftState::Idle {
            return false;
        }
        let start = mapping.point_to_normalized(point);
        self.state = DraftState::Drawing {
            page,
            start,
            current: start,
        };
        true
    }

    pub fn pointer_move(&mut self, point: PixelPoint, mapping: &PageMapping) {
        if let DraftState::Drawing { current, .. } = &mut self.state {
            *current = mapping.point_to_normalized(point);
        }
    }

    /// Finish drawing at `point`. Drafts below the minimum size are dropped.
    pub fn pointer_up(&mut self, point: PixelPoint, mapping: &PageMapping) -> Option<CompletedDraft> {
        self.pointer_move(point, mapping);
        let DraftState::Drawing {
            page,
            start,
            current,
        } = self.state
        else {
            return None;
        };
        self.state = DraftState::Idle;

        let rect = rect_between(start, current).clamped();
        if rect.width < self.min_extent || rect.height < self.min_extent {
            debug!(
                "{} on page {page}: {:.4} x {:.4}",
                ViewerError::InvalidSelection,
                rect.width,
                rect.height
            );
            return None;
        }

        Some(self.emit(CompletedDraft {
            page,
            tool: self.tool,
            rects: vec![rect],
            text: None,
        }))
    }

    /// Text selection began on `page`. Only meaningful for highlights.
    pub fn selection_start(&mut self, page: usize) -> bool {
        if self.tool != AnnotationTool::Highlight || self.state != DraftState::Idle {
            return false;
        }
        self.state = DraftState::TextSelecting { page };
        true
    }

    /// Complete a highlight from the selected text and its client rects
    pub fn selection_end(
        &mut self,
        page: usize,
        text: &str,
        client_rects: &[PixelRect],
        mapping: &PageMapping,
    ) -> Option<CompletedDraft> {
        if self.tool != AnnotationTool::Highlight {
            return None;
        }
        self.state = DraftState::Idle;

        if text.trim().is_empty() {
            return None;
        }
        let rects: Vec<_> = client_rects
            .iter()
            .map(|r| mapping.to_normalized(r).clamped())
            .filter(|r| r.width > 0.0 && r.height > 0.0)
            .collect();
        if rects.is_empty() {
            return None;
        }

        Some(self.emit(CompletedDraft {
            page,
            tool: AnnotationTool::Highlight,
            rects,
            text: Some(text.to_string()),
        }))
    }

    fn emit(&mut self, draft: CompletedDraft) -> CompletedDraft {
        debug!(
            "Draft completed on page {} with {} rect(s)",
            draft.page,
            draft.rects.len()
        );
        for listener in &mut self.listeners {
            listener(&draft);
        }
        draft
    }
}
