//! Error taxonomy for the viewer engine
//!
//! Only [`ViewerError::DocumentLoad`] is fatal to a session. Everything in
//! [`RenderFault`] stays local to one page.

/// Errors surfaced by the session and viewer APIs
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("failed to load document: {detail}")]
    DocumentLoad { detail: String },

    #[error("page {page} not found (document has {page_count} pages)")]
    PageNotFound { page: usize, page_count: usize },

    #[error("document not loaded")]
    DocumentNotLoaded,

    #[error("selection is below the minimum annotation size")]
    InvalidSelection,
}

impl ViewerError {
    pub fn document_load(msg: impl Into<String>) -> Self {
        Self::DocumentLoad { detail: msg.into() }
    }

    /// Timing/programming errors that are logged and otherwise ignored
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::PageNotFound { .. } | Self::DocumentNotLoaded | Self::InvalidSelection
        )
    }
}

/// Why a single page render attempt did not produce a bitmap
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderFault {
    /// Superseded on purpose. Never retried, never reported.
    #[error("render cancelled")]
    Cancelled,

    #[error("render timed out")]
    Timeout,

    #[error("{detail}")]
    Backend { detail: String },
}

impl RenderFault {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend { detail: msg.into() }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
