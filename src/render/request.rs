//! Render job and completion types

use std::sync::Arc;

use crate::error::RenderFault;
use crate::types::{Bitmap, DocumentId, PageDimensions};

/// Identifies one render attempt for one page.
///
/// Generations come from a per-cache counter and only ever grow, so a
/// completion whose generation is not the page's current one is stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTicket {
    pub page: usize,
    pub generation: u64,
}

impl RenderTicket {
    #[must_use]
    pub const fn new(page: usize, generation: u64) -> Self {
        Self { page, generation }
    }
}

/// Work item handed to a [`RenderBackend`]
#[derive(Clone, Debug, PartialEq)]
pub struct RenderJob {
    pub ticket: RenderTicket,
    pub document: DocumentId,
    /// Pixels per intrinsic unit
    pub scale: f64,
}

/// Rendered page ready for display
#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub bitmap: Arc<Bitmap>,
    pub intrinsic: PageDimensions,
}

/// Outcome of a [`RenderJob`]
#[derive(Debug)]
pub struct RenderCompletion {
    pub ticket: RenderTicket,
    pub result: Result<RenderOutput, RenderFault>,
}

/// Messages sent to render workers
#[derive(Debug)]
pub enum WorkerRequest {
    Render(RenderJob),
    Shutdown,
}

/// Asynchronous executor of render jobs.
///
/// Completions may arrive in any order and after the job was cancelled;
/// callers are expected to check tickets.
pub trait RenderBackend {
    fn submit(&mut self, job: RenderJob);

    /// Best-effort cancellation; the job may still complete
    fn cancel(&mut self, ticket: RenderTicket);

    /// Drain completions that arrived since the last poll
    fn poll(&mut self) -> Vec<RenderCompletion>;

    fn shutdown(&mut self);
}
