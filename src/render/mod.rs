//! Page rendering: job types, the per-viewer cache and the worker pool

pub mod cache;
pub mod request;
pub mod shared;
pub mod worker;

pub use cache::{
    CacheEvent, CacheStats, PageRenderCache, PageView, PlaceholderStatus, ReconcileReport,
    RenderPolicy, RenderedPage,
};
pub use request::{RenderBackend, RenderCompletion, RenderJob, RenderOutput, RenderTicket};
pub use shared::{SharedCacheHandle, SharedCacheKey, SharedPageCache};
pub use worker::WorkerPool;
