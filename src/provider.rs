//! Contract with the page rasterization provider
//!
//! The engine never parses PDFs itself. A provider answers page-count and
//! page-size questions on the interactive thread, and hands out
//! [`Rasterizer`]s that render pages on worker threads.

use std::sync::Arc;

use crate::error::{RenderFault, ViewerError};
use crate::types::{Bitmap, DocumentId, PageDimensions};

/// Result of rasterizing one page
#[derive(Debug)]
pub struct Raster {
    pub bitmap: Bitmap,
    /// Size of the page at zoom 1, as measured while rendering
    pub intrinsic: PageDimensions,
}

/// Renders pages of one document. Lives on a single worker thread.
pub trait Rasterizer {
    /// Render 1-indexed `page` at `scale` pixels per intrinsic unit
    fn rasterize(&mut self, page: usize, scale: f64) -> Result<Raster, RenderFault>;
}

/// Opens a fresh [`Rasterizer`] inside a worker thread.
///
/// Rasterizers usually wrap engine handles that cannot cross threads, so
/// each worker builds its own.
pub type RasterizerFactory =
    Arc<dyn Fn() -> Result<Box<dyn Rasterizer>, RenderFault> + Send + Sync>;

/// A loaded document, as seen by the interactive thread
pub trait PageInfoProvider {
    /// Identity used to key shared render caches
    fn document_id(&self) -> DocumentId;

    fn page_count(&self) -> Result<usize, ViewerError>;

    /// Intrinsic size of 1-indexed `page`
    fn page_info(&self, page: usize) -> Result<PageDimensions, ViewerError>;

    fn rasterizer_factory(&self) -> RasterizerFactory;

    /// Short human-readable name for logs
    fn describe(&self) -> String {
        format!("document {}", self.document_id().0)
    }
}
