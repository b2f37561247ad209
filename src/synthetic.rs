//! In-memory document with generated pages
//!
//! Used by the CLI's `--synthetic` mode and throughout the tests. Pages are
//! solid colour fills; failures and latency can be injected per page.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{RenderFault, ViewerError};
use crate::provider::{PageInfoProvider, Raster, Rasterizer, RasterizerFactory};
use crate::types::{Bitmap, DocumentId, PageDimensions};

/// Remaining injected failures per page
type FailureScript = Arc<Mutex<HashMap<usize, u32>>>;

#[derive(Clone, Debug)]
pub struct SyntheticDocument {
    id: DocumentId,
    sizes: Arc<Vec<(f64, f64)>>,
    failures: FailureScript,
    delay: Duration,
}

impl SyntheticDocument {
    /// `page_count` pages of the same size
    #[must_use]
    pub fn uniform(page_count: usize, width: f64, height: f64) -> Self {
        Self::with_sizes(vec![(width, height); page_count])
    }

    #[must_use]
    pub fn with_sizes(sizes: Vec<(f64, f64)>) -> Self {
        Self {
            id: DocumentId::next(),
            sizes: Arc::new(sizes),
            failures: Arc::new(Mutex::new(HashMap::new())),
            delay: Duration::ZERO,
        }
    }

    /// The next `times` renders of `page` fail with a backend fault
    #[must_use]
    pub fn fail_page(self, page: usize, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page, times);
        self
    }

    /// Sleep this long inside every rasterization
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl PageInfoProvider for SyntheticDocument {
    fn document_id(&self) -> DocumentId {
        self.id
    }

    fn page_count(&self) -> Result<usize, ViewerError> {
        Ok(self.sizes.len())
    }

    fn page_info(&self, page: usize) -> Result<PageDimensions, ViewerError> {
        page_size(&self.sizes, page).ok_or(ViewerError::PageNotFound {
            page,
            page_count: self.sizes.len(),
        })
    }

    fn rasterizer_factory(&self) -> RasterizerFactory {
        let sizes = Arc::clone(&self.sizes);
        let failures = Arc::clone(&self.failures);
        let delay = self.delay;
        Arc::new(move || -> Result<Box<dyn Rasterizer>, RenderFault> {
            Ok(Box::new(SyntheticRasterizer {
                sizes: Arc::clone(&sizes),
                failures: Arc::clone(&failures),
                delay,
            }) as Box<dyn Rasterizer>)
        })
    }

    fn describe(&self) -> String {
        format!("synthetic document ({} pages)", self.sizes.len())
    }
}

fn page_size(sizes: &[(f64, f64)], page: usize) -> Option<PageDimensions> {
    let (width, height) = *sizes.get(page.checked_sub(1)?)?;
    Some(PageDimensions::new(page, width, height))
}

/// Distinct, stable colour per page
fn page_colour(page: usize) -> [u8; 3] {
    [
        (page * 37 % 256) as u8,
        (page * 91 % 256) as u8,
        (255 - page * 13 % 128) as u8,
    ]
}

struct SyntheticRasterizer {
    sizes: Arc<Vec<(f64, f64)>>,
    failures: FailureScript,
    delay: Duration,
}

impl SyntheticRasterizer {
    fn take_failure(&self, page: usize) -> bool {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get_mut(&page) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl Rasterizer for SyntheticRasterizer {
    fn rasterize(&mut self, page: usize, scale: f64) -> Result<Raster, RenderFault> {
        let intrinsic = page_size(&self.sizes, page)
            .ok_or_else(|| RenderFault::backend(format!("no page {page}")))?;

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.take_failure(page) {
            return Err(RenderFault::backend(format!("injected failure on page {page}")));
        }

        let width_px = (intrinsic.width * scale).ceil().max(1.0) as u32;
        let height_px = (intrinsic.height * scale).ceil().max(1.0) as u32;
        Ok(Raster {
            bitmap: Bitmap::solid(width_px, height_px, page_colour(page), scale),
            intrinsic,
        })
    }
}
