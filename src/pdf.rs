//! MuPDF-backed page provider

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use crate::error::{RenderFault, ViewerError};
use crate::provider::{PageInfoProvider, Raster, Rasterizer, RasterizerFactory};
use crate::types::{Bitmap, DocumentId, PageDimensions};

/// Largest raster edge in pixels; larger requests are scaled down
pub const MAX_RASTER_DIMENSION: f32 = 8192.0;

/// Errors from the PDF engine
#[derive(Debug, thiserror::Error)]
pub enum WorkerFault {
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl WorkerFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

impl From<WorkerFault> for RenderFault {
    fn from(fault: WorkerFault) -> Self {
        Self::backend(fault.to_string())
    }
}

/// A PDF (or any format MuPDF opens) on disk
pub struct MupdfDocument {
    path: PathBuf,
    id: DocumentId,
    doc: Document,
    page_count: usize,
}

impl MupdfDocument {
    pub fn open(path: &Path) -> Result<Self, ViewerError> {
        let doc = open_document(path).map_err(|e| ViewerError::document_load(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| ViewerError::document_load(e.to_string()))?;
        let page_count = usize::try_from(page_count).unwrap_or(0);
        if page_count == 0 {
            return Err(ViewerError::document_load(format!(
                "{} has no pages",
                path.display()
            )));
        }

        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned();
        info!("Opened {} ({page_count} pages)", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            id: DocumentId::from_key(&key),
            doc,
            page_count,
        })
    }
}

/// Open `path` as a page provider
pub fn open(path: &Path) -> Result<MupdfDocument, ViewerError> {
    MupdfDocument::open(path)
}

fn open_document(path: &Path) -> Result<Document, WorkerFault> {
    Ok(Document::open(path.to_string_lossy().as_ref())?)
}

/// Intrinsic size of 1-indexed `page`
fn measure(doc: &Document, page: usize) -> Result<PageDimensions, WorkerFault> {
    let index = i32::try_from(page.saturating_sub(1))
        .map_err(|_| WorkerFault::generic(format!("page {page} out of range")))?;
    let bounds = doc.load_page(index)?.bounds()?;
    Ok(PageDimensions::new(
        page,
        f64::from(bounds.x1 - bounds.x0),
        f64::from(bounds.y1 - bounds.y0),
    ))
}

impl PageInfoProvider for MupdfDocument {
    fn document_id(&self) -> DocumentId {
        self.id
    }

    fn page_count(&self) -> Result<usize, ViewerError> {
        Ok(self.page_count)
    }

    fn page_info(&self, page: usize) -> Result<PageDimensions, ViewerError> {
        if page == 0 || page > self.page_count {
            return Err(ViewerError::PageNotFound {
                page,
                page_count: self.page_count,
            });
        }
        measure(&self.doc, page).map_err(|e| ViewerError::document_load(e.to_string()))
    }

    fn rasterizer_factory(&self) -> RasterizerFactory {
        let path = self.path.clone();
        Arc::new(move || -> Result<Box<dyn Rasterizer>, RenderFault> {
            let doc = open_document(&path)?;
            Ok(Box::new(MupdfRasterizer { doc }) as Box<dyn Rasterizer>)
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Per-thread MuPDF handle
struct MupdfRasterizer {
    doc: Document,
}

impl MupdfRasterizer {
    fn render(&self, page: usize, scale: f64) -> Result<Raster, WorkerFault> {
        let intrinsic = measure(&self.doc, page)?;
        let index = i32::try_from(page - 1)
            .map_err(|_| WorkerFault::generic(format!("page {page} out of range")))?;
        let loaded = self.doc.load_page(index)?;

        let mut mag = scale as f32;
        let max_dim = (intrinsic.width.max(intrinsic.height) as f32) * mag;
        if max_dim > MAX_RASTER_DIMENSION {
            mag *= MAX_RASTER_DIMENSION / max_dim;
        }

        let rgb = Colorspace::device_rgb();
        let pixmap = loaded.to_pixmap(&Matrix::new_scale(mag, mag), &rgb, false, false)?;
        let pixels = pixmap_to_rgb(&pixmap)?;

        Ok(Raster {
            bitmap: Bitmap {
                pixels,
                width_px: pixmap.width() as u32,
                height_px: pixmap.height() as u32,
                scale: f64::from(mag),
            },
            intrinsic,
        })
    }
}

impl Rasterizer for MupdfRasterizer {
    fn rasterize(&mut self, page: usize, scale: f64) -> Result<Raster, RenderFault> {
        if page == 0 {
            return Err(RenderFault::backend("page numbers start at 1"));
        }
        Ok(self.render(page, scale)?)
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, WorkerFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(WorkerFault::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(WorkerFault::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        for px in row[..row_bytes].chunks_exact(n) {
            out.extend_from_slice(&px[..3]);
        }
    }
    Ok(out)
}
