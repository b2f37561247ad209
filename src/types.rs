//! Core value types shared across the engine

use std::sync::atomic::{AtomicU64, Ordering};

/// Dimension changes at or below this many units are treated as the same
/// measurement.
pub const DIMENSION_EPSILON: f64 = 0.1;

/// US Letter in PDF points, used only when nothing has been measured yet
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an opened document.
///
/// Keys shared cache entries so that two viewers showing the same
/// document can reuse each other's rasters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// Allocate a fresh identifier
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Stable identifier derived from a key such as a canonical file path.
    ///
    /// The top bit is always set so these never collide with [`next`](Self::next).
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Self(hasher.finish() | (1 << 63))
    }
}

/// Intrinsic (zoom = 1) size of one page in document units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageDimensions {
    /// Page number (1-indexed)
    pub page: usize,
    pub width: f64,
    pub height: f64,
}

impl PageDimensions {
    #[must_use]
    pub const fn new(page: usize, width: f64, height: f64) -> Self {
        Self {
            page,
            width,
            height,
        }
    }

    /// Both extents are finite and positive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// True when `other` is a genuinely different measurement rather than
    /// rounding noise from a re-render.
    #[must_use]
    pub fn differs_materially(&self, other: &Self) -> bool {
        (self.width - other.width).abs() > DIMENSION_EPSILON
            || (self.height - other.height).abs() > DIMENSION_EPSILON
    }

    /// Same size, attributed to another page. Used for placeholders.
    #[must_use]
    pub const fn for_page(self, page: usize) -> Self {
        Self::new(page, self.width, self.height)
    }
}

/// Size of the scroll container the pages are laid out in, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Rasterized page pixels.
///
/// Raw RGB data (3 bytes per pixel) plus the scale the page was rendered
/// at, so the intrinsic size can always be recovered.
#[derive(Clone)]
pub struct Bitmap {
    pub pixels: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    /// Pixels per intrinsic unit
    pub scale: f64,
}

impl Bitmap {
    /// A bitmap filled with one colour
    #[must_use]
    pub fn solid(width_px: u32, height_px: u32, rgb: [u8; 3], scale: f64) -> Self {
        let len = width_px as usize * height_px as usize;
        let mut pixels = Vec::with_capacity(len * 3);
        for _ in 0..len {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            pixels,
            width_px,
            height_px,
            scale,
        }
    }

    /// Bytes held by the pixel buffer
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("scale", &self.scale)
            .field("bytes", &self.pixels.len())
            .finish_non_exhaustive()
    }
}
