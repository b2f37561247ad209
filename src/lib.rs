// Export modules for use in tests
pub mod coords;
pub mod draft;
pub mod error;
pub mod layout;
pub mod overlay;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod panic_handler;
pub mod provider;
pub mod render;
pub mod session;
pub mod settings;
pub mod state;
pub mod synthetic;
pub mod types;
pub mod viewer;
pub mod window;
pub mod zoom;

pub mod test_utils;

// Re-export the viewer surface
pub use coords::{NormalizedRect, PixelPoint, PixelRect};
pub use draft::{AnnotationTool, CompletedDraft, DraftState};
pub use error::{RenderFault, ViewerError};
pub use provider::PageInfoProvider;
pub use render::{PageView, PlaceholderStatus, RenderedPage};
pub use settings::ViewerSettings;
pub use types::{Bitmap, ContainerSize, DocumentId, PageDimensions};
pub use viewer::{TickReport, Viewer, ViewerStats};
pub use window::PageWindow;
pub use zoom::FitMode;
