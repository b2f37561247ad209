//! One opened document

use log::{info, warn};

use crate::error::ViewerError;
use crate::provider::{PageInfoProvider, RasterizerFactory};
use crate::types::{DocumentId, PageDimensions};

/// A document whose page count is known
pub struct DocumentSession {
    provider: Box<dyn PageInfoProvider>,
    id: DocumentId,
    page_count: usize,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("id", &self.id)
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

impl DocumentSession {
    /// Validate `provider` and start a session.
    ///
    /// Any failure to learn the page count, or an empty document, is a
    /// [`ViewerError::DocumentLoad`].
    pub fn open(provider: Box<dyn PageInfoProvider>) -> Result<Self, ViewerError> {
        let page_count = provider.page_count().map_err(|e| match e {
            ViewerError::DocumentLoad { .. } => e,
            other => ViewerError::document_load(other.to_string()),
        })?;
        if page_count == 0 {
            return Err(ViewerError::document_load(format!(
                "{} has no pages",
                provider.describe()
            )));
        }

        info!("Session opened: {} ({page_count} pages)", provider.describe());
        Ok(Self {
            id: provider.document_id(),
            provider,
            page_count,
        })
    }

    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.provider.describe()
    }

    pub fn check_page(&self, page: usize) -> Result<(), ViewerError> {
        if page == 0 || page > self.page_count {
            return Err(ViewerError::PageNotFound {
                page,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    pub fn page_info(&self, page: usize) -> Result<PageDimensions, ViewerError> {
        self.check_page(page)?;
        self.provider.page_info(page)
    }

    /// Size of page 1, used as the placeholder size for every other page
    #[must_use]
    pub fn first_page_dimensions(&self) -> Option<PageDimensions> {
        match self.page_info(1) {
            Ok(dims) if dims.is_valid() => Some(dims),
            Ok(dims) => {
                warn!("Ignoring invalid first page size {dims:?}");
                None
            }
            Err(e) => {
                warn!("Could not measure first page: {e}");
                None
            }
        }
    }

    #[must_use]
    pub fn rasterizer_factory(&self) -> RasterizerFactory {
        self.provider.rasterizer_factory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticDocument;

    struct Unreadable;

    impl PageInfoProvider for Unreadable {
        fn document_id(&self) -> DocumentId {
            DocumentId(0)
        }

        fn page_count(&self) -> Result<usize, ViewerError> {
            Err(ViewerError::DocumentNotLoaded)
        }

        fn page_info(&self, _page: usize) -> Result<PageDimensions, ViewerError> {
            Err(ViewerError::DocumentNotLoaded)
        }

        fn rasterizer_factory(&self) -> RasterizerFactory {
            SyntheticDocument::uniform(1, 1.0, 1.0).rasterizer_factory()
        }
    }

    #[test]
    fn page_count_failure_is_document_load() {
        let err = DocumentSession::open(Box::new(Unreadable)).unwrap_err();
        assert!(matches!(err, ViewerError::DocumentLoad { .. }));
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = DocumentSession::open(Box::new(SyntheticDocument::with_sizes(vec![]))).unwrap_err();
        assert!(matches!(err, ViewerError::DocumentLoad { .. }));
    }

    #[test]
    fn page_range_is_checked() {
        let session =
            DocumentSession::open(Box::new(SyntheticDocument::uniform(3, 100.0, 100.0))).unwrap();

        assert_eq!(session.page_count(), 3);
        assert!(session.page_info(3).is_ok());
        assert!(matches!(
            session.page_info(4),
            Err(ViewerError::PageNotFound {
                page: 4,
                page_count: 3
            })
        ));
        assert_eq!(
            session.first_page_dimensions(),
            Some(PageDimensions::new(1, 100.0, 100.0))
        );
    }
}
