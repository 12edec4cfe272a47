//! Document source collaborator contract.
//!
//! The orchestrator never reads PDF bytes itself: a [`DocumentSource`] yields
//! positioned content elements per page, which is all the layout analyzer
//! needs to build its density histogram. Real readers (pdfium, pdfplumber
//! ports, …) adapt into this trait; tests use [`MemoryDocument`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::BBox;

/// A single positioned content element (typically one character or glyph
/// cluster) on a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentElement {
    /// Left edge of the element.
    pub x0: f64,
    /// Right edge of the element.
    pub x1: f64,
    /// Top edge of the element.
    pub top: f64,
}

impl ContentElement {
    /// Create a new content element.
    pub fn new(x0: f64, x1: f64, top: f64) -> Self {
        Self { x0, x1, top }
    }

    /// Horizontal center of the element, used for histogram binning.
    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }
}

/// Content of a single page as seen by the layout analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// Page width in document units.
    pub width: f64,
    /// Page height in document units.
    pub height: f64,
    /// Positioned content elements. Empty for pages with no native content.
    pub elements: Vec<ContentElement>,
}

impl PageContent {
    /// Count elements whose anchor point falls inside `bbox`.
    pub fn elements_within(&self, bbox: &BBox) -> usize {
        self.elements
            .iter()
            .filter(|e| bbox.contains(e.x0, e.top))
            .count()
    }
}

/// Source of per-page positioned content for one document.
///
/// Implementations must be deterministic: identical document bytes must
/// always yield identical pages, in the same order.
pub trait DocumentSource {
    /// Stable identifier for the document (typically the file stem).
    fn doc_id(&self) -> &str;

    /// Filesystem path handed to extraction engines.
    fn path(&self) -> &Path;

    /// Total number of pages.
    fn page_count(&self) -> usize;

    /// Content of the page at `index` (0-based).
    ///
    /// Fails with [`Error::Input`] when the page cannot be read.
    fn page(&self, index: usize) -> Result<PageContent>;
}

/// An in-memory document, used by tests and as the adapter target for
/// readers that materialize pages up front.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    doc_id: String,
    path: std::path::PathBuf,
    pages: Vec<PageContent>,
}

impl MemoryDocument {
    /// Create a document from pre-built pages.
    pub fn new(doc_id: impl Into<String>, pages: Vec<PageContent>) -> Self {
        let doc_id = doc_id.into();
        let path = std::path::PathBuf::from(format!("{doc_id}.pdf"));
        Self {
            doc_id,
            path,
            pages,
        }
    }

    /// Override the path reported to extraction engines.
    pub fn with_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}

impl DocumentSource for MemoryDocument {
    fn doc_id(&self) -> &str {
        &self.doc_id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<PageContent> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Input(format!("page {} out of range", index + 1)))
    }
}
