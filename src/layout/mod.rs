//! Page layout analysis for legal filings.
//!
//! Classifies each page of a document by native-text availability, detects
//! lateral margin artifacts (the certification strips PJe/e-SAJ add along
//! the right edge), and recommends a complexity tier that drives engine
//! selection.

pub mod analyzer;
pub mod quality;

pub use analyzer::{
    CleaningReason, LayoutReport, PageClassification, PageComplexity, PageLayoutAnalyzer, PageType,
};
pub use quality::{DensityQualityEstimator, RasterQuality, RasterQualityEstimator};
