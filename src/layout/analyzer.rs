//! Density-histogram layout analyzer.
//!
//! The analyzer answers, per page: does this page carry usable native text,
//! and where does real content end versus the lateral certification strip
//! (tarja) that Brazilian e-filing systems stamp along the right margin.

use serde::{Deserialize, Serialize};

use crate::config::{LayoutConfig, RasterQualityThresholds};
use crate::document::{DocumentSource, PageContent};
use crate::engine::EngineCategory;
use crate::error::{Error, Result};
use crate::geometry::BBox;

use super::quality::{DensityQualityEstimator, RasterQuality, RasterQualityEstimator};

/// Coarse page classification driving the extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    /// Enough extractable text inside the safe region; no OCR required.
    NativeText,
    /// Page must be rasterized and run through OCR.
    RasterNeeded,
}

/// Five-tier page complexity classification.
///
/// Native tiers split on the presence of margin artifacts; raster tiers
/// split on estimated scan quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PageComplexity {
    /// Native text, no artifacts.
    NativeClean,
    /// Native text plus certification strips or stamps.
    NativeWithArtifacts,
    /// Clean scan: high contrast, no watermark.
    RasterClean,
    /// Scan with watermark or moderate noise.
    RasterDirty,
    /// Low-contrast or very noisy scan.
    RasterDegraded,
}

impl PageComplexity {
    /// Static complexity-to-engine lookup table.
    ///
    /// Native tiers stay with the lightweight native-text engine even when
    /// artifacts are present (they are cropped out by the safe region, not
    /// re-extracted); clean scans go to plain OCR; dirty and degraded scans
    /// need the heavyweight layout-ML engine.
    pub fn recommended_engine(self) -> EngineCategory {
        match self {
            PageComplexity::NativeClean => EngineCategory::Native,
            PageComplexity::NativeWithArtifacts => EngineCategory::Native,
            PageComplexity::RasterClean => EngineCategory::Ocr,
            PageComplexity::RasterDirty => EngineCategory::HeavyOcr,
            PageComplexity::RasterDegraded => EngineCategory::HeavyOcr,
        }
    }
}

/// Reason a page was flagged for cleaning before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningReason {
    /// Lateral certification strip detected.
    MarginArtifact,
    /// Repeating watermark pattern likely present.
    Watermark,
    /// Contrast below the degraded threshold.
    LowContrast,
    /// Noise above the degraded threshold.
    HighNoise,
}

/// Per-page classification result. Immutable once produced; a fresh set is
/// created on every analysis run and never merged across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageClassification {
    /// 1-based page number.
    pub page_num: usize,
    /// Native-text vs raster classification.
    pub page_type: PageType,
    /// Complexity tier.
    pub complexity: PageComplexity,
    /// Region holding real content, excluding margin artifacts.
    pub safe_bbox: BBox,
    /// Whether a lateral margin artifact was detected.
    pub has_margin_artifact: bool,
    /// X position where the artifact strip begins. Present iff
    /// `has_margin_artifact`.
    pub artifact_cut: Option<f64>,
    /// Extractable elements inside the safe region.
    pub char_count: usize,
    /// Engine category recommended for this page.
    pub recommended_engine: EngineCategory,
    /// Whether the page should be cleaned before extraction.
    pub needs_cleaning: bool,
    /// Reasons for cleaning. Non-empty iff `needs_cleaning`.
    pub cleaning_reasons: Vec<CleaningReason>,
}

/// Full layout report for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutReport {
    /// Document identifier.
    pub doc_id: String,
    /// Total pages analyzed.
    pub total_pages: usize,
    /// Per-page classifications, in page order.
    pub pages: Vec<PageClassification>,
}

impl LayoutReport {
    /// Number of pages classified as native text.
    pub fn native_page_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.page_type == PageType::NativeText)
            .count()
    }

    /// Number of pages needing rasterization.
    pub fn raster_page_count(&self) -> usize {
        self.total_pages - self.native_page_count()
    }

    /// Number of pages with a detected margin artifact.
    pub fn artifact_page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.has_margin_artifact).count()
    }

    /// Fraction of pages classified as native text, in [0, 1].
    pub fn native_text_ratio(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.native_page_count() as f64 / self.total_pages as f64
    }
}

/// Page layout analyzer.
///
/// # Algorithm
///
/// For each page:
/// 1. Build a fixed-bin histogram of element density across the page width.
/// 2. Flag a margin artifact when the density mass in the trailing zone
///    exceeds the configured ratio of total density.
/// 3. Compute the content boundary adaptively (first significant gap between
///    sorted element end positions inside the search zone) or by a fixed
///    percentage cut.
/// 4. Classify the page as native or raster by counting elements inside the
///    safe region, then assign a complexity tier.
///
/// Identical input always yields identical output: there is no randomness
/// and no clock dependence anywhere on this path.
pub struct PageLayoutAnalyzer {
    config: LayoutConfig,
    thresholds: RasterQualityThresholds,
    quality_estimator: Box<dyn RasterQualityEstimator>,
}

impl Default for PageLayoutAnalyzer {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl PageLayoutAnalyzer {
    /// Create an analyzer with the given layout configuration and default
    /// quality thresholds/estimator.
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            thresholds: RasterQualityThresholds::default(),
            quality_estimator: Box::new(DensityQualityEstimator),
        }
    }

    /// Replace the raster quality estimator.
    pub fn with_quality_estimator(mut self, estimator: Box<dyn RasterQualityEstimator>) -> Self {
        self.quality_estimator = estimator;
        self
    }

    /// Replace the raster quality thresholds.
    pub fn with_thresholds(mut self, thresholds: RasterQualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Analyze every page of a document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] when the document has zero pages or a page
    /// cannot be read.
    pub fn analyze(&self, document: &dyn DocumentSource) -> Result<LayoutReport> {
        let total_pages = document.page_count();
        if total_pages == 0 {
            return Err(Error::Input(format!(
                "document '{}' has no pages",
                document.doc_id()
            )));
        }

        let mut pages = Vec::with_capacity(total_pages);
        for index in 0..total_pages {
            let content = document.page(index)?;
            pages.push(self.analyze_page(&content, index + 1));
        }

        let report = LayoutReport {
            doc_id: document.doc_id().to_string(),
            total_pages,
            pages,
        };

        log::debug!(
            "layout '{}': {} pages, {} native, {} with artifacts",
            report.doc_id,
            report.total_pages,
            report.native_page_count(),
            report.artifact_page_count(),
        );

        Ok(report)
    }

    /// Analyze a single page.
    pub fn analyze_page(&self, page: &PageContent, page_num: usize) -> PageClassification {
        let artifact_cut = self.detect_margin_artifact(page);
        let has_margin_artifact = artifact_cut.is_some();

        let safe_bbox = match artifact_cut {
            Some(cut) => BBox::new(
                0.0,
                0.0,
                (cut - self.config.safe_margin).max(0.0),
                page.height,
            ),
            None => BBox::new(0.0, 0.0, page.width, page.height),
        };

        let char_count = page.elements_within(&safe_bbox);

        let page_type = if char_count >= self.config.min_text_chars {
            PageType::NativeText
        } else {
            PageType::RasterNeeded
        };

        let quality = match page_type {
            PageType::RasterNeeded => {
                Some(
                    self.quality_estimator
                        .estimate(page, &safe_bbox, char_count),
                )
            }
            PageType::NativeText => None,
        };

        let complexity = self.classify_complexity(page_type, has_margin_artifact, quality.as_ref());

        let mut cleaning_reasons = Vec::new();
        if has_margin_artifact {
            cleaning_reasons.push(CleaningReason::MarginArtifact);
        }
        if let Some(q) = &quality {
            if q.has_watermark {
                cleaning_reasons.push(CleaningReason::Watermark);
            }
            if q.contrast < self.thresholds.low_contrast {
                cleaning_reasons.push(CleaningReason::LowContrast);
            }
            if q.noise > self.thresholds.high_noise {
                cleaning_reasons.push(CleaningReason::HighNoise);
            }
        }

        PageClassification {
            page_num,
            page_type,
            complexity,
            safe_bbox,
            has_margin_artifact,
            artifact_cut,
            char_count,
            recommended_engine: complexity.recommended_engine(),
            needs_cleaning: !cleaning_reasons.is_empty(),
            cleaning_reasons,
        }
    }

    /// Detect a lateral margin artifact via the density histogram.
    ///
    /// Returns the X cut position when the trailing-zone density mass meets
    /// the configured ratio, `None` otherwise.
    fn detect_margin_artifact(&self, page: &PageContent) -> Option<f64> {
        if page.elements.is_empty() || page.width <= 0.0 {
            return None;
        }

        let histogram = self.build_histogram(page);
        let zone_start_bin = ((self.config.histogram_bins as f64)
            * (1.0 - self.config.artifact_zone_percent)) as usize;

        let zone_mass: usize = histogram[zone_start_bin.min(histogram.len())..].iter().sum();
        let total_mass: usize = histogram.iter().sum();
        if total_mass == 0 {
            return None;
        }

        let zone_density = zone_mass as f64 / total_mass as f64;
        if zone_density < self.config.artifact_density_threshold {
            return None;
        }

        let cut = if self.config.use_adaptive_cut {
            self.find_content_boundary(page)
        } else {
            page.width * (1.0 - self.config.artifact_zone_percent)
        };

        log::debug!(
            "margin artifact: zone density {:.2}, cut at x={:.1}",
            zone_density,
            cut
        );
        Some(cut)
    }

    /// Build the horizontal density histogram for one page.
    fn build_histogram(&self, page: &PageContent) -> Vec<usize> {
        let bins = self.config.histogram_bins;
        let mut histogram = vec![0usize; bins];
        let bin_width = page.width / bins as f64;

        for element in &page.elements {
            let bin = (element.center_x() / bin_width) as usize;
            histogram[bin.min(bins - 1)] += 1;
        }

        histogram
    }

    /// Find where legitimate body content ends.
    ///
    /// Scans element end positions sorted ascending, restricted to the
    /// trailing search zone, and cuts at the first gap wide enough to be the
    /// separation between body text and the artifact strip. Falls back to
    /// the rightmost end position when no such gap exists.
    fn find_content_boundary(&self, page: &PageContent) -> f64 {
        let mut ends: Vec<f64> = page.elements.iter().map(|e| e.x1).collect();
        if ends.is_empty() {
            return page.width;
        }
        ends.sort_by(f64::total_cmp);

        let search_start = page.width * (1.0 - self.config.gap_search_zone_percent);
        let mut boundary = *ends.last().expect("non-empty after sort");

        for window in ends.windows(2) {
            let gap = window[1] - window[0];
            if gap >= self.config.content_gap_threshold && window[0] >= search_start {
                boundary = window[0];
                break;
            }
        }

        boundary
    }

    /// Assign one of the five complexity tiers.
    fn classify_complexity(
        &self,
        page_type: PageType,
        has_margin_artifact: bool,
        quality: Option<&RasterQuality>,
    ) -> PageComplexity {
        match page_type {
            PageType::NativeText => {
                if has_margin_artifact {
                    PageComplexity::NativeWithArtifacts
                } else {
                    PageComplexity::NativeClean
                }
            }
            PageType::RasterNeeded => {
                let Some(q) = quality else {
                    return PageComplexity::RasterDirty;
                };

                if q.contrast > self.thresholds.high_contrast && !q.has_watermark {
                    PageComplexity::RasterClean
                } else if q.contrast < self.thresholds.low_contrast
                    || q.noise > self.thresholds.high_noise
                {
                    PageComplexity::RasterDegraded
                } else {
                    PageComplexity::RasterDirty
                }
            }
        }
    }
}
