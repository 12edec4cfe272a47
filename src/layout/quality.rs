//! Raster page quality estimation.
//!
//! Quality metrics (contrast, noise, watermark likelihood) come from an
//! external image-quality collaborator in production. The trait keeps that
//! seam pluggable; [`DensityQualityEstimator`] is the built-in fallback that
//! infers quality from element density alone, without rendering the page.

use crate::document::PageContent;
use crate::geometry::BBox;

/// Quality metrics for a rasterized page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterQuality {
    /// Contrast score in [0, 1]; higher is cleaner.
    pub contrast: f64,
    /// Noise level in [0, 1]; higher is noisier.
    pub noise: f64,
    /// Whether a repeating watermark pattern is likely present.
    pub has_watermark: bool,
    /// Extractable elements per unit of safe-region area.
    pub element_density: f64,
}

/// Estimates the quality of a rasterized page.
///
/// Implementations must be deterministic: the analyzer's output for a given
/// document must never depend on randomness or the clock.
pub trait RasterQualityEstimator: Send + Sync {
    /// Estimate quality for a page whose safe region holds `char_count`
    /// extractable elements.
    fn estimate(&self, page: &PageContent, safe_bbox: &BBox, char_count: usize) -> RasterQuality;
}

/// Density-based heuristic estimator.
///
/// Pages that still expose a few positioned elements despite being
/// classified raster tend to be reasonable scans; pages with almost nothing
/// are presumed degraded. Watermark detection needs pixel access and is
/// always `false` here.
#[derive(Debug, Default)]
pub struct DensityQualityEstimator;

impl DensityQualityEstimator {
    /// Below this density the page is presumed low-contrast and noisy.
    const DEGRADED_DENSITY: f64 = 0.0001;
}

impl RasterQualityEstimator for DensityQualityEstimator {
    fn estimate(&self, _page: &PageContent, safe_bbox: &BBox, char_count: usize) -> RasterQuality {
        let area = safe_bbox.area();
        let element_density = if area > 0.0 {
            char_count as f64 / area
        } else {
            0.0
        };

        if element_density < Self::DEGRADED_DENSITY {
            RasterQuality {
                contrast: 0.3,
                noise: 0.7,
                has_watermark: false,
                element_density,
            }
        } else {
            RasterQuality {
                contrast: 0.85,
                noise: 0.3,
                has_watermark: false,
                element_density,
            }
        }
    }
}
