//! Configuration for the extraction orchestrator.
//!
//! All thresholds live here so the three subsystems stay tunable without
//! touching their algorithms. Defaults come from production runs against
//! PJe/e-SAJ filings.

/// Layout analysis configuration: density histogram and margin-artifact
/// (tarja) detection.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Number of fixed-width bins in the horizontal density histogram.
    pub histogram_bins: usize,

    /// Fraction of page width (from the right edge) treated as the
    /// artifact zone.
    pub artifact_zone_percent: f64,

    /// Minimum share of total density mass inside the artifact zone for a
    /// margin artifact to be reported.
    pub artifact_density_threshold: f64,

    /// Minimum extractable elements inside the safe region for a page to be
    /// classified as native text.
    pub min_text_chars: usize,

    /// Safety margin subtracted from the artifact cut when building the safe
    /// region, in document units.
    pub safe_margin: f64,

    /// Use adaptive gap detection for the content boundary. When false, the
    /// boundary falls back to a fixed percentage cut.
    pub use_adaptive_cut: bool,

    /// Minimum gap between consecutive element end positions for the
    /// adaptive boundary to treat it as the body/artifact separation.
    pub content_gap_threshold: f64,

    /// Fraction of page width (from the right edge) searched for boundary
    /// gaps in adaptive mode.
    pub gap_search_zone_percent: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            histogram_bins: 40,
            artifact_zone_percent: 0.20,
            artifact_density_threshold: 0.5,
            min_text_chars: 10,
            safe_margin: 10.0,
            use_adaptive_cut: true,
            content_gap_threshold: 30.0,
            gap_search_zone_percent: 0.30,
        }
    }
}

impl LayoutConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of histogram bins.
    pub fn with_histogram_bins(mut self, bins: usize) -> Self {
        self.histogram_bins = bins;
        self
    }

    /// Set the artifact density threshold.
    pub fn with_artifact_density_threshold(mut self, threshold: f64) -> Self {
        self.artifact_density_threshold = threshold;
        self
    }

    /// Set the minimum native-text element count.
    pub fn with_min_text_chars(mut self, chars: usize) -> Self {
        self.min_text_chars = chars;
        self
    }

    /// Enable or disable adaptive boundary detection.
    pub fn with_adaptive_cut(mut self, enable: bool) -> Self {
        self.use_adaptive_cut = enable;
        self
    }
}

/// Thresholds for classifying raster page quality into complexity tiers.
#[derive(Debug, Clone)]
pub struct RasterQualityThresholds {
    /// Contrast score above which a scan counts as clean.
    pub high_contrast: f64,
    /// Contrast score below which a scan counts as degraded.
    pub low_contrast: f64,
    /// Noise level above which a scan counts as degraded.
    pub high_noise: f64,
}

impl Default for RasterQualityThresholds {
    fn default() -> Self {
        Self {
            high_contrast: 0.8,
            low_contrast: 0.4,
            high_noise: 0.6,
        }
    }
}

/// Engine selection configuration.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Fraction of pages classified as native text at or above which the
    /// document is treated as text-native.
    pub native_text_threshold: f64,

    /// Maximum number of engines tried by the fallback chain.
    pub max_retries: usize,

    /// Upper bound on pages analyzed when computing the native-text ratio.
    /// `None` analyzes every page.
    pub sample_pages: Option<usize>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            native_text_threshold: 0.8,
            max_retries: 3,
            sample_pages: None,
        }
    }
}

impl SelectorConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the native-text ratio threshold.
    pub fn with_native_text_threshold(mut self, threshold: f64) -> Self {
        self.native_text_threshold = threshold;
        self
    }

    /// Set the fallback chain length cap.
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Cap the number of pages sampled for the native-text ratio.
    pub fn with_sample_pages(mut self, pages: usize) -> Self {
        self.sample_pages = Some(pages);
        self
    }
}

/// Pattern store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Minimum cosine similarity for a stored pattern to produce a hint.
    pub similarity_threshold: f64,

    /// Minimum |expected − actual| confidence delta that gets recorded as a
    /// divergence.
    pub divergence_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            divergence_threshold: 0.2,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_defaults() {
        let config = LayoutConfig::default();
        assert_eq!(config.histogram_bins, 40);
        assert_eq!(config.artifact_zone_percent, 0.20);
        assert_eq!(config.artifact_density_threshold, 0.5);
        assert_eq!(config.min_text_chars, 10);
        assert!(config.use_adaptive_cut);
    }

    #[test]
    fn test_builder_chain() {
        let config = LayoutConfig::new()
            .with_histogram_bins(80)
            .with_min_text_chars(50)
            .with_adaptive_cut(false);
        assert_eq!(config.histogram_bins, 80);
        assert_eq!(config.min_text_chars, 50);
        assert!(!config.use_adaptive_cut);
    }

    #[test]
    fn test_selector_defaults() {
        let config = SelectorConfig::default();
        assert_eq!(config.native_text_threshold, 0.8);
        assert_eq!(config.max_retries, 3);
        assert!(config.sample_pages.is_none());
    }

    #[test]
    fn test_store_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.divergence_threshold, 0.2);
    }
}
