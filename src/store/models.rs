//! Data model for the per-case pattern store.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::BBox;

/// Maximum signature vector length.
pub const MAX_SIGNATURE_LEN: usize = 100;

/// Kinds of observable page patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Page header region.
    Header,
    /// Page footer region.
    Footer,
    /// Tabular region.
    Table,
    /// Running body text.
    TextBlock,
    /// Embedded image.
    Image,
    /// Signature block.
    Signature,
    /// Notary or court stamp.
    Stamp,
    /// Unclassified.
    Unknown,
}

impl PatternType {
    /// Stable string form, used as the store's column value.
    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::Header => "header",
            PatternType::Footer => "footer",
            PatternType::Table => "table",
            PatternType::TextBlock => "text_block",
            PatternType::Image => "image",
            PatternType::Signature => "signature",
            PatternType::Stamp => "stamp",
            PatternType::Unknown => "unknown",
        }
    }

    /// Parse the stored string form. Unrecognized values map to `Unknown`.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "header" => PatternType::Header,
            "footer" => PatternType::Footer,
            "table" => PatternType::Table,
            "text_block" => PatternType::TextBlock,
            "image" => PatternType::Image,
            "signature" => PatternType::Signature,
            "stamp" => PatternType::Stamp,
            _ => PatternType::Unknown,
        }
    }
}

/// A judicial case: the logical grouping of pages belonging to one process.
///
/// Created on first reference; never deleted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// Store-assigned row id, used as the scope key for patterns.
    pub id: i64,
    /// Case reference (CNJ number or equivalent).
    pub case_ref: String,
    /// Filing system of origin (`pje`, `eproc`, `esaj`, …).
    pub origin_system: String,
}

/// A bounded-length numeric feature vector summarizing a page region's
/// layout, plus its deterministic hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureVector {
    features: Vec<f64>,
    hash: String,
}

impl SignatureVector {
    /// Build a signature from a feature vector.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidValue`] when the vector is empty or longer than
    /// [`MAX_SIGNATURE_LEN`].
    pub fn new(features: Vec<f64>) -> Result<Self> {
        if features.is_empty() {
            return Err(Error::InvalidValue(
                "signature vector cannot be empty".to_string(),
            ));
        }
        if features.len() > MAX_SIGNATURE_LEN {
            return Err(Error::InvalidValue(format!(
                "signature vector too large: {} > {}",
                features.len(),
                MAX_SIGNATURE_LEN
            )));
        }

        let hash = Self::compute_hash(&features);
        Ok(Self { features, hash })
    }

    /// The feature values.
    pub fn features(&self) -> &[f64] {
        &self.features
    }

    /// Deterministic hash of the vector: MD5 over its JSON encoding.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    fn compute_hash(features: &[f64]) -> String {
        let encoded = serde_json::to_string(features).expect("feature vector serializes");
        let mut hasher = Md5::new();
        hasher.update(encoded.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A learned pattern, owned by exactly one case.
///
/// Created on the first occurrence of a signature hash within a case, then
/// only updated, never recreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPattern {
    /// Store-assigned pattern id.
    pub id: i64,
    /// Owning case.
    pub case_id: i64,
    /// Kind of pattern.
    pub pattern_type: PatternType,
    /// Hash of the signature vector.
    pub signature_hash: String,
    /// The signature vector itself.
    pub signature_vector: Vec<f64>,
    /// Page where the pattern was first observed.
    pub first_seen_page: usize,
    /// Page where the pattern was most recently observed.
    pub last_seen_page: usize,
    /// Engine whose observation created the pattern.
    pub created_by_engine: String,
    /// Quality score of the creating engine, fixed at creation.
    pub engine_quality_score: f64,
    /// Number of accepted observations. Monotonically non-decreasing.
    pub occurrence_count: u32,
    /// Running mean of accepted observation confidences, in [0, 1].
    pub avg_confidence: f64,
    /// Number of recorded divergences.
    pub divergence_count: u32,
    /// Whether the pattern has been deprecated. Never toggled
    /// automatically; see [`DEPRECATION_THRESHOLD`].
    pub deprecated: bool,
    /// Suggested extraction region for similar pages.
    pub suggested_bbox: Option<BBox>,
    /// Suggested engine for similar pages.
    pub suggested_engine: Option<String>,
}

/// Number of divergences after which a pattern is a deprecation candidate.
///
/// Deliberately not wired to any automatic toggle: deprecation is a manual
/// policy decision via [`PatternStore::deprecate_pattern`].
///
/// [`PatternStore::deprecate_pattern`]: crate::store::PatternStore::deprecate_pattern
pub const DEPRECATION_THRESHOLD: u32 = 3;

/// A recorded mismatch between a hint's expected confidence and an engine's
/// actual confidence for the same page. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    /// Store-assigned row id.
    pub id: i64,
    /// Pattern the hint came from.
    pub pattern_id: i64,
    /// Page where the divergence was observed.
    pub page_num: usize,
    /// Confidence the hint predicted.
    pub expected_confidence: f64,
    /// Confidence the engine actually produced.
    pub actual_confidence: f64,
    /// Engine that produced the actual result.
    pub engine_used: String,
}

impl Divergence {
    /// Absolute difference between expected and actual confidence.
    pub fn magnitude(&self) -> f64 {
        (self.expected_confidence - self.actual_confidence).abs()
    }
}

/// A similarity-based suggestion from the pattern store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternHint {
    /// Matched pattern.
    pub pattern_id: i64,
    /// Cosine similarity between query and stored signature, in [0, 1].
    pub similarity: f64,
    /// Suggested extraction region, if the pattern carries one.
    pub suggested_bbox: Option<BBox>,
    /// Suggested engine, if the pattern carries one.
    pub suggested_engine: Option<String>,
    /// Expected confidence (the pattern's running mean).
    pub confidence: f64,
    /// Engine that created the pattern.
    pub created_by_engine: String,
    /// Kind of the matched pattern.
    pub pattern_type: PatternType,
    /// Accepted observations behind the pattern.
    pub occurrence_count: u32,
}

impl PatternHint {
    /// Minimum similarity for a hint to be considered trustworthy.
    pub const MIN_SIMILARITY: f64 = 0.85;
    /// Minimum expected confidence for a hint to be considered trustworthy.
    pub const MIN_CONFIDENCE: f64 = 0.7;

    /// Whether the hint should steer the next extraction attempt.
    pub fn should_use(&self) -> bool {
        self.similarity >= Self::MIN_SIMILARITY && self.confidence >= Self::MIN_CONFIDENCE
    }
}

/// One page-processing observation fed into the learning loop.
///
/// Built only from a definitively successful extraction; failed or
/// cancelled attempts never produce an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 1-based page number.
    pub page_num: usize,
    /// Engine that produced the result.
    pub engine: String,
    /// Static quality score of that engine, in [0, 1].
    pub engine_quality: f64,
    /// Result confidence, in [0, 1].
    pub confidence: f64,
    /// Extracted text length, in characters.
    pub text_length: usize,
    /// Region the text came from, if known.
    pub bbox: Option<BBox>,
    /// Kind of pattern this page exhibits.
    pub pattern_type: PatternType,
}

impl Observation {
    /// Create an observation, clamping scores into [0, 1].
    pub fn new(page_num: usize, engine: impl Into<String>, engine_quality: f64, confidence: f64) -> Self {
        Self {
            page_num,
            engine: engine.into(),
            engine_quality: engine_quality.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            text_length: 0,
            bbox: None,
            pattern_type: PatternType::Unknown,
        }
    }

    /// Set the extracted text length.
    pub fn with_text_length(mut self, length: usize) -> Self {
        self.text_length = length;
        self
    }

    /// Set the source region.
    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Set the pattern type.
    pub fn with_pattern_type(mut self, pattern_type: PatternType) -> Self {
        self.pattern_type = pattern_type;
        self
    }
}

/// Aggregated quality metrics for one engine across the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Engine name.
    pub engine: String,
    /// Patterns created by this engine.
    pub total_patterns: u32,
    /// Mean of the patterns' running confidences.
    pub avg_confidence: f64,
    /// Sum of occurrence counts.
    pub total_occurrences: u64,
    /// Deprecated patterns created by this engine.
    pub deprecated_count: u32,
}

impl EngineStats {
    /// Combined reliability score in [0, 1]: mean confidence weighted with
    /// the inverted deprecation rate.
    pub fn reliability_score(&self) -> f64 {
        if self.total_patterns == 0 {
            return 0.0;
        }
        let deprecation_rate = self.deprecated_count as f64 / self.total_patterns as f64;
        self.avg_confidence * 0.7 + (1.0 - deprecation_rate) * 0.3
    }
}
