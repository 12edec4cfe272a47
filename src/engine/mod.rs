//! Extraction engines: collaborator contract, registry, and selection.
//!
//! Engines are the heavyweight document-extraction backends (native text
//! readers, OCR stacks, layout-ML pipelines). The orchestrator never looks
//! inside them; it only needs their descriptor (name, memory footprint,
//! capabilities, quality rank) and a blocking `extract` call.

pub mod resources;
pub mod selector;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use resources::{FixedMemory, SystemMemory, SystemResources};
pub use selector::{EngineAttempt, EngineSelector, FallbackOutcome};

/// Broad engine capability class, used by the complexity→engine table and
/// by the selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCategory {
    /// Lightweight native-text reader; no rasterization.
    Native,
    /// Plain OCR for clean scans.
    Ocr,
    /// Heavyweight OCR/layout-ML pipeline for dirty or degraded scans.
    HeavyOcr,
}

/// Result of one successful engine invocation. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted text.
    pub text: String,
    /// Number of pages the engine processed.
    pub page_count: usize,
    /// Name of the engine that produced this result.
    pub engine_used: String,
    /// Engine-reported confidence, clamped to [0, 1] on construction.
    pub confidence: f64,
    /// Engine-specific metadata.
    pub metadata: HashMap<String, String>,
    /// Non-fatal warnings, possibly empty.
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    /// Create a result, clamping `confidence` into [0, 1].
    pub fn new(
        text: impl Into<String>,
        page_count: usize,
        engine_used: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            text: text.into(),
            page_count,
            engine_used: engine_used.into(),
            confidence: confidence.clamp(0.0, 1.0),
            metadata: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// An extraction engine.
///
/// Implementations register once at process start; the registry is
/// read-mostly afterwards. A missing optional dependency is reported as
/// `is_available() == false`, never as an error during registration.
pub trait ExtractionEngine: Send + Sync {
    /// Unique engine name.
    fn name(&self) -> &str;

    /// Capability class of this engine.
    fn category(&self) -> EngineCategory;

    /// Minimum free system memory this engine needs, in GiB.
    fn min_memory_gb(&self) -> f64;

    /// External dependencies this engine relies on (informational).
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    /// Static preference rank; lower is preferred.
    fn preference_rank(&self) -> u32;

    /// Static 0–1 trust ranking, used by the pattern store's monotonic
    /// update gate.
    fn quality_score(&self) -> f64;

    /// Whether the engine's dependencies are satisfied on this system.
    fn is_available(&self) -> bool;

    /// Run extraction on the document at `path`.
    ///
    /// This is an opaque blocking call that may run for minutes. `timeout`
    /// is caller-supplied; an engine that overruns it must return an error,
    /// which the fallback chain treats like any other failure.
    fn extract(&self, path: &Path, timeout: Option<Duration>) -> Result<ExtractionResult>;
}

/// Static registry of extraction engines.
///
/// Replaces runtime dependency probing: every engine implementation is
/// registered explicitly at construction time, and absence of a dependency
/// surfaces through `is_available()`.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn ExtractionEngine>>,
}

impl EngineRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine. Called once per engine at process start.
    pub fn register(&mut self, engine: Arc<dyn ExtractionEngine>) {
        log::debug!("registered engine: {}", engine.name());
        self.engines.push(engine);
    }

    /// Register an engine, builder style.
    pub fn with_engine(mut self, engine: Arc<dyn ExtractionEngine>) -> Self {
        self.register(engine);
        self
    }

    /// All registered engines, in registration order.
    pub fn engines(&self) -> &[Arc<dyn ExtractionEngine>] {
        &self.engines
    }

    /// Look up an engine by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn ExtractionEngine>> {
        self.engines
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockEngine;
    use super::*;

    #[test]
    fn test_confidence_clamped_on_construction() {
        assert_eq!(ExtractionResult::new("", 1, "ocr", 1.7).confidence, 1.0);
        assert_eq!(ExtractionResult::new("", 1, "ocr", -0.3).confidence, 0.0);
        assert_eq!(ExtractionResult::new("", 1, "ocr", 0.42).confidence, 0.42);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = EngineRegistry::new()
            .with_engine(Arc::new(MockEngine::new("Marker", EngineCategory::HeavyOcr, 0)));

        assert!(registry.get("marker").is_some());
        assert!(registry.get("MARKER").is_some());
        assert!(registry.get("tesseract").is_none());
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let registry = EngineRegistry::new()
            .with_engine(Arc::new(MockEngine::new("a", EngineCategory::Native, 2)))
            .with_engine(Arc::new(MockEngine::new("b", EngineCategory::Ocr, 1)));

        let names: Vec<_> = registry.engines().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
