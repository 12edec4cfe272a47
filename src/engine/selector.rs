//! Resource-aware engine selection and sequential fallback.
//!
//! Strategy, in order:
//! 1. A forced engine must be among the currently available ones.
//! 2. Documents that are mostly native text go to the lightest
//!    native-capable engine.
//! 3. Scanned documents go to the most capable OCR/layout engine whose
//!    memory requirement fits current headroom, then to the next-best
//!    OCR-capable engine by rank.
//! 4. The fallback chain substitutes engines on failure; it never repeats
//!    one, and attempts are strictly sequential because engines compete for
//!    the same memory ceiling.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SelectorConfig;
use crate::document::DocumentSource;
use crate::error::{EngineFailure, Error, Result};
use crate::layout::{PageLayoutAnalyzer, PageType};

use super::resources::SystemResources;
use super::{EngineCategory, EngineRegistry, ExtractionEngine, ExtractionResult};

/// Outcome of one engine attempt inside a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum AttemptOutcome {
    /// The engine produced a result.
    Succeeded,
    /// The engine failed with the given reason.
    Failed(String),
}

/// One entry of the attempt log returned alongside an extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineAttempt {
    /// Engine that was attempted.
    pub engine: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Successful extraction plus the ordered log of every attempt made.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    /// The result of the first engine that succeeded.
    pub result: ExtractionResult,
    /// All attempts in order; the last entry is the successful one.
    pub attempts: Vec<EngineAttempt>,
}

/// Selects extraction engines and drives retries across them.
pub struct EngineSelector {
    registry: EngineRegistry,
    resources: Box<dyn SystemResources>,
    analyzer: Arc<PageLayoutAnalyzer>,
    config: SelectorConfig,
}

impl EngineSelector {
    /// Create a selector over a registry.
    pub fn new(
        registry: EngineRegistry,
        resources: Box<dyn SystemResources>,
        analyzer: Arc<PageLayoutAnalyzer>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            registry,
            resources,
            analyzer,
            config,
        }
    }

    /// Engines that can run right now: dependencies satisfied and current
    /// memory headroom at or above their requirement, sorted by preference
    /// rank.
    ///
    /// Headroom is read fresh on every call; it is never cached across
    /// documents.
    pub fn get_available_engines(&self) -> Vec<Arc<dyn ExtractionEngine>> {
        let headroom_gb = self.resources.available_memory_gb();

        let mut available: Vec<Arc<dyn ExtractionEngine>> = self
            .registry
            .engines()
            .iter()
            .filter(|engine| {
                if !engine.is_available() {
                    log::debug!("engine {} unavailable: missing dependencies", engine.name());
                    return false;
                }
                if headroom_gb < engine.min_memory_gb() {
                    log::debug!(
                        "engine {} unavailable: needs {:.1} GiB, {:.1} GiB free",
                        engine.name(),
                        engine.min_memory_gb(),
                        headroom_gb
                    );
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        available.sort_by_key(|e| e.preference_rank());
        available
    }

    /// Select the optimal engine for a document.
    ///
    /// # Errors
    ///
    /// [`Error::EngineNotAvailable`] when no engine can run, or when
    /// `force_engine` names an engine that is not currently available;
    /// [`Error::Input`] when the document cannot be analyzed.
    pub fn select_engine(
        &self,
        document: &dyn DocumentSource,
        force_engine: Option<&str>,
    ) -> Result<Arc<dyn ExtractionEngine>> {
        let available = self.get_available_engines();
        if available.is_empty() {
            return Err(Error::EngineNotAvailable(
                "no extraction engine can run on this system".to_string(),
            ));
        }

        if let Some(forced) = force_engine {
            return available
                .iter()
                .find(|e| e.name().eq_ignore_ascii_case(forced))
                .cloned()
                .inspect(|e| log::info!("forcing engine: {}", e.name()))
                .ok_or_else(|| {
                    Error::EngineNotAvailable(format!("forced engine '{forced}' is not available"))
                });
        }

        let native_ratio = self.native_text_ratio(document)?;
        log::info!(
            "document '{}': {:.0}% native text",
            document.doc_id(),
            native_ratio * 100.0
        );

        // Mostly native text: cheapest native-capable engine wins.
        if native_ratio >= self.config.native_text_threshold {
            let lightest = available
                .iter()
                .filter(|e| e.category() == EngineCategory::Native)
                .min_by(|a, b| {
                    a.min_memory_gb()
                        .total_cmp(&b.min_memory_gb())
                        .then(a.preference_rank().cmp(&b.preference_rank()))
                });
            if let Some(engine) = lightest {
                log::info!("selected {} (native text document)", engine.name());
                return Ok(engine.clone());
            }
        }

        // Scanned document: most capable layout engine first. Memory
        // headroom was already enforced by the availability filter.
        if let Some(engine) = available
            .iter()
            .find(|e| e.category() == EngineCategory::HeavyOcr)
        {
            log::info!("selected {} (scanned document)", engine.name());
            return Ok(engine.clone());
        }

        // Next-best OCR-capable engine by rank.
        if let Some(engine) = available
            .iter()
            .find(|e| e.category() == EngineCategory::Ocr)
        {
            log::info!("selected {} (OCR fallback)", engine.name());
            return Ok(engine.clone());
        }

        // Last resort: whatever is available.
        let engine = available[0].clone();
        log::warn!("no OCR-capable engine; falling back to {}", engine.name());
        Ok(engine)
    }

    /// Extract with automatic engine substitution on failure.
    ///
    /// Builds an ordered chain starting with [`select_engine`]'s pick,
    /// followed by the remaining available engines (no duplicates), capped
    /// at the configured retry limit. Engines run strictly one at a time; a
    /// timed-out attempt is an ordinary failure.
    ///
    /// # Errors
    ///
    /// [`Error::AllEnginesFailed`] when the whole chain fails, carrying one
    /// message per attempted engine in attempt order.
    ///
    /// [`select_engine`]: EngineSelector::select_engine
    pub fn extract_with_fallback(
        &self,
        document: &dyn DocumentSource,
        force_engine: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<FallbackOutcome> {
        let primary = self.select_engine(document, force_engine)?;

        let mut chain: Vec<Arc<dyn ExtractionEngine>> = vec![primary];
        for engine in self.get_available_engines() {
            if chain.len() >= self.config.max_retries {
                break;
            }
            if chain.iter().all(|c| c.name() != engine.name()) {
                chain.push(engine);
            }
        }

        let mut attempts = Vec::with_capacity(chain.len());
        let mut failures = Vec::new();

        for (i, engine) in chain.iter().enumerate() {
            log::info!(
                "attempting extraction with {} ({}/{})",
                engine.name(),
                i + 1,
                chain.len()
            );

            match engine.extract(document.path(), timeout) {
                Ok(result) => {
                    log::info!(
                        "{} extracted {} chars from {} pages (confidence {:.2})",
                        engine.name(),
                        result.text.len(),
                        result.page_count,
                        result.confidence
                    );
                    attempts.push(EngineAttempt {
                        engine: engine.name().to_string(),
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok(FallbackOutcome { result, attempts });
                }
                Err(err) => {
                    let reason = err.to_string();
                    log::warn!("{} failed: {}", engine.name(), reason);
                    attempts.push(EngineAttempt {
                        engine: engine.name().to_string(),
                        outcome: AttemptOutcome::Failed(reason.clone()),
                    });
                    failures.push(EngineFailure {
                        engine: engine.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(Error::AllEnginesFailed(failures))
    }

    /// Fraction of (sampled) pages classified as native text.
    fn native_text_ratio(&self, document: &dyn DocumentSource) -> Result<f64> {
        let total = document.page_count();
        if total == 0 {
            return Err(Error::Input(format!(
                "document '{}' has no pages",
                document.doc_id()
            )));
        }

        let sampled = match self.config.sample_pages {
            Some(limit) => total.min(limit),
            None => total,
        };

        let mut native = 0usize;
        for index in 0..sampled {
            let content = document.page(index)?;
            let classification = self.analyzer.analyze_page(&content, index + 1);
            if classification.page_type == PageType::NativeText {
                native += 1;
            }
        }

        Ok(native as f64 / sampled as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::document::{ContentElement, MemoryDocument, PageContent};
    use crate::engine::resources::FixedMemory;
    use crate::engine::testing::MockEngine;

    fn native_page() -> PageContent {
        PageContent {
            width: 612.0,
            height: 792.0,
            elements: (0..40)
                .map(|i| ContentElement::new(50.0 + 7.0 * i as f64, 55.0 + 7.0 * i as f64, 100.0))
                .collect(),
        }
    }

    fn raster_page() -> PageContent {
        PageContent {
            width: 612.0,
            height: 792.0,
            elements: vec![],
        }
    }

    fn native_doc() -> MemoryDocument {
        MemoryDocument::new("native", vec![native_page(), native_page(), native_page()])
    }

    fn raster_doc() -> MemoryDocument {
        MemoryDocument::new("scanned", vec![raster_page(), raster_page()])
    }

    fn selector_with(
        engines: Vec<Arc<dyn ExtractionEngine>>,
        memory_gb: f64,
        config: SelectorConfig,
    ) -> EngineSelector {
        let mut registry = EngineRegistry::new();
        for engine in engines {
            registry.register(engine);
        }
        EngineSelector::new(
            registry,
            Box::new(FixedMemory(memory_gb)),
            Arc::new(PageLayoutAnalyzer::new(LayoutConfig::default())),
            config,
        )
    }

    fn standard_engines() -> Vec<Arc<dyn ExtractionEngine>> {
        vec![
            Arc::new(
                MockEngine::new("marker", EngineCategory::HeavyOcr, 0)
                    .min_memory(8.0)
                    .quality(1.0),
            ),
            Arc::new(MockEngine::new("tesseract", EngineCategory::Ocr, 1).quality(0.7)),
            Arc::new(MockEngine::new("plumber", EngineCategory::Native, 2).quality(0.9)),
        ]
    }

    #[test]
    fn test_available_engines_sorted_by_rank() {
        let selector = selector_with(standard_engines(), 16.0, SelectorConfig::default());
        let names: Vec<_> = selector
            .get_available_engines()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["marker", "tesseract", "plumber"]);
    }

    #[test]
    fn test_memory_headroom_filters_engines() {
        let selector = selector_with(standard_engines(), 4.0, SelectorConfig::default());
        let names: Vec<_> = selector
            .get_available_engines()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        // marker needs 8 GiB, only 4 free
        assert_eq!(names, vec!["tesseract", "plumber"]);
    }

    #[test]
    fn test_dependency_availability_filters_engines() {
        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![
            Arc::new(MockEngine::new("marker", EngineCategory::HeavyOcr, 0).unavailable()),
            Arc::new(MockEngine::new("plumber", EngineCategory::Native, 2)),
        ];
        let selector = selector_with(engines, 16.0, SelectorConfig::default());
        let available = selector.get_available_engines();
        assert_eq!(available.len(), 1);
        assert!(available.iter().all(|e| e.is_available()));
    }

    #[test]
    fn test_native_document_selects_native_engine() {
        let selector = selector_with(standard_engines(), 16.0, SelectorConfig::default());
        let engine = selector.select_engine(&native_doc(), None).unwrap();
        assert_eq!(engine.name(), "plumber");
    }

    #[test]
    fn test_scanned_document_selects_heavy_engine() {
        let selector = selector_with(standard_engines(), 16.0, SelectorConfig::default());
        let engine = selector.select_engine(&raster_doc(), None).unwrap();
        assert_eq!(engine.name(), "marker");
    }

    #[test]
    fn test_scanned_document_without_memory_falls_back_to_ocr() {
        let selector = selector_with(standard_engines(), 4.0, SelectorConfig::default());
        let engine = selector.select_engine(&raster_doc(), None).unwrap();
        assert_eq!(engine.name(), "tesseract");
    }

    #[test]
    fn test_forced_engine_must_be_available() {
        let selector = selector_with(standard_engines(), 4.0, SelectorConfig::default());

        let engine = selector
            .select_engine(&native_doc(), Some("tesseract"))
            .unwrap();
        assert_eq!(engine.name(), "tesseract");

        // marker is filtered out at 4 GiB
        let Err(err) = selector.select_engine(&native_doc(), Some("marker")) else {
            panic!("forcing a filtered engine must fail");
        };
        assert!(matches!(err, Error::EngineNotAvailable(_)));
    }

    #[test]
    fn test_no_engines_at_all() {
        let selector = selector_with(vec![], 16.0, SelectorConfig::default());
        let Err(err) = selector.select_engine(&native_doc(), None) else {
            panic!("empty registry must fail selection");
        };
        assert!(matches!(err, Error::EngineNotAvailable(_)));
    }

    #[test]
    fn test_fallback_succeeds_on_second_engine() {
        let failing = Arc::new(
            MockEngine::new("marker", EngineCategory::HeavyOcr, 0)
                .min_memory(8.0)
                .failing(),
        );
        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![
            failing.clone(),
            Arc::new(MockEngine::new("tesseract", EngineCategory::Ocr, 1)),
        ];
        let selector = selector_with(engines, 16.0, SelectorConfig::default());

        let outcome = selector
            .extract_with_fallback(&raster_doc(), None, None)
            .unwrap();
        assert_eq!(outcome.result.engine_used, "tesseract");
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].engine, "marker");
        assert!(matches!(outcome.attempts[0].outcome, AttemptOutcome::Failed(_)));
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Succeeded);
        // Failed engine never retried
        assert_eq!(failing.call_count(), 1);
    }

    #[test]
    fn test_all_engines_failing_reports_every_attempt_in_order() {
        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![
            Arc::new(MockEngine::new("marker", EngineCategory::HeavyOcr, 0).failing()),
            Arc::new(MockEngine::new("tesseract", EngineCategory::Ocr, 1).failing()),
            Arc::new(MockEngine::new("plumber", EngineCategory::Native, 2).failing()),
        ];
        let selector = selector_with(engines, 16.0, SelectorConfig::default());

        let err = selector
            .extract_with_fallback(&raster_doc(), None, None)
            .unwrap_err();
        match err {
            Error::AllEnginesFailed(failures) => {
                // One message per attempted engine, in attempt order
                assert_eq!(failures.len(), 3);
                let names: Vec<_> = failures.iter().map(|f| f.engine.as_str()).collect();
                assert_eq!(names, vec!["marker", "tesseract", "plumber"]);
            }
            other => panic!("expected AllEnginesFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_max_retries_caps_chain_length() {
        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![
            Arc::new(MockEngine::new("marker", EngineCategory::HeavyOcr, 0).failing()),
            Arc::new(MockEngine::new("tesseract", EngineCategory::Ocr, 1).failing()),
            Arc::new(MockEngine::new("plumber", EngineCategory::Native, 2).failing()),
        ];
        let selector = selector_with(
            engines,
            16.0,
            SelectorConfig::default().with_max_retries(2),
        );

        let err = selector
            .extract_with_fallback(&raster_doc(), None, None)
            .unwrap_err();
        match err {
            Error::AllEnginesFailed(failures) => assert_eq!(failures.len(), 2),
            other => panic!("expected AllEnginesFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_sampled_ratio_uses_page_prefix() {
        // 1 native page followed by 2 raster pages; sampling just the first
        // page sees a fully-native document.
        let doc = MemoryDocument::new("mixed", vec![native_page(), raster_page(), raster_page()]);
        let selector = selector_with(
            standard_engines(),
            16.0,
            SelectorConfig::default().with_sample_pages(1),
        );
        let engine = selector.select_engine(&doc, None).unwrap();
        assert_eq!(engine.name(), "plumber");
    }
}
