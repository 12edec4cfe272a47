//! Facade tying layout analysis, engine selection, and pattern learning
//! together.
//!
//! Each orchestrator instance owns its own analyzer, selector, and store
//! handle; there is no process-global state, so tests and callers can run
//! several side by side with different configurations.

use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::config::{LayoutConfig, SelectorConfig};
use crate::document::DocumentSource;
use crate::engine::resources::SystemResources;
use crate::engine::selector::{EngineSelector, FallbackOutcome};
use crate::engine::EngineRegistry;
use crate::error::Result;
use crate::layout::{LayoutReport, PageLayoutAnalyzer};
use crate::store::{Case, Observation, PatternHint, PatternStore, PatternType, SignatureVector};

/// Entry point for the extraction pipeline.
pub struct Orchestrator {
    analyzer: Arc<PageLayoutAnalyzer>,
    selector: EngineSelector,
    store: Arc<PatternStore>,
}

impl Orchestrator {
    /// Assemble an orchestrator from its parts.
    ///
    /// The same analyzer instance backs both [`analyze`] and the selector's
    /// native-text probe, so a document is classified consistently across
    /// both paths.
    ///
    /// [`analyze`]: Orchestrator::analyze
    pub fn new(
        registry: EngineRegistry,
        resources: Box<dyn SystemResources>,
        store: Arc<PatternStore>,
        layout_config: LayoutConfig,
        selector_config: SelectorConfig,
    ) -> Self {
        let analyzer = Arc::new(PageLayoutAnalyzer::new(layout_config));
        let selector = EngineSelector::new(
            registry,
            resources,
            Arc::clone(&analyzer),
            selector_config,
        );
        Self {
            analyzer,
            selector,
            store,
        }
    }

    /// Classify every page of a document.
    pub fn analyze(&self, document: &dyn DocumentSource) -> Result<LayoutReport> {
        self.analyzer.analyze(document)
    }

    /// Select an engine for the document and extract with automatic
    /// fallback through the remaining available engines.
    ///
    /// # Errors
    ///
    /// Propagates selection errors ([`Error::EngineNotAvailable`],
    /// [`Error::Input`]) and [`Error::AllEnginesFailed`] when the whole
    /// chain fails.
    ///
    /// [`Error::EngineNotAvailable`]: crate::error::Error::EngineNotAvailable
    /// [`Error::Input`]: crate::error::Error::Input
    /// [`Error::AllEnginesFailed`]: crate::error::Error::AllEnginesFailed
    pub fn select_and_extract(
        &self,
        document: &dyn DocumentSource,
        force_engine: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<FallbackOutcome> {
        self.selector
            .extract_with_fallback(document, force_engine, timeout)
    }

    /// Resolve a case by reference, creating it on first use.
    pub fn case(&self, case_ref: &str, origin_system: &str) -> Result<Case> {
        self.store.get_or_create_case(case_ref, origin_system)
    }

    /// Ask the store for a hint about a page signature.
    ///
    /// The store is advisory here: a lookup failure is logged and degrades
    /// to `None` instead of aborting the page, since extraction works fine
    /// without a hint.
    pub fn pattern_hint(
        &self,
        case_id: i64,
        signature: &SignatureVector,
        pattern_type: Option<PatternType>,
    ) -> Option<PatternHint> {
        match self
            .store
            .find_similar_pattern(case_id, signature, pattern_type)
        {
            Ok(hint) => hint,
            Err(err) => {
                warn!("pattern lookup failed, continuing without hint: {err}");
                None
            }
        }
    }

    /// Feed a successful page extraction back into the store.
    ///
    /// Unlike [`pattern_hint`], failures here surface to the caller: losing
    /// a learning write silently would corrupt the store's statistics over
    /// time.
    ///
    /// [`pattern_hint`]: Orchestrator::pattern_hint
    pub fn learn(
        &self,
        case_id: i64,
        signature: &SignatureVector,
        observation: &Observation,
        hint: Option<&PatternHint>,
    ) -> Result<i64> {
        self.store
            .learn_from_page(case_id, signature, observation, hint)
    }

    /// The shared layout analyzer.
    pub fn analyzer(&self) -> &PageLayoutAnalyzer {
        &self.analyzer
    }

    /// The underlying pattern store.
    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    /// The engine selector.
    pub fn selector(&self) -> &EngineSelector {
        &self.selector
    }
}
