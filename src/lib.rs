//! # Lextract
//!
//! Adaptive extraction orchestration for scanned and digital legal filings.
//!
//! ## Core Features
//!
//! ### Layout Analysis
//! - **Page Classification**: native-text vs raster pages via element density
//! - **Margin Artifacts**: X-density histogram detection of vertical stamp strips
//! - **Adaptive Cuts**: gap-based content boundary with a fixed-percentage fallback
//! - **Complexity Tiers**: five levels from clean native text to degraded scans
//!
//! ### Engine Selection
//! - **Static Registry**: pluggable [`engine::ExtractionEngine`] implementations
//! - **Resource-Aware**: memory headroom read fresh per document, never cached
//! - **Fallback Chains**: ordered retries across available engines, capped and audited
//!
//! ### Pattern Learning
//! - **Per-Case Memory**: signature-keyed patterns scoped to one judicial case
//! - **Quality Gate**: lower-quality engines never dilute learned confidence
//! - **Divergence Audit**: append-only record of hint-vs-reality mismatches
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use lextract::config::{LayoutConfig, SelectorConfig, StoreConfig};
//! use lextract::engine::{resources::SystemMemory, EngineRegistry};
//! use lextract::store::PatternStore;
//! use lextract::Orchestrator;
//!
//! # fn main() -> lextract::Result<()> {
//! let registry = EngineRegistry::new(); // register engines here
//! let store = Arc::new(PatternStore::open("patterns.db", StoreConfig::default())?);
//! let orchestrator = Orchestrator::new(
//!     registry,
//!     Box::new(SystemMemory::new()),
//!     store,
//!     LayoutConfig::default(),
//!     SelectorConfig::default(),
//! );
//!
//! // let report = orchestrator.analyze(&document)?;
//! // let outcome = orchestrator.select_and_extract(&document, None, None)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Shared geometry and document model
pub mod document;
pub mod geometry;

// Configuration
pub mod config;

// Page layout analysis
pub mod layout;

// Extraction engines and selection
pub mod engine;

// Per-case pattern learning
pub mod store;

// Pipeline facade
pub mod orchestrator;

pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
