//! Error types for the extraction orchestrator.
//!
//! This module defines all error types that can occur during layout
//! analysis, engine selection, and pattern learning.

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single failed engine attempt inside a fallback chain.
///
/// Kept separate from [`Error`] so that terminal failures can carry the full
/// ordered attempt history: operators need to distinguish "engine X was never
/// tried because it lacked memory" from "engine X was tried and failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Name of the engine that was attempted.
    pub engine: String,
    /// Reason the attempt failed, as reported by the engine.
    pub reason: String,
}

impl std::fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.engine, self.reason)
    }
}

/// Error types that can occur during extraction orchestration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Document is missing, corrupt, or empty. Fatal, never retried.
    #[error("Invalid input document: {0}")]
    Input(String),

    /// No engine satisfies the dependency/resource constraints, or a forced
    /// engine is not among the available ones. Fatal for that call.
    #[error("No suitable extraction engine: {0}")]
    EngineNotAvailable(String),

    /// A single engine's `extract` failed. Caught internally by the fallback
    /// chain and never retried on the same engine.
    #[error("Engine '{engine}' extraction failed: {reason}")]
    Extraction {
        /// Name of the engine that failed.
        engine: String,
        /// Engine-reported failure reason.
        reason: String,
    },

    /// Every engine in the fallback chain failed. Carries one entry per
    /// attempted engine, in attempt order.
    #[error("All {} engines failed: {}", .0.len(), format_failures(.0))]
    AllEnginesFailed(Vec<EngineFailure>),

    /// Pattern store I/O or contention failure. State is left unchanged.
    #[error("Pattern store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A data-model value violated its invariant (confidence range, vector
    /// length, bbox shape).
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

fn format_failures(failures: &[EngineFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
