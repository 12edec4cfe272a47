//! Per-case learning: signatures, observed patterns, hints, divergences.

mod models;
mod pattern_store;

pub use models::{
    Case, Divergence, EngineStats, Observation, ObservedPattern, PatternHint, PatternType,
    SignatureVector, DEPRECATION_THRESHOLD, MAX_SIGNATURE_LEN,
};
pub use pattern_store::{cosine_similarity, PatternStore};
