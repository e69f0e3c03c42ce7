// src/error.rs
//! Error taxonomy for the context engine.
//!
//! Partial failures inside a fan-out (one source, one provider) are
//! absorbed and recorded by the caller; only total failure of all
//! alternatives in an operation surfaces as an error. Nothing here is
//! fatal to the process.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Per-adapter fetch failure. The aggregator treats all variants the
/// same way: log, record, exclude from the run.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-provider completion failure; recoverable via the fallback chain.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Every provider in a fallback chain failed. Carries the per-provider
/// reason so callers can see the whole path that was attempted.
#[derive(Debug, Clone, Error)]
#[error("all providers failed: {}", format_reasons(.reasons))]
pub struct AllProvidersFailed {
    pub reasons: Vec<(String, ProviderError)>,
}

fn format_reasons(reasons: &[(String, ProviderError)]) -> String {
    reasons
        .iter()
        .map(|(provider, err)| format!("{provider}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every requested source failed for this run. Distinguishes "could
    /// not determine trends" from an empty-but-successful aggregation.
    #[error("all sources failed for topic `{topic}`")]
    AllSourcesFailed {
        topic: String,
        errors: BTreeMap<String, SourceError>,
    },

    #[error(transparent)]
    Providers(#[from] AllProvidersFailed),
}
