//! Retrieval backend adapters.
//!
//! A [`RetrievalBackend`] presents a uniform search interface over
//! heterogeneous sources — vector-indexed collections and live crawl —
//! returning ranked, scored fragments with provenance. Backend scores are
//! not comparable across kinds; the orchestrator normalizes each result
//! batch with [`normalize_scores`] before anything reaches the store.

pub mod crawl;
pub mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::evidence::EvidenceFragment;
use crate::session::SubQuery;

pub use crawl::CrawlBackend;
pub use vector::VectorBackend;

/// Kind of retrieval backend a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Vector-indexed document collection.
    Vector,
    /// Live web crawl.
    Crawl,
}

impl BackendKind {
    /// Parses a backend kind name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vector" => Some(Self::Vector),
            "crawl" | "web" => Some(Self::Crawl),
            _ => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Crawl => "crawl",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform interface over retrieval sources.
///
/// Implementations perform network or index I/O but must not mutate any
/// shared state outside their own call. Results are ordered by descending
/// backend-relevance score on the backend's own scale.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Backend instance name for logging and failure diagnostics.
    fn name(&self) -> &str;

    /// Which kind of source this backend searches.
    fn kind(&self) -> BackendKind;

    /// Executes a search for one sub-query.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] or [`BackendError::Timeout`] on
    /// transport failures (both recovered by the orchestrator as zero
    /// evidence), [`BackendError::Rejected`] on invalid input.
    async fn search(
        &self,
        query: &SubQuery,
        limit: usize,
    ) -> Result<Vec<EvidenceFragment>, BackendError>;
}

/// Validates the search contract shared by all adapters: non-empty query
/// text and a positive limit.
pub(crate) fn validate_request(query: &SubQuery, limit: usize) -> Result<(), BackendError> {
    if query.text.trim().is_empty() {
        return Err(BackendError::Rejected {
            message: "query text is empty".to_string(),
        });
    }
    if limit == 0 {
        return Err(BackendError::Rejected {
            message: "limit must be positive".to_string(),
        });
    }
    Ok(())
}

/// Min-max normalizes one retrieval batch's scores into `[0, 1]`.
///
/// Scores stay backend-scoped: normalization happens per (sub-query,
/// backend) call, never across backends. A single-result batch and a batch
/// where every raw score is equal both map to 1.0 — rank information is
/// absent either way, so the fragments are treated as equally relevant
/// within their batch.
pub fn normalize_scores(fragments: &mut [EvidenceFragment]) {
    let Some(first) = fragments.first() else {
        return;
    };
    let mut min = first.raw_score;
    let mut max = first.raw_score;
    for f in fragments.iter() {
        min = min.min(f.raw_score);
        max = max.max(f.raw_score);
    }
    let range = max - min;
    for f in fragments.iter_mut() {
        f.score = if range > f64::EPSILON {
            (f.raw_score - min) / range
        } else {
            1.0
        };
    }
}
