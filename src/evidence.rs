//! Evidence fragments and the per-session evidence store.
//!
//! The store is the single aggregation point for everything retrieval
//! returns during a session. It deduplicates by content fingerprint,
//! keeps the best-scoring copy of each fragment, and accumulates a
//! cumulative relevance score per entry. Merging is commutative, so the
//! arrival order of concurrent retrieval results never changes the
//! deduplicated content — only the insertion-order tie-break in
//! [`EvidenceStore::snapshot`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

/// A scored, source-attributed piece of retrieved text.
///
/// Immutable once retrieved. Shared via [`Arc`] between the store and the
/// final answer's citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceFragment {
    /// Retrieved text content.
    pub text: String,
    /// Source identifier: document id for vector backends, URL for crawl.
    pub source_id: String,
    /// Which backend kind produced this fragment.
    pub backend: BackendKind,
    /// Raw backend-relevance score on the backend's own scale.
    pub raw_score: f64,
    /// Score normalized into `[0, 1]` within its retrieval batch.
    pub score: f64,
    /// Byte offset of the fragment within its source, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// When the fragment was retrieved. Used as the tie-break when two
    /// copies of the same fragment carry equal scores.
    pub retrieved_at: SystemTime,
}

impl EvidenceFragment {
    /// Content fingerprint: case-folded, whitespace-collapsed text combined
    /// with the source identifier.
    ///
    /// Two fragments with identical text but different sources fingerprint
    /// differently — provenance matters.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.text, &self.source_id)
    }
}

/// Computes the dedup fingerprint for a text/source pair.
#[must_use]
pub fn fingerprint(text: &str, source_id: &str) -> String {
    let normalized = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{source_id}\u{1f}{normalized}")
}

/// A deduplicated store entry.
#[derive(Debug, Clone)]
struct StoreEntry {
    /// Best-known copy: highest normalized score, ties broken by earliest
    /// retrieval.
    fragment: Arc<EvidenceFragment>,
    /// Sum of normalized scores across all merged copies.
    cumulative: f64,
    /// First-insertion sequence number, the stable snapshot tie-break.
    seq: u64,
}

/// In-memory evidence accumulator for one question session.
///
/// Grows monotonically: there is no removal operation. Owned exclusively
/// by the session's orchestrator, which writes to it only after each
/// step's concurrent retrievals have settled, so the store itself needs
/// no internal locking.
#[derive(Debug, Default)]
pub struct EvidenceStore {
    entries: HashMap<String, StoreEntry>,
    next_seq: u64,
}

impl EvidenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fragment, merging it into an existing entry when the
    /// fingerprint is already known.
    ///
    /// Returns `true` when the fragment was newly admitted, `false` when
    /// it merged into an existing entry (its score still accumulates, and
    /// it replaces the retained copy if it scores higher).
    pub fn add(&mut self, fragment: EvidenceFragment) -> bool {
        let key = fragment.fingerprint();
        let score = fragment.score;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.cumulative += score;
            let better = score > entry.fragment.score
                || (score == entry.fragment.score
                    && fragment.retrieved_at < entry.fragment.retrieved_at);
            if better {
                entry.fragment = Arc::new(fragment);
            }
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            StoreEntry {
                fragment: Arc::new(fragment),
                cumulative: score,
                seq,
            },
        );
        true
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no evidence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if any retained fragment carries this source id.
    #[must_use]
    pub fn contains_source(&self, source_id: &str) -> bool {
        self.entries
            .values()
            .any(|e| e.fragment.source_id == source_id)
    }

    /// Snapshot of retained fragments, sorted by descending cumulative
    /// score with a stable tie-break on first-insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<EvidenceFragment>> {
        let mut entries: Vec<&StoreEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.cumulative
                .partial_cmp(&a.cumulative)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| Arc::clone(&e.fragment)).collect()
    }

    /// Cumulative score for a fragment's fingerprint, if present.
    #[must_use]
    pub fn cumulative_score(&self, fragment: &EvidenceFragment) -> Option<f64> {
        self.entries
            .get(&fragment.fingerprint())
            .map(|e| e.cumulative)
    }
}
