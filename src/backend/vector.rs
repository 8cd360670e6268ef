//! Vector-search collaborator adapter.
//!
//! Talks to a similarity-search service over JSON/HTTP. Embedding
//! computation and index structure are the collaborator's concern; this
//! adapter depends only on the `similarity_search` contract: text in,
//! ranked scored fragments with document provenance out.

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendKind, RetrievalBackend, validate_request};
use crate::error::BackendError;
use crate::evidence::EvidenceFragment;
use crate::session::SubQuery;

/// Adapter for a vector similarity-search service.
#[derive(Debug, Clone)]
pub struct VectorBackend {
    client: reqwest::Client,
    endpoint: String,
    collection: Option<String>,
    name: String,
}

/// Request body for the similarity-search collaborator.
#[derive(Debug, Serialize)]
struct SimilarityRequest<'a> {
    query: &'a str,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection: Option<&'a str>,
}

/// One ranked hit from the collaborator.
#[derive(Debug, Deserialize)]
struct SimilarityHit {
    text: String,
    /// Document identifier within the collection.
    reference: String,
    score: f64,
    #[serde(default)]
    offset: Option<usize>,
}

/// Response body from the similarity-search collaborator.
#[derive(Debug, Deserialize)]
struct SimilarityResponse {
    results: Vec<SimilarityHit>,
}

impl VectorBackend {
    /// Creates an adapter for the service at `endpoint`, optionally scoped
    /// to one collection.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, collection: Option<String>) -> Self {
        let endpoint = endpoint.into();
        let name = collection
            .as_deref()
            .map_or_else(|| "vector".to_string(), |c| format!("vector/{c}"));
        Self {
            client: reqwest::Client::new(),
            endpoint,
            collection,
            name,
        }
    }

}

#[async_trait]
impl RetrievalBackend for VectorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    async fn search(
        &self,
        query: &SubQuery,
        limit: usize,
    ) -> Result<Vec<EvidenceFragment>, BackendError> {
        validate_request(query, limit)?;

        let body = SimilarityRequest {
            query: &query.text,
            top_k: limit,
            collection: self.collection.as_deref(),
        };

        // Transport failures of any kind surface as Unavailable; the
        // per-call deadline is enforced by the caller, not this client.
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(BackendError::Rejected {
                message: format!("similarity search returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable {
                message: format!("similarity search returned {status}"),
            });
        }

        let parsed: SimilarityResponse =
            response.json().await.map_err(|e| BackendError::Unavailable {
                message: format!("malformed similarity response: {e}"),
            })?;

        debug!(
            backend = self.name,
            query = query.text,
            hits = parsed.results.len(),
            "similarity search complete"
        );

        let retrieved_at = SystemTime::now();
        Ok(parsed
            .results
            .into_iter()
            .map(|hit| EvidenceFragment {
                text: hit.text,
                source_id: hit.reference,
                backend: BackendKind::Vector,
                raw_score: hit.score,
                score: hit.score,
                offset: hit.offset,
                retrieved_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_identity() {
        let backend = VectorBackend::new("http://localhost:9200/search", None);
        assert_eq!(backend.name(), "vector");
        assert_eq!(backend.kind(), BackendKind::Vector);

        let scoped =
            VectorBackend::new("http://localhost:9200/search", Some("papers".to_string()));
        assert_eq!(scoped.name(), "vector/papers");
    }

    #[test]
    fn test_request_serialization_omits_missing_collection() {
        let body = SimilarityRequest {
            query: "capital of france",
            top_k: 5,
            collection: None,
        };
        let json = serde_json::to_string(&body).unwrap_or_default();
        assert!(json.contains("\"top_k\":5"));
        assert!(!json.contains("collection"));
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "results": [
                {"text": "Paris is the capital of France.", "reference": "wiki/France", "score": 0.92, "offset": 120},
                {"text": "France hosted the 2024 Olympics.", "reference": "wiki/Olympics_2024", "score": 0.81}
            ]
        }"#;
        let parsed: SimilarityResponse =
            serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].reference, "wiki/France");
        assert_eq!(parsed.results[0].offset, Some(120));
        assert!(parsed.results[1].offset.is_none());
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_io() {
        let backend = VectorBackend::new("http://unreachable.invalid/search", None);
        let query = SubQuery {
            text: "  ".to_string(),
            step: 0,
            backend_hint: None,
        };
        let result = backend.search(&query, 5).await;
        assert!(matches!(result, Err(BackendError::Rejected { .. })));
    }
}
