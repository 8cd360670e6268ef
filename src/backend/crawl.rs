//! Crawl collaborator adapter.
//!
//! Talks to a fetch-and-extract service (Firecrawl-style) over JSON/HTTP.
//! HTTP session handling, rendering, and extraction are the collaborator's
//! concern; this adapter sees only ranked page excerpts with URLs. Crawl
//! latency and failure are treated exactly like vector-backend failure:
//! non-fatal, zero evidence for the affected sub-query.

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendKind, RetrievalBackend, validate_request};
use crate::error::BackendError;
use crate::evidence::EvidenceFragment;
use crate::session::SubQuery;

/// Adapter for a crawl/extract service.
#[derive(Debug, Clone)]
pub struct CrawlBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

/// Request body for the crawl collaborator.
#[derive(Debug, Serialize)]
struct CrawlRequest<'a> {
    query: &'a str,
    limit: usize,
}

/// One extracted page excerpt.
#[derive(Debug, Deserialize)]
struct CrawlPage {
    url: String,
    excerpt: String,
    #[serde(default = "default_crawl_score")]
    score: f64,
}

const fn default_crawl_score() -> f64 {
    1.0
}

/// Response body from the crawl collaborator.
#[derive(Debug, Deserialize)]
struct CrawlResponse {
    pages: Vec<CrawlPage>,
}

impl CrawlBackend {
    /// Creates an adapter for the service at `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl RetrievalBackend for CrawlBackend {
    fn name(&self) -> &str {
        "crawl"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Crawl
    }

    async fn search(
        &self,
        query: &SubQuery,
        limit: usize,
    ) -> Result<Vec<EvidenceFragment>, BackendError> {
        validate_request(query, limit)?;

        let body = CrawlRequest {
            query: &query.text,
            limit,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        // Transport failures of any kind surface as Unavailable; the
        // per-call deadline is enforced by the caller, not this client.
        let response = request.send().await.map_err(|e| BackendError::Unavailable {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(BackendError::Rejected {
                message: format!("crawl service returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable {
                message: format!("crawl service returned {status}"),
            });
        }

        let parsed: CrawlResponse =
            response.json().await.map_err(|e| BackendError::Unavailable {
                message: format!("malformed crawl response: {e}"),
            })?;

        debug!(
            query = query.text,
            pages = parsed.pages.len(),
            "crawl fetch complete"
        );

        let retrieved_at = SystemTime::now();
        Ok(parsed
            .pages
            .into_iter()
            .map(|page| EvidenceFragment {
                text: page.excerpt,
                source_id: page.url,
                backend: BackendKind::Crawl,
                raw_score: page.score,
                score: page.score,
                offset: None,
                retrieved_at,
            })
            .collect())
    }
}
