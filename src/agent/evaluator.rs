//! Sufficiency evaluator.
//!
//! Judges after each retrieval round whether the accumulated evidence
//! is enough to answer the original question. The verdict is advisory
//! control flow, not a quality gate: a malformed generation degrades
//! to `Insufficient` so the loop keeps searching instead of aborting.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::config::SessionConfig;
use super::message::TokenUsage;
use super::prompt::build_evaluator_prompt;
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured, strip_code_fences, truncate_preview};
use crate::error::SearchError;
use crate::evidence::EvidenceFragment;

/// Evaluator verdict on the current evidence snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sufficiency {
    /// The evidence can answer the question; stop retrieving.
    Sufficient,
    /// More evidence is needed. Carries the evaluator's stated gap.
    Insufficient(String),
}

impl Sufficiency {
    /// Whether this verdict stops the loop.
    #[must_use]
    pub const fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient)
    }
}

/// JSON schema the evaluator prompt requests.
#[derive(Debug, Deserialize)]
struct Verdict {
    sufficient: bool,
    #[serde(default)]
    reason: String,
}

/// Agent that judges evidence sufficiency.
pub struct SufficiencyEvaluator {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SufficiencyEvaluator {
    /// Creates an evaluator with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &SessionConfig, system_prompt: String) -> Self {
        Self {
            model: config.evaluator_model.clone(),
            max_tokens: config.evaluator_max_tokens,
            system_prompt,
        }
    }

    /// Evaluates whether the snapshot suffices to answer the question.
    ///
    /// An empty snapshot is trivially insufficient and never reaches the
    /// model. A generation that stays malformed after one retry degrades
    /// to `Insufficient` rather than failing the session.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiRequest`] when the provider itself fails.
    pub async fn evaluate(
        &self,
        provider: &dyn LlmProvider,
        question: &str,
        snapshot: &[Arc<EvidenceFragment>],
    ) -> Result<(Sufficiency, TokenUsage), SearchError> {
        if snapshot.is_empty() {
            debug!("empty evidence snapshot, skipping sufficiency call");
            return Ok((
                Sufficiency::Insufficient("no evidence gathered yet".to_string()),
                TokenUsage::default(),
            ));
        }

        let user_msg = build_evaluator_prompt(question, snapshot);
        let outcome = execute_structured(self, provider, &user_msg, Self::parse_verdict).await;

        match outcome {
            Ok((verdict, usage)) => {
                debug!(sufficient = verdict.sufficient, reason = %verdict.reason, "sufficiency verdict");
                let sufficiency = if verdict.sufficient {
                    Sufficiency::Sufficient
                } else {
                    Sufficiency::Insufficient(verdict.reason)
                };
                Ok((sufficiency, usage))
            }
            Err(SearchError::MalformedGeneration { message, .. }) => {
                warn!(message, "evaluator generation malformed twice, treating as insufficient");
                Ok((
                    Sufficiency::Insufficient("evaluator output unusable".to_string()),
                    TokenUsage::default(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Parses the evaluator's JSON verdict.
    fn parse_verdict(content: &str) -> Result<Verdict, SearchError> {
        let json_str = strip_code_fences(content);
        serde_json::from_str(json_str).map_err(|e| SearchError::MalformedGeneration {
            message: format!(
                "failed to parse verdict: {e}. Preview: {:?}",
                truncate_preview(json_str, 200)
            ),
            content: content.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Agent for SufficiencyEvaluator {
    fn name(&self) -> &'static str {
        "evaluator"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
