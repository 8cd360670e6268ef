//! Query planner.
//!
//! Decomposes the original question into sub-queries and, on later
//! rounds, proposes additional sub-queries targeting gaps in the gathered
//! evidence. A state machine over reasoning steps: `Initial` before the
//! first decomposition, `Expanding` while rounds may still produce
//! queries, `Done` once the loop should stop planning.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::config::SessionConfig;
use super::message::TokenUsage;
use super::prompt::{build_planner_expand_prompt, build_planner_initial_prompt};
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured, strip_code_fences, truncate_preview};
use crate::backend::BackendKind;
use crate::error::SearchError;
use crate::evidence::EvidenceFragment;
use crate::session::SubQuery;

/// Planner state over reasoning steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    /// No planning round has run yet.
    Initial,
    /// At least one round has produced sub-queries; more may follow.
    Expanding,
    /// The planner will propose nothing further.
    Done,
}

/// One proposed sub-query in the generation schema.
///
/// Models may emit either a bare string or an object carrying a backend
/// hint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProposedQuery {
    /// Bare query text.
    Text(String),
    /// Query with an optional backend hint.
    Hinted {
        /// Query text.
        query: String,
        /// Backend kind name (`"vector"` or `"crawl"`).
        #[serde(default)]
        backend: Option<String>,
    },
}

/// Wrapper object the planner prompt requests.
#[derive(Debug, Deserialize)]
struct PlanWrapper {
    sub_queries: Vec<ProposedQuery>,
}

/// Agent that decomposes questions into search queries.
pub struct QueryPlanner {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    fan_out: usize,
    state: PlannerState,
}

impl QueryPlanner {
    /// Creates a planner with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &SessionConfig, system_prompt: String) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            system_prompt,
            fan_out: config.fan_out,
            state: PlannerState::Initial,
        }
    }

    /// Current planner state.
    #[must_use]
    pub const fn state(&self) -> PlannerState {
        self.state
    }

    /// Forces the `Done` state (sufficiency signaled or budget exhausted).
    pub const fn finish(&mut self) {
        self.state = PlannerState::Done;
    }

    /// Runs one planning round.
    ///
    /// Returns the sanitized sub-queries for the given step. A malformed
    /// generation is retried once by the execution helper; if the retry is
    /// also malformed the round degrades to "no new sub-queries" rather
    /// than failing the session. An empty result transitions the planner
    /// to `Done`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiRequest`] when the provider itself fails.
    pub async fn plan(
        &mut self,
        provider: &dyn LlmProvider,
        question: &str,
        snapshot: &[Arc<EvidenceFragment>],
        issued: &[&str],
        step: usize,
    ) -> Result<(Vec<SubQuery>, TokenUsage), SearchError> {
        if self.state == PlannerState::Done {
            return Ok((Vec::new(), TokenUsage::default()));
        }

        let user_msg = match self.state {
            PlannerState::Initial => build_planner_initial_prompt(question, self.fan_out),
            PlannerState::Expanding | PlannerState::Done => {
                build_planner_expand_prompt(question, snapshot, issued, self.fan_out)
            }
        };

        let outcome =
            execute_structured(&*self, provider, &user_msg, Self::parse_proposals).await;

        let (proposals, usage) = match outcome {
            Ok(result) => result,
            Err(SearchError::MalformedGeneration { message, .. }) => {
                warn!(message, "planner generation malformed twice, degrading to no new sub-queries");
                (Vec::new(), TokenUsage::default())
            }
            Err(e) => return Err(e),
        };

        let sub_queries = self.sanitize(proposals, issued, step);
        debug!(
            step,
            proposed = sub_queries.len(),
            state = ?self.state,
            "planning round complete"
        );

        self.state = if sub_queries.is_empty() {
            PlannerState::Done
        } else {
            PlannerState::Expanding
        };

        Ok((sub_queries, usage))
    }

    /// Parses the planner's JSON response.
    ///
    /// Accepts the documented wrapper object or a bare array.
    fn parse_proposals(content: &str) -> Result<Vec<ProposedQuery>, SearchError> {
        let json_str = strip_code_fences(content);

        if let Ok(wrapper) = serde_json::from_str::<PlanWrapper>(json_str) {
            return Ok(wrapper.sub_queries);
        }

        serde_json::from_str::<Vec<ProposedQuery>>(json_str).map_err(|e| {
            SearchError::MalformedGeneration {
                message: format!(
                    "failed to parse sub-queries: {e}. Preview: {:?}",
                    truncate_preview(json_str, 200)
                ),
                content: content.to_string(),
            }
        })
    }

    /// Enforces structural determinism on proposals: drops empty entries
    /// and duplicates of already-issued queries, then truncates to the
    /// configured fan-out.
    fn sanitize(
        &self,
        proposals: Vec<ProposedQuery>,
        issued: &[&str],
        step: usize,
    ) -> Vec<SubQuery> {
        let normalized = |s: &str| s.trim().to_lowercase();
        let mut seen: Vec<String> = issued.iter().map(|q| normalized(q)).collect();

        let mut out = Vec::new();
        for proposal in proposals {
            let (text, hint) = match proposal {
                ProposedQuery::Text(text) => (text, None),
                ProposedQuery::Hinted { query, backend } => {
                    (query, backend.as_deref().and_then(BackendKind::parse))
                }
            };
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            let key = normalized(trimmed);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            out.push(SubQuery {
                text: trimmed.to_string(),
                step,
                backend_hint: hint,
            });
            if out.len() == self.fan_out {
                break;
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl Agent for QueryPlanner {
    fn name(&self) -> &'static str {
        "planner"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse};
    use crate::agent::prompt::PLANNER_SYSTEM_PROMPT;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn planner(fan_out: usize) -> QueryPlanner {
        let config = SessionConfig::builder()
            .api_key("test")
            .fan_out(fan_out)
            .build()
            .unwrap_or_else(|_| unreachable!());
        QueryPlanner::new(&config, PLANNER_SYSTEM_PROMPT.to_string())
    }

    /// Provider that returns canned responses in sequence.
    struct SequenceProvider {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    impl SequenceProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for SequenceProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, SearchError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: self.responses.get(idx).cloned().unwrap_or_default(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[test]
    fn test_parse_wrapper_object() {
        let proposals = QueryPlanner::parse_proposals(
            r#"{"sub_queries": ["2024 summer olympics host country", "capital of France"]}"#,
        )
        .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(proposals.len(), 2);
    }

    #[test]
    fn test_parse_bare_array_and_hints() {
        let proposals = QueryPlanner::parse_proposals(
            r#"["plain query", {"query": "hinted query", "backend": "crawl"}]"#,
        )
        .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(proposals.len(), 2);
    }

    #[test]
    fn test_parse_code_fenced() {
        let proposals =
            QueryPlanner::parse_proposals("```json\n{\"sub_queries\": [\"q\"]}\n```")
                .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(proposals.len(), 1);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(QueryPlanner::parse_proposals("not json").is_err());
    }

    #[test]
    fn test_parse_long_multibyte_garbage_is_error_not_panic() {
        // Byte 200 of the diagnostic preview lands inside a character.
        let garbage = "日".repeat(100);
        let result = QueryPlanner::parse_proposals(&garbage);
        assert!(matches!(
            result,
            Err(SearchError::MalformedGeneration { .. })
        ));
    }

    #[test]
    fn test_sanitize_dedups_and_truncates() {
        let p = planner(2);
        let proposals = vec![
            ProposedQuery::Text("  Capital of France ".to_string()),
            ProposedQuery::Text(String::new()),
            ProposedQuery::Text("capital of france".to_string()),
            ProposedQuery::Hinted {
                query: "2024 olympics host".to_string(),
                backend: Some("crawl".to_string()),
            },
            ProposedQuery::Text("one too many".to_string()),
        ];
        let out = p.sanitize(proposals, &["already issued"], 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "Capital of France");
        assert_eq!(out[0].step, 1);
        assert_eq!(out[1].backend_hint, Some(BackendKind::Crawl));
    }

    #[test]
    fn test_sanitize_drops_already_issued() {
        let p = planner(4);
        let proposals = vec![ProposedQuery::Text("Already Issued".to_string())];
        let out = p.sanitize(proposals, &["already issued"], 2);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_initial_round_transitions_to_expanding() {
        let mut p = planner(4);
        let provider = SequenceProvider::new(vec![r#"{"sub_queries": ["a", "b"]}"#]);
        let (queries, _) = p
            .plan(&provider, "question", &[], &[], 0)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(queries.len(), 2);
        assert_eq!(p.state(), PlannerState::Expanding);
    }

    #[tokio::test]
    async fn test_empty_round_transitions_to_done() {
        let mut p = planner(4);
        let provider = SequenceProvider::new(vec![r#"{"sub_queries": []}"#]);
        let (queries, _) = p
            .plan(&provider, "question", &[], &[], 0)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(queries.is_empty());
        assert_eq!(p.state(), PlannerState::Done);
    }

    #[tokio::test]
    async fn test_malformed_twice_degrades_to_done() {
        let mut p = planner(4);
        let provider = SequenceProvider::new(vec!["garbage", "more garbage"]);
        let (queries, _) = p
            .plan(&provider, "question", &[], &[], 0)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(queries.is_empty());
        assert_eq!(p.state(), PlannerState::Done);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_once_recovers() {
        let mut p = planner(4);
        let provider =
            SequenceProvider::new(vec!["garbage", r#"{"sub_queries": ["recovered"]}"#]);
        let (queries, _) = p
            .plan(&provider, "question", &[], &[], 0)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].text, "recovered");
    }

    #[tokio::test]
    async fn test_done_planner_is_inert() {
        let mut p = planner(4);
        p.finish();
        let provider = SequenceProvider::new(vec![r#"{"sub_queries": ["ignored"]}"#]);
        let (queries, _) = p
            .plan(&provider, "question", &[], &[], 3)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(queries.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
