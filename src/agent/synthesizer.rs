//! Answer synthesizer.
//!
//! Composes the final answer from the evidence snapshot and attaches
//! citations. Citations are validated against the snapshot: a source id
//! the model invented never survives into the answer. What happens to
//! the claim behind a dropped citation is governed by
//! [`UncitedPolicy`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::config::{SessionConfig, UncitedPolicy};
use super::message::TokenUsage;
use super::prompt::build_synthesizer_prompt;
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured, strip_code_fences, truncate_preview};
use crate::error::SearchError;
use crate::evidence::EvidenceFragment;
use crate::session::Citation;

/// Synthesizer output before the orchestrator folds in session metadata.
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    /// Answer text.
    pub text: String,
    /// Citations that survived validation.
    pub citations: Vec<Citation>,
    /// Claims with no surviving evidence, kept under the `Flag` policy.
    pub unsupported_claims: Vec<String>,
    /// Whether the answer should be flagged low-confidence.
    pub low_confidence: bool,
    /// Snapshot fragments referenced by the surviving citations.
    pub cited_fragments: Vec<Arc<EvidenceFragment>>,
    /// Tokens consumed by synthesis.
    pub usage: TokenUsage,
}

/// One citation in the generation schema.
#[derive(Debug, Deserialize)]
struct RawCitation {
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    claim: Option<String>,
}

/// JSON schema the synthesizer prompt requests.
#[derive(Debug, Deserialize)]
struct RawSynthesis {
    answer: String,
    #[serde(default)]
    citations: Vec<RawCitation>,
    #[serde(default)]
    unsupported_claims: Vec<String>,
}

/// Agent that writes the final cited answer.
pub struct AnswerSynthesizer {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    strict_empty_evidence: bool,
    uncited_policy: UncitedPolicy,
}

impl AnswerSynthesizer {
    /// Creates a synthesizer with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &SessionConfig, system_prompt: String) -> Self {
        Self {
            model: config.synthesizer_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            system_prompt,
            strict_empty_evidence: config.strict_empty_evidence,
            uncited_policy: config.uncited_policy,
        }
    }

    /// Synthesizes an answer from the evidence snapshot.
    ///
    /// With an empty snapshot this returns a canned low-confidence answer
    /// without consulting the model, or [`SearchError::EmptyEvidence`] in
    /// strict mode. A generation that stays malformed after one retry
    /// degrades to the raw model text as an uncited low-confidence answer.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyEvidence`] in strict mode with no
    /// evidence, or [`SearchError::ApiRequest`] when the provider fails.
    pub async fn synthesize(
        &self,
        provider: &dyn LlmProvider,
        question: &str,
        snapshot: &[Arc<EvidenceFragment>],
    ) -> Result<SynthesisOutput, SearchError> {
        if snapshot.is_empty() {
            if self.strict_empty_evidence {
                return Err(SearchError::EmptyEvidence);
            }
            warn!("synthesizing with no evidence, answer flagged low-confidence");
            return Ok(SynthesisOutput {
                text: format!(
                    "No supporting evidence was retrieved for this question: {question}"
                ),
                citations: Vec::new(),
                unsupported_claims: Vec::new(),
                low_confidence: true,
                cited_fragments: Vec::new(),
                usage: TokenUsage::default(),
            });
        }

        let user_msg = build_synthesizer_prompt(question, snapshot);
        let outcome = execute_structured(self, provider, &user_msg, Self::parse_synthesis).await;

        let (raw, usage) = match outcome {
            Ok(result) => result,
            Err(SearchError::MalformedGeneration { message, content }) => {
                warn!(message, "synthesizer generation malformed twice, degrading to uncited text");
                return Ok(SynthesisOutput {
                    text: content,
                    citations: Vec::new(),
                    unsupported_claims: Vec::new(),
                    low_confidence: true,
                    cited_fragments: Vec::new(),
                    usage: TokenUsage::default(),
                });
            }
            Err(e) => return Err(e),
        };

        Ok(self.validate(raw, snapshot, usage))
    }

    /// Validates citations against the snapshot and applies the
    /// uncited-claim policy.
    fn validate(
        &self,
        raw: RawSynthesis,
        snapshot: &[Arc<EvidenceFragment>],
        usage: TokenUsage,
    ) -> SynthesisOutput {
        let known: HashSet<&str> = snapshot.iter().map(|f| f.source_id.as_str()).collect();

        let mut citations = Vec::new();
        let mut unsupported: Vec<String> = raw.unsupported_claims;
        let mut dropped_sources = false;
        let mut cited_sources: HashSet<String> = HashSet::new();

        for raw_citation in raw.citations {
            let (valid, invalid): (Vec<String>, Vec<String>) = raw_citation
                .sources
                .into_iter()
                .partition(|s| known.contains(s.as_str()));

            if !invalid.is_empty() {
                dropped_sources = true;
                debug!(invalid = ?invalid, "dropped citation sources not present in evidence");
            }

            if valid.is_empty() {
                match self.uncited_policy {
                    UncitedPolicy::Flag => {
                        if let Some(claim) = raw_citation.claim {
                            unsupported.push(claim);
                        }
                    }
                    UncitedPolicy::Omit => {}
                }
                continue;
            }

            cited_sources.extend(valid.iter().cloned());
            citations.push(Citation {
                source_ids: valid,
                claim: raw_citation.claim,
            });
        }

        if self.uncited_policy == UncitedPolicy::Omit {
            unsupported.clear();
        }

        let cited_fragments = snapshot
            .iter()
            .filter(|f| cited_sources.contains(&f.source_id))
            .cloned()
            .collect();

        let low_confidence = citations.is_empty() || dropped_sources || !unsupported.is_empty();

        SynthesisOutput {
            text: raw.answer,
            citations,
            unsupported_claims: unsupported,
            low_confidence,
            cited_fragments,
            usage,
        }
    }

    /// Parses the synthesizer's JSON response.
    fn parse_synthesis(content: &str) -> Result<RawSynthesis, SearchError> {
        let json_str = strip_code_fences(content);
        serde_json::from_str(json_str).map_err(|e| SearchError::MalformedGeneration {
            message: format!(
                "failed to parse synthesis: {e}. Preview: {:?}",
                truncate_preview(json_str, 200)
            ),
            content: content.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Agent for AnswerSynthesizer {
    fn name(&self) -> &'static str {
        "synthesizer"
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
    use crate::agent::prompt::SYNTHESIZER_SYSTEM_PROMPT;
    use crate::backend::BackendKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    fn synthesizer(strict: bool, policy: UncitedPolicy) -> AnswerSynthesizer {
        let config = SessionConfig::builder()
            .api_key("test")
            .strict_empty_evidence(strict)
            .uncited_policy(policy)
            .build()
            .unwrap_or_else(|_| unreachable!());
        AnswerSynthesizer::new(&config, SYNTHESIZER_SYSTEM_PROMPT.to_string())
    }

    fn fragment(text: &str, source_id: &str) -> Arc<EvidenceFragment> {
        Arc::new(EvidenceFragment {
            text: text.to_string(),
            source_id: source_id.to_string(),
            backend: BackendKind::Vector,
            raw_score: 0.8,
            score: 0.8,
            offset: None,
            retrieved_at: SystemTime::now(),
        })
    }

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

    #[tokio::test]
    async fn test_empty_evidence_low_confidence() {
        let provider = SequenceProvider::new(vec![]);
        let out = synthesizer(false, UncitedPolicy::Flag)
            .synthesize(&provider, "question", &[])
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(out.low_confidence);
        assert!(out.citations.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_evidence_strict_fails() {
        let provider = SequenceProvider::new(vec![]);
        let result = synthesizer(true, UncitedPolicy::Flag)
            .synthesize(&provider, "question", &[])
            .await;
        assert!(matches!(result, Err(SearchError::EmptyEvidence)));
    }

    #[tokio::test]
    async fn test_valid_citations_survive() {
        let response = r#"{"answer": "Paris.", "citations": [{"sources": ["doc-1"], "claim": "Paris is the capital."}], "unsupported_claims": []}"#;
        let provider = SequenceProvider::new(vec![response]);
        let snapshot = vec![fragment("Paris is the capital of France.", "doc-1")];
        let out = synthesizer(false, UncitedPolicy::Flag)
            .synthesize(&provider, "question", &snapshot)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(!out.low_confidence);
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].source_ids, vec!["doc-1"]);
        assert_eq!(out.cited_fragments.len(), 1);
    }

    #[tokio::test]
    async fn test_invented_source_dropped_and_flagged() {
        let response = r#"{"answer": "Paris.", "citations": [{"sources": ["made-up"], "claim": "An uncheckable claim."}]}"#;
        let provider = SequenceProvider::new(vec![response]);
        let snapshot = vec![fragment("Paris is the capital of France.", "doc-1")];
        let out = synthesizer(false, UncitedPolicy::Flag)
            .synthesize(&provider, "question", &snapshot)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(out.low_confidence);
        assert!(out.citations.is_empty());
        assert_eq!(out.unsupported_claims, vec!["An uncheckable claim."]);
    }

    #[tokio::test]
    async fn test_omit_policy_drops_unsupported() {
        let response = r#"{"answer": "Paris.", "citations": [{"sources": ["made-up"], "claim": "Gone."}], "unsupported_claims": ["Also gone."]}"#;
        let provider = SequenceProvider::new(vec![response]);
        let snapshot = vec![fragment("Paris is the capital of France.", "doc-1")];
        let out = synthesizer(false, UncitedPolicy::Omit)
            .synthesize(&provider, "question", &snapshot)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(out.unsupported_claims.is_empty());
        assert!(out.citations.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_sources_keep_valid_half() {
        let response = r#"{"answer": "Paris.", "citations": [{"sources": ["doc-1", "bogus"], "claim": "Paris."}]}"#;
        let provider = SequenceProvider::new(vec![response]);
        let snapshot = vec![fragment("Paris is the capital of France.", "doc-1")];
        let out = synthesizer(false, UncitedPolicy::Flag)
            .synthesize(&provider, "question", &snapshot)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].source_ids, vec!["doc-1"]);
        // A dropped source still marks the answer low-confidence.
        assert!(out.low_confidence);
    }

    #[test]
    fn test_parse_long_multibyte_garbage_is_error_not_panic() {
        let garbage = "引".repeat(100);
        let result = AnswerSynthesizer::parse_synthesis(&garbage);
        assert!(matches!(
            result,
            Err(SearchError::MalformedGeneration { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_twice_degrades_to_raw_text() {
        let provider = SequenceProvider::new(vec!["not json at all", "still not json"]);
        let snapshot = vec![fragment("text", "doc-1")];
        let out = synthesizer(false, UncitedPolicy::Flag)
            .synthesize(&provider, "question", &snapshot)
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(out.low_confidence);
        assert_eq!(out.text, "still not json");
        assert!(out.citations.is_empty());
    }
}
