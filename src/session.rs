//! Session model: the question, its reasoning steps, and the final answer.
//!
//! A [`Session`] is created at question submission, mutated only by the
//! orchestrator (single writer), and consumed when the final [`Answer`]
//! is produced. Its step history serializes as an ordered trace for
//! observability sinks.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::message::TokenUsage;
use crate::backend::BackendKind;
use crate::evidence::{EvidenceFragment, EvidenceStore};

/// The original user question. Immutable once a session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Raw question text.
    pub text: String,
    /// Unique session identifier.
    pub session_id: Uuid,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl Question {
    /// Creates a question with a fresh session id.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: Uuid::new_v4(),
            created_at: SystemTime::now(),
        }
    }
}

/// A search query derived from decomposing the original question.
///
/// Created by the planner each planning round; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    /// Query text sent to retrieval backends.
    pub text: String,
    /// Reasoning step index that produced this sub-query (0-based).
    pub step: usize,
    /// Optional hint restricting dispatch to one backend kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_hint: Option<BackendKind>,
}

/// One iteration of the plan → retrieve → aggregate → evaluate loop.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningStep {
    /// Step index (0-based).
    pub index: usize,
    /// Sub-queries issued during this step.
    pub sub_queries: Vec<SubQuery>,
    /// Fragments newly admitted to the store this step.
    pub fragments_admitted: usize,
    /// Fragments that merged into existing entries this step.
    pub fragments_merged: usize,
    /// Backend failures, as `"backend/sub-query: error"` diagnostics.
    /// A failure here never aborted the step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backend_failures: Vec<String>,
}

/// Why the reasoning loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The sufficiency evaluator judged the evidence adequate.
    Sufficient,
    /// The planner proposed no further sub-queries.
    NoNewSubQueries,
    /// The configured iteration budget was exhausted.
    IterationBudget,
    /// The wall-clock deadline expired.
    TimeBudget,
}

impl TerminationReason {
    /// Stable string form used in traces and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sufficient => "sufficient",
            Self::NoNewSubQueries => "no_new_sub_queries",
            Self::IterationBudget => "iteration_budget",
            Self::TimeBudget => "time_budget",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State for one in-flight question.
///
/// Exclusively owns its evidence store and step history. The orchestrator
/// is the only writer; retrieval tasks hand their results back over a join
/// barrier before anything lands here.
#[derive(Debug)]
pub struct Session {
    /// The question being answered.
    pub question: Question,
    /// Completed reasoning steps, in order.
    pub steps: Vec<ReasoningStep>,
    /// Accumulated evidence.
    pub store: EvidenceStore,
    /// Why the loop terminated, once it has.
    pub termination: Option<TerminationReason>,
}

impl Session {
    /// Creates a fresh session for a question.
    #[must_use]
    pub fn new(question: Question) -> Self {
        Self {
            question,
            steps: Vec::new(),
            store: EvidenceStore::new(),
            termination: None,
        }
    }

    /// Number of completed reasoning steps.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.steps.len()
    }

    /// All sub-query texts issued so far, for planner dedup.
    #[must_use]
    pub fn issued_queries(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.sub_queries.iter().map(|q| q.text.as_str()))
            .collect()
    }

    /// Serializable trace of the session for observability sinks.
    #[must_use]
    pub fn trace(&self) -> SessionTrace {
        SessionTrace {
            session_id: self.question.session_id,
            question: self.question.text.clone(),
            steps: self.steps.clone(),
            evidence_count: self.store.len(),
            termination: self.termination,
        }
    }
}

/// Ordered log of a session's steps, suitable for a structured log sink.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTrace {
    /// Session identifier.
    pub session_id: Uuid,
    /// Original question text.
    pub question: String,
    /// Steps in execution order.
    pub steps: Vec<ReasoningStep>,
    /// Distinct evidence entries at trace time.
    pub evidence_count: usize,
    /// Termination reason, if the loop has finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
}

/// A citation attaching one claim to the evidence that supports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Source identifiers (document ids or URLs) backing the claim.
    pub source_ids: Vec<String>,
    /// The claim text this citation supports, when the synthesizer
    /// attributes at sentence granularity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
}

/// The final synthesized answer. Created once, immutable thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Synthesized answer text.
    pub text: String,
    /// Ordered citations; every `source_id` appears in the session's final
    /// evidence snapshot.
    pub citations: Vec<Citation>,
    /// Set when the answer was produced without (or with insufficient)
    /// evidence, or when citation validation had to drop references.
    pub low_confidence: bool,
    /// Claims the synthesizer could not trace to evidence. Populated when
    /// the uncited-claim policy is `Flag`; empty under `Omit`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsupported_claims: Vec<String>,
    /// Why the reasoning loop stopped.
    pub termination: TerminationReason,
    /// Reasoning steps executed.
    pub iterations: usize,
    /// Distinct evidence entries in the final snapshot.
    pub evidence_count: usize,
    /// Fragments cited by the answer, shared from the store.
    #[serde(skip)]
    pub cited_fragments: Vec<Arc<EvidenceFragment>>,
    /// Total tokens consumed across all generative calls.
    pub usage: TokenUsage,
    /// Total wall-clock time for the session.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_ids_are_unique() {
        let a = Question::new("q");
        let b = Question::new("q");
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_issued_queries_flattens_steps() {
        let mut session = Session::new(Question::new("q"));
        session.steps.push(ReasoningStep {
            index: 0,
            sub_queries: vec![SubQuery {
                text: "a".to_string(),
                step: 0,
                backend_hint: None,
            }],
            fragments_admitted: 1,
            fragments_merged: 0,
            backend_failures: Vec::new(),
        });
        session.steps.push(ReasoningStep {
            index: 1,
            sub_queries: vec![SubQuery {
                text: "b".to_string(),
                step: 1,
                backend_hint: None,
            }],
            fragments_admitted: 0,
            fragments_merged: 1,
            backend_failures: Vec::new(),
        });
        assert_eq!(session.issued_queries(), vec!["a", "b"]);
        assert_eq!(session.iterations(), 2);
    }

    #[test]
    fn test_termination_reason_serialization() {
        let json = serde_json::to_string(&TerminationReason::NoNewSubQueries).unwrap_or_default();
        assert_eq!(json, "\"no_new_sub_queries\"");
        assert_eq!(TerminationReason::TimeBudget.to_string(), "time_budget");
    }

    #[test]
    fn test_trace_serializes() {
        let session = Session::new(Question::new("what is the capital of france?"));
        let trace = session.trace();
        let json = serde_json::to_string(&trace).unwrap_or_default();
        assert!(json.contains("capital of france"));
        assert!(json.contains("evidence_count"));
        // No termination yet, so the field is omitted.
        assert!(!json.contains("termination"));
    }
}
