//! Session orchestrator: the plan → retrieve → aggregate → evaluate loop.
//!
//! The orchestrator owns the session and is its single writer. Each step
//! it asks the planner for sub-queries, fans them out across every
//! eligible backend concurrently, waits at a join barrier, folds the
//! settled results into the evidence store, and asks the evaluator
//! whether to stop. Backend failures surface as step diagnostics, never
//! as session errors. When the loop terminates — sufficiency, planner
//! exhaustion, or a budget — the synthesizer writes the cited answer.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::evaluator::SufficiencyEvaluator;
use super::message::TokenUsage;
use super::planner::QueryPlanner;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::synthesizer::AnswerSynthesizer;
use crate::backend::{RetrievalBackend, normalize_scores};
use crate::error::{BackendError, SearchError};
use crate::session::{
    Answer, Question, ReasoningStep, Session, SessionTrace, SubQuery, TerminationReason,
};

/// What one step's settled retrieval calls produced.
struct StepOutcome {
    admitted: usize,
    merged: usize,
    failures: Vec<String>,
    deadline_hit: bool,
}

/// Drives one question session end to end.
pub struct SessionOrchestrator {
    config: SessionConfig,
    provider: Box<dyn LlmProvider>,
    backends: Vec<Arc<dyn RetrievalBackend>>,
    prompts: PromptSet,
}

impl SessionOrchestrator {
    /// Creates an orchestrator over the given provider and backends.
    ///
    /// System prompts are loaded from the configured prompt directory,
    /// falling back to compiled-in defaults.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        provider: Box<dyn LlmProvider>,
        backends: Vec<Arc<dyn RetrievalBackend>>,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            config,
            provider,
            backends,
            prompts,
        }
    }

    /// Runs the reasoning loop for one question and synthesizes the answer.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiRequest`] when a generative call fails
    /// unrecoverably, or [`SearchError::EmptyEvidence`] in strict mode
    /// when the budget runs out with nothing retrieved. Backend failures
    /// are absorbed as step diagnostics and never returned here.
    pub async fn run(&self, question: Question) -> Result<(Answer, SessionTrace), SearchError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.time_budget;

        let mut session = Session::new(question);
        let mut usage = TokenUsage::default();
        let mut planner = QueryPlanner::new(&self.config, self.prompts.planner.clone());
        let evaluator = SufficiencyEvaluator::new(&self.config, self.prompts.evaluator.clone());
        let synthesizer = AnswerSynthesizer::new(&self.config, self.prompts.synthesizer.clone());

        info!(
            session_id = %session.question.session_id,
            max_iterations = self.config.max_iterations,
            backends = self.backends.len(),
            "session started"
        );

        let mut termination = None;

        for step in 0..self.config.max_iterations {
            if tokio::time::Instant::now() >= deadline {
                termination = Some(TerminationReason::TimeBudget);
                break;
            }

            let snapshot = session.store.snapshot();
            let issued = session.issued_queries();
            let (sub_queries, plan_usage) = planner
                .plan(
                    self.provider.as_ref(),
                    &session.question.text,
                    &snapshot,
                    &issued,
                    step,
                )
                .await?;
            usage.absorb(plan_usage);

            if sub_queries.is_empty() {
                termination = Some(TerminationReason::NoNewSubQueries);
                break;
            }

            let mut outcome = StepOutcome {
                admitted: 0,
                merged: 0,
                failures: Vec::new(),
                deadline_hit: false,
            };
            self.retrieve_step(&sub_queries, deadline, &mut session, &mut outcome)
                .await;

            debug!(
                step,
                sub_queries = sub_queries.len(),
                admitted = outcome.admitted,
                merged = outcome.merged,
                failures = outcome.failures.len(),
                "retrieval step settled"
            );

            session.steps.push(ReasoningStep {
                index: step,
                sub_queries,
                fragments_admitted: outcome.admitted,
                fragments_merged: outcome.merged,
                backend_failures: outcome.failures,
            });

            if outcome.deadline_hit || tokio::time::Instant::now() >= deadline {
                termination = Some(TerminationReason::TimeBudget);
                break;
            }

            let snapshot = session.store.snapshot();
            let (verdict, eval_usage) = evaluator
                .evaluate(self.provider.as_ref(), &session.question.text, &snapshot)
                .await?;
            usage.absorb(eval_usage);

            if verdict.is_sufficient() {
                termination = Some(TerminationReason::Sufficient);
                break;
            }
        }

        let termination = termination.unwrap_or(TerminationReason::IterationBudget);
        session.termination = Some(termination);

        info!(
            session_id = %session.question.session_id,
            termination = %termination,
            iterations = session.iterations(),
            evidence = session.store.len(),
            "reasoning loop terminated"
        );

        let snapshot = session.store.snapshot();
        let synthesis = synthesizer
            .synthesize(self.provider.as_ref(), &session.question.text, &snapshot)
            .await?;
        usage.absorb(synthesis.usage);

        let answer = Answer {
            text: synthesis.text,
            citations: synthesis.citations,
            low_confidence: synthesis.low_confidence,
            unsupported_claims: synthesis.unsupported_claims,
            termination,
            iterations: session.iterations(),
            evidence_count: session.store.len(),
            cited_fragments: synthesis.cited_fragments,
            usage,
            elapsed: started.elapsed(),
        };

        Ok((answer, session.trace()))
    }

    /// Fans one step's sub-queries out across every eligible backend,
    /// waits at the join barrier, then folds results into the store.
    ///
    /// Concurrency is capped by the configured semaphore and each call
    /// carries its own timeout. The store is written only here, after the
    /// barrier, so retrieval tasks never share mutable state. If the
    /// session deadline expires before the barrier clears, in-flight
    /// calls are aborted and their results discarded.
    async fn retrieve_step(
        &self,
        sub_queries: &[SubQuery],
        deadline: tokio::time::Instant,
        session: &mut Session,
        outcome: &mut StepOutcome,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks: Vec<JoinHandle<Result<Vec<crate::evidence::EvidenceFragment>, String>>> =
            Vec::new();

        for sub_query in sub_queries {
            for backend in &self.backends {
                if let Some(hint) = sub_query.backend_hint
                    && hint != backend.kind()
                {
                    continue;
                }
                let semaphore = Arc::clone(&semaphore);
                let backend = Arc::clone(backend);
                let query = sub_query.clone();
                let limit = self.config.top_k;
                let call_timeout = self.config.call_timeout;

                tasks.push(tokio::spawn(async move {
                    let label = format!("{}/{}", backend.name(), query.text);
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Err(format!("{label}: concurrency limiter closed"));
                    };
                    match tokio::time::timeout(call_timeout, backend.search(&query, limit)).await
                    {
                        Ok(Ok(mut fragments)) => {
                            normalize_scores(&mut fragments);
                            Ok(fragments)
                        }
                        Ok(Err(e)) => Err(format!("{label}: {e}")),
                        Err(_) => Err(format!(
                            "{label}: {}",
                            BackendError::Timeout {
                                timeout_secs: call_timeout.as_secs()
                            }
                        )),
                    }
                }));
            }
        }

        let abort_handles: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let barrier = futures_util::future::join_all(tasks);

        match tokio::time::timeout_at(deadline, barrier).await {
            Ok(results) => {
                for joined in results {
                    match joined {
                        Ok(Ok(fragments)) => {
                            for fragment in fragments {
                                if session.store.add(fragment) {
                                    outcome.admitted += 1;
                                } else {
                                    outcome.merged += 1;
                                }
                            }
                        }
                        Ok(Err(diagnostic)) => {
                            warn!(diagnostic, "backend call failed, continuing without it");
                            outcome.failures.push(diagnostic);
                        }
                        Err(join_error) => {
                            warn!(%join_error, "retrieval task aborted");
                            outcome.failures.push(format!("task failed: {join_error}"));
                        }
                    }
                }
            }
            Err(_) => {
                for handle in abort_handles {
                    handle.abort();
                }
                warn!("session deadline expired mid-step, discarding in-flight retrievals");
                outcome.deadline_hit = true;
            }
        }
    }
}
