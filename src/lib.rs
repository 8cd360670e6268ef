//! deepsearch-rs: agentic multi-hop retrieval and question answering.
//!
//! Answers complex questions that no single search can satisfy. A
//! planner decomposes the question into sub-queries, an orchestrator
//! fans them out concurrently across retrieval backends (vector search
//! and live crawl), evidence is deduplicated and merged with provenance
//! into a per-session store, and an evaluator decides after each round
//! whether to keep digging. When the loop stops — the evidence suffices,
//! the planner runs dry, or a budget expires — a synthesizer writes the
//! final answer with citations validated against the gathered evidence.
//!
//! ```text
//! Question
//!    │
//!    ▼
//! ┌─────────────────── SessionOrchestrator ───────────────────┐
//! │                                                           │
//! │  QueryPlanner ──▶ sub-queries ──▶ backend fan-out         │
//! │       ▲                           (vector, crawl)         │
//! │       │                                │                  │
//! │       │                                ▼                  │
//! │       │                          EvidenceStore            │
//! │       │                         (dedup + merge)           │
//! │       │                                │                  │
//! │       └──── SufficiencyEvaluator ◀─────┘                  │
//! │                      │                                    │
//! └──────────────────────┼────────────────────────────────────┘
//!                        ▼
//!               AnswerSynthesizer ──▶ cited Answer
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deepsearch_rs::agent::{SessionConfig, SessionOrchestrator, create_provider};
//! use deepsearch_rs::backend::{RetrievalBackend, VectorBackend};
//! use deepsearch_rs::session::Question;
//!
//! # async fn run() -> Result<(), deepsearch_rs::error::SearchError> {
//! let config = SessionConfig::from_env()?;
//! let provider = create_provider(&config)?;
//! let backends: Vec<Arc<dyn RetrievalBackend>> = vec![Arc::new(VectorBackend::new(
//!     "http://localhost:8000/search",
//!     None,
//! ))];
//!
//! let orchestrator = SessionOrchestrator::new(config, provider, backends);
//! let (answer, _trace) = orchestrator
//!     .run(Question::new(
//!         "What is the capital of the country that hosted the 2024 Summer Olympics?",
//!     ))
//!     .await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod backend;
pub mod cli;
pub mod error;
pub mod evidence;
pub mod session;

pub use agent::{SessionConfig, SessionOrchestrator};
pub use backend::{BackendKind, RetrievalBackend};
pub use error::{BackendError, SearchError};
pub use evidence::{EvidenceFragment, EvidenceStore};
pub use session::{Answer, Question, Session, TerminationReason};
