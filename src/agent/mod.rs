//! Agent pipeline: planning, retrieval orchestration, evaluation, synthesis.
//!
//! ```text
//! Question ──▶ QueryPlanner ──▶ sub-queries
//!                   ▲               │
//!                   │               ▼
//!             SessionOrchestrator ──▶ RetrievalBackend fan-out
//!                   │               │        (concurrent, capped)
//!                   │               ▼
//!                   │         EvidenceStore (dedup + merge)
//!                   │               │
//!                   │               ▼
//!                   └── SufficiencyEvaluator
//!                                   │ sufficient / budget / exhausted
//!                                   ▼
//!                          AnswerSynthesizer ──▶ cited Answer
//! ```
//!
//! All generative roles implement the [`Agent`] trait and run against a
//! pluggable [`LlmProvider`].

pub mod client;
pub mod config;
pub mod evaluator;
pub mod message;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod synthesizer;
pub mod traits;

pub use client::create_provider;
pub use config::{SessionConfig, SessionConfigBuilder, UncitedPolicy};
pub use evaluator::{Sufficiency, SufficiencyEvaluator};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::SessionOrchestrator;
pub use planner::{PlannerState, QueryPlanner};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use synthesizer::{AnswerSynthesizer, SynthesisOutput};
pub use traits::{Agent, AgentResponse};
