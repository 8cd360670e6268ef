//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls, keeping the planner, evaluator, and
//! synthesizer decoupled from any particular vendor.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::SearchError;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls, retries)
/// for a specific provider while presenting a uniform interface to the
/// planner, evaluator, and synthesizer.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiRequest`] on API failures or timeouts.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, SearchError>;
}
