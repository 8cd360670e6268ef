//! Agent trait definition.
//!
//! The planner, evaluator, and synthesizer all implement this trait,
//! which provides a uniform execution path against an [`LlmProvider`].

use async_trait::async_trait;
use tracing::warn;

use super::message::{ChatRequest, ChatResponse, TokenUsage, system_message, user_message};
use super::provider::LlmProvider;
use crate::error::SearchError;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all generative agents in the pipeline.
///
/// Agents encapsulate a specific role (planning, sufficiency judgment,
/// synthesis) with a fixed system prompt and model configuration.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        true
    }

    /// Sampling temperature (0.0 = deterministic).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Executes the agent with the given user message.
    ///
    /// Builds a [`ChatRequest`] from the agent's configuration and
    /// delegates to the provider.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiRequest`] on API failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, SearchError> {
        let request = ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
        };

        let response: ChatResponse = provider.chat(&request).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}

/// Executes an agent whose output must conform to a schema, retrying the
/// generation once on a malformed response.
///
/// Generation is model-driven and non-deterministic in content, but this
/// helper makes it deterministic in structure: the caller always receives
/// either a value that parsed cleanly or a final
/// [`SearchError::MalformedGeneration`] to degrade from — never a partial
/// result. Token usage from both attempts is accumulated.
///
/// # Errors
///
/// Propagates API errors immediately; returns the second parse failure
/// when both attempts produce malformed output.
pub async fn execute_structured<T, F>(
    agent: &dyn Agent,
    provider: &dyn LlmProvider,
    user_msg: &str,
    parse: F,
) -> Result<(T, TokenUsage), SearchError>
where
    F: Fn(&str) -> Result<T, SearchError>,
    T: Send,
{
    let mut usage = TokenUsage::default();

    let first = agent.execute(provider, user_msg).await?;
    usage.absorb(first.usage);
    match parse(&first.content) {
        Ok(value) => return Ok((value, usage)),
        Err(e) => {
            warn!(agent = agent.name(), error = %e, "malformed generation, retrying once");
        }
    }

    let second = agent.execute(provider, user_msg).await?;
    usage.absorb(second.usage);
    let value = parse(&second.content)?;
    Ok((value, usage))
}

/// Truncates a response for an error diagnostic without splitting a
/// multibyte character.
#[must_use]
pub fn truncate_preview(content: &str, max_bytes: usize) -> &str {
    if content.len() <= max_bytes {
        return content;
    }
    let mut end = max_bytes;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// Strips markdown code fences around a JSON payload.
///
/// Models in JSON mode still occasionally wrap output in ```` ```json ````
/// fences; parsers tolerate that here rather than failing the generation.
#[must_use]
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}
