//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use crate::agent::config::SessionConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::SearchError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default) — OpenAI-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`SearchError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &SessionConfig) -> Result<Box<dyn LlmProvider>, SearchError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(config))),
        other => Err(SearchError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
