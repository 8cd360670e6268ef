//! Session configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SearchError;

/// Default planner fan-out: sub-queries per planning round.
const DEFAULT_FAN_OUT: usize = 4;
/// Default iteration budget (reasoning steps).
const DEFAULT_MAX_ITERATIONS: usize = 4;
/// Default wall-clock budget for a whole session, in seconds.
const DEFAULT_TIME_BUDGET_SECS: u64 = 120;
/// Default per-backend-call timeout in seconds.
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 20;
/// Default maximum concurrent retrieval calls within one step.
const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Default results requested per sub-query/backend pair.
const DEFAULT_TOP_K: usize = 8;
/// Default planner max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 1024;
/// Default evaluator max tokens.
const DEFAULT_EVALUATOR_MAX_TOKENS: u32 = 512;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 4096;

/// Policy for claims the synthesizer cannot trace to evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UncitedPolicy {
    /// Keep the claims visible on the answer, flagged as unsupported.
    #[default]
    Flag,
    /// Drop unsupported claims from the answer entirely.
    Omit,
}

impl UncitedPolicy {
    /// Parses a policy name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "flag" => Some(Self::Flag),
            "omit" => Some(Self::Omit),
            _ => None,
        }
    }
}

/// Configuration for a question session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the planner.
    pub planner_model: String,
    /// Model for the sufficiency evaluator.
    pub evaluator_model: String,
    /// Model for the synthesizer.
    pub synthesizer_model: String,
    /// Maximum sub-queries per planning round.
    pub fan_out: usize,
    /// Maximum reasoning steps per session.
    pub max_iterations: usize,
    /// Wall-clock budget for the whole session.
    pub time_budget: Duration,
    /// Timeout for a single backend call.
    pub call_timeout: Duration,
    /// Maximum concurrent retrieval calls within one step.
    pub max_concurrency: usize,
    /// Results requested per sub-query/backend pair.
    pub top_k: usize,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for evaluator responses.
    pub evaluator_max_tokens: u32,
    /// Maximum tokens for synthesizer responses.
    pub synthesizer_max_tokens: u32,
    /// Fail with [`SearchError::EmptyEvidence`] instead of producing a
    /// low-confidence answer when the budget runs out with no evidence.
    pub strict_empty_evidence: bool,
    /// How to handle claims not traceable to evidence.
    pub uncited_policy: UncitedPolicy,
    /// Directory containing prompt template files.
    ///
    /// When set, system prompts are loaded from markdown files in this
    /// directory, falling back to compiled-in defaults for missing files.
    pub prompt_dir: Option<PathBuf>,
}

impl SessionConfig {
    /// Creates a new builder for `SessionConfig`.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    planner_model: Option<String>,
    evaluator_model: Option<String>,
    synthesizer_model: Option<String>,
    fan_out: Option<usize>,
    max_iterations: Option<usize>,
    time_budget: Option<Duration>,
    call_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
    top_k: Option<usize>,
    planner_max_tokens: Option<u32>,
    evaluator_max_tokens: Option<u32>,
    synthesizer_max_tokens: Option<u32>,
    strict_empty_evidence: Option<bool>,
    uncited_policy: Option<UncitedPolicy>,
    prompt_dir: Option<PathBuf>,
}

impl SessionConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("DEEPSEARCH_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("DEEPSEARCH_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("DEEPSEARCH_BASE_URL"))
                .ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("DEEPSEARCH_PLANNER_MODEL").ok();
        }
        if self.evaluator_model.is_none() {
            self.evaluator_model = std::env::var("DEEPSEARCH_EVALUATOR_MODEL").ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("DEEPSEARCH_SYNTHESIZER_MODEL").ok();
        }
        if self.fan_out.is_none() {
            self.fan_out = std::env::var("DEEPSEARCH_FAN_OUT")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_iterations.is_none() {
            self.max_iterations = std::env::var("DEEPSEARCH_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.time_budget.is_none() {
            self.time_budget = std::env::var("DEEPSEARCH_TIME_BUDGET_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);
        }
        if self.top_k.is_none() {
            self.top_k = std::env::var("DEEPSEARCH_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("DEEPSEARCH_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the evaluator model.
    #[must_use]
    pub fn evaluator_model(mut self, model: impl Into<String>) -> Self {
        self.evaluator_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the planner fan-out.
    #[must_use]
    pub const fn fan_out(mut self, n: usize) -> Self {
        self.fan_out = Some(n);
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the wall-clock budget for the session.
    #[must_use]
    pub const fn time_budget(mut self, duration: Duration) -> Self {
        self.time_budget = Some(duration);
        self
    }

    /// Sets the per-backend-call timeout.
    #[must_use]
    pub const fn call_timeout(mut self, duration: Duration) -> Self {
        self.call_timeout = Some(duration);
        self
    }

    /// Sets the maximum concurrent retrieval calls per step.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the results requested per sub-query/backend pair.
    #[must_use]
    pub const fn top_k(mut self, n: usize) -> Self {
        self.top_k = Some(n);
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets whether empty evidence hard-fails synthesis.
    #[must_use]
    pub const fn strict_empty_evidence(mut self, strict: bool) -> Self {
        self.strict_empty_evidence = Some(strict);
        self
    }

    /// Sets the uncited-claim policy.
    #[must_use]
    pub const fn uncited_policy(mut self, policy: UncitedPolicy) -> Self {
        self.uncited_policy = Some(policy);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`SessionConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ApiKeyMissing`] if no API key was set, or
    /// [`SearchError::Config`] for out-of-range values.
    pub fn build(self) -> Result<SessionConfig, SearchError> {
        let api_key = self.api_key.ok_or(SearchError::ApiKeyMissing)?;

        let fan_out = self.fan_out.unwrap_or(DEFAULT_FAN_OUT);
        if fan_out == 0 {
            return Err(SearchError::Config {
                message: "fan_out must be at least 1".to_string(),
            });
        }
        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(SearchError::Config {
                message: "max_iterations must be at least 1".to_string(),
            });
        }
        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(SearchError::Config {
                message: "top_k must be at least 1".to_string(),
            });
        }

        Ok(SessionConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            planner_model: self
                .planner_model
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            evaluator_model: self
                .evaluator_model
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| "gpt-4o".to_string()),
            fan_out,
            max_iterations,
            time_budget: self
                .time_budget
                .unwrap_or(Duration::from_secs(DEFAULT_TIME_BUDGET_SECS)),
            call_timeout: self
                .call_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1),
            top_k,
            planner_max_tokens: self.planner_max_tokens.unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            evaluator_max_tokens: self
                .evaluator_max_tokens
                .unwrap_or(DEFAULT_EVALUATOR_MAX_TOKENS),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZER_MAX_TOKENS),
            strict_empty_evidence: self.strict_empty_evidence.unwrap_or(false),
            uncited_policy: self.uncited_policy.unwrap_or_default(),
            prompt_dir: self.prompt_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SessionConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.fan_out, DEFAULT_FAN_OUT);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.uncited_policy, UncitedPolicy::Flag);
        assert!(!config.strict_empty_evidence);
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = SessionConfig::builder().build();
        assert!(matches!(result, Err(SearchError::ApiKeyMissing)));
    }

    #[test]
    fn test_builder_rejects_zero_budgets() {
        let result = SessionConfig::builder()
            .api_key("key")
            .max_iterations(0)
            .build();
        assert!(matches!(result, Err(SearchError::Config { .. })));

        let result = SessionConfig::builder().api_key("key").fan_out(0).build();
        assert!(matches!(result, Err(SearchError::Config { .. })));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = SessionConfig::builder()
            .api_key("key")
            .planner_model("gpt-4o")
            .fan_out(2)
            .max_iterations(7)
            .time_budget(Duration::from_secs(30))
            .strict_empty_evidence(true)
            .uncited_policy(UncitedPolicy::Omit)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.planner_model, "gpt-4o");
        assert_eq!(config.fan_out, 2);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.time_budget, Duration::from_secs(30));
        assert!(config.strict_empty_evidence);
        assert_eq!(config.uncited_policy, UncitedPolicy::Omit);
    }

    #[test]
    fn test_uncited_policy_parse() {
        assert_eq!(UncitedPolicy::parse("flag"), Some(UncitedPolicy::Flag));
        assert_eq!(UncitedPolicy::parse("OMIT"), Some(UncitedPolicy::Omit));
        assert_eq!(UncitedPolicy::parse("drop"), None);
    }
}
