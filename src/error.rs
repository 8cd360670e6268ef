//! Error types for deepsearch-rs.
//!
//! Two layers: [`BackendError`] covers a single retrieval call and is always
//! recoverable (the orchestrator degrades it to zero evidence), while
//! [`SearchError`] covers everything the session as a whole can surface to
//! a caller.

use thiserror::Error;

/// Failure of a single retrieval backend call.
///
/// Never fatal to a session: the orchestrator records the failure on the
/// reasoning step and continues with the other sub-query/backend pairs.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached or returned a server error.
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Description of the transport or service failure.
        message: String,
    },

    /// The per-call timeout elapsed before the backend responded.
    #[error("backend timed out after {timeout_secs}s")]
    Timeout {
        /// Timeout that was enforced, in seconds.
        timeout_secs: u64,
    },

    /// The backend rejected the request (bad query, unknown collection).
    #[error("backend rejected request: {message}")]
    Rejected {
        /// Backend-provided rejection reason.
        message: String,
    },
}

/// Errors surfaced by the session pipeline.
#[derive(Debug, Error)]
pub enum SearchError {
    /// No API key was provided via config or environment.
    #[error("no API key found. Set OPENAI_API_KEY or DEEPSEARCH_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name has no registered implementation.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// A generative API request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error description.
        message: String,
    },

    /// A generative response did not conform to the expected schema,
    /// even after the single retry the pipeline allows.
    #[error("malformed generation: {message}")]
    MalformedGeneration {
        /// Parse failure description with a response preview.
        message: String,
        /// The raw response content for diagnostics.
        content: String,
    },

    /// Synthesis was requested with an empty evidence snapshot while the
    /// session is configured to hard-fail instead of degrading.
    #[error("cannot synthesize: evidence snapshot is empty")]
    EmptyEvidence,

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// Which value and why.
        message: String,
    },
}
