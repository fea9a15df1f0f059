//! LLM error types

use std::time::Duration;
use thiserror::Error;

use super::transport::is_retryable_status;

/// Errors from the text-generation collaborator
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The provider refused to answer (safety filters, blocked prompt)
    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Output does not match the expected shape: {0}")]
    SchemaValidation(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Unknown LLM provider '{0}' (supported: gemini, openai)")]
    UnknownProvider(String),
}

impl LlmError {
    /// Check if this is a structured-output validation failure
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, LlmError::SchemaValidation(_))
    }

    /// Whether the same request may succeed if sent again
    ///
    /// Malformed structured output counts: models do not fail the same way
    /// twice in a row.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::SchemaValidation(_) => true,
            LlmError::ApiError { status, .. } => is_retryable_status(*status),
            LlmError::InvalidResponse(_)
            | LlmError::Blocked(_)
            | LlmError::MissingCredentials(_)
            | LlmError::UnknownProvider(_) => false,
        }
    }

    /// Provider-requested wait, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
