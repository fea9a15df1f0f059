//! Research error types

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::state::Phase;
use crate::llm::LlmError;
use crate::search::SearchError;

/// The four processing stages of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    GenerateQueries,
    Research,
    Reflect,
    FinalAnswer,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::GenerateQueries => "generate-queries",
            StageKind::Research => "research",
            StageKind::Reflect => "reflect",
            StageKind::FinalAnswer => "final-answer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Network, LLM or search failure, including timeouts
    CollaboratorInvocation,
    /// Collaborator output did not parse into the expected shape
    SchemaValidation,
    /// A stage produced nothing where at least one item is required
    EmptyResult,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CollaboratorInvocation => "collaborator-invocation",
            ErrorKind::SchemaValidation => "schema-validation",
            ErrorKind::EmptyResult => "empty-result",
        }
    }
}

/// Failure of a single stage invocation
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage}: collaborator call failed: {message}")]
    Invocation {
        stage: StageKind,
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },

    #[error("{stage}: output does not match the expected shape: {message}")]
    SchemaValidation { stage: StageKind, message: String },

    #[error("{stage}: no usable {what}")]
    EmptyResult { stage: StageKind, what: &'static str },
}

impl StageError {
    /// Map an LLM failure onto the stage taxonomy
    pub fn from_llm(stage: StageKind, err: LlmError) -> Self {
        if err.is_schema_violation() {
            return StageError::SchemaValidation {
                stage,
                message: err.to_string(),
            };
        }
        StageError::Invocation {
            stage,
            retryable: err.is_retryable(),
            retry_after: err.retry_after(),
            message: err.to_string(),
        }
    }

    /// Map a search failure onto the stage taxonomy
    pub fn from_search(stage: StageKind, err: SearchError) -> Self {
        StageError::Invocation {
            stage,
            retryable: err.is_retryable(),
            retry_after: err.retry_after(),
            message: err.to_string(),
        }
    }

    /// A prompt that cannot be rendered will not render on retry either
    pub fn prompt(stage: StageKind, err: eyre::Report) -> Self {
        StageError::Invocation {
            stage,
            message: format!("prompt rendering failed: {}", err),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn schema(stage: StageKind, message: impl Into<String>) -> Self {
        StageError::SchemaValidation {
            stage,
            message: message.into(),
        }
    }

    pub fn empty(stage: StageKind, what: &'static str) -> Self {
        StageError::EmptyResult { stage, what }
    }

    pub fn stage(&self) -> StageKind {
        match self {
            StageError::Invocation { stage, .. }
            | StageError::SchemaValidation { stage, .. }
            | StageError::EmptyResult { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Invocation { .. } => ErrorKind::CollaboratorInvocation,
            StageError::SchemaValidation { .. } => ErrorKind::SchemaValidation,
            StageError::EmptyResult { .. } => ErrorKind::EmptyResult,
        }
    }

    /// Invocation failures retry when the collaborator says so, malformed
    /// output always retries, empty output never does
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::Invocation { retryable, .. } => *retryable,
            StageError::SchemaValidation { .. } => true,
            StageError::EmptyResult { .. } => false,
        }
    }

    /// Provider-requested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            StageError::Invocation { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failure of a whole research run
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Final answer is already set")]
    FinalAnswerAlreadySet,

    #[error("Run cancelled before {phase}")]
    Cancelled { phase: Phase },

    #[error("Run timed out after {timeout:?} before {phase}")]
    TimedOut { timeout: Duration, phase: Phase },
}

impl ResearchError {
    /// Stable identifier used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ResearchError::EmptyQuestion => "empty-question",
            ResearchError::Stage(e) => e.kind().as_str(),
            ResearchError::FinalAnswerAlreadySet => "internal",
            ResearchError::Cancelled { .. } => "cancelled",
            ResearchError::TimedOut { .. } => "timed-out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_llm_schema_violation() {
        let err = StageError::from_llm(
            StageKind::Reflect,
            LlmError::SchemaValidation("missing field `reflection`".to_string()),
        );
        assert_eq!(err.kind(), ErrorKind::SchemaValidation);
        assert_eq!(err.stage(), StageKind::Reflect);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_llm_rate_limit_keeps_retry_after() {
        let err = StageError::from_llm(
            StageKind::GenerateQueries,
            LlmError::RateLimited {
                retry_after: Duration::from_secs(7),
            },
        );
        assert_eq!(err.kind(), ErrorKind::CollaboratorInvocation);
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_missing_credentials_not_retryable() {
        let err = StageError::from_llm(
            StageKind::FinalAnswer,
            LlmError::MissingCredentials("GOOGLE_API_KEY".to_string()),
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_result_never_retries() {
        let err = StageError::empty(StageKind::GenerateQueries, "search queries");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "generate-queries: no usable search queries");
    }

    #[test]
    fn test_research_error_kinds() {
        assert_eq!(ResearchError::EmptyQuestion.kind(), "empty-question");
        assert_eq!(
            ResearchError::from(StageError::schema(StageKind::FinalAnswer, "answer is empty")).kind(),
            "schema-validation"
        );
        assert_eq!(
            ResearchError::TimedOut {
                timeout: Duration::from_secs(1),
                phase: Phase::Reflect
            }
            .kind(),
            "timed-out"
        );
    }
}
