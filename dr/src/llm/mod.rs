//! LLM Client module for DeepResearch
//!
//! Provides the text-generation collaborator used by the research stages.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod gemini;
mod openai;
pub mod structured;
mod transport;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use structured::complete_json;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "gemini" and "openai" providers.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "gemini" => {
            debug!("create_client: creating Gemini client");
            Ok(Arc::new(GeminiClient::from_config(config)?))
        }
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::UnknownProvider(other.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "llama".to_string(),
            ..Default::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("llama"));
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key_env: "DR_TEST_MISSING_LLM_KEY".to_string(),
            ..Default::default()
        };
        unsafe {
            std::env::remove_var("DR_TEST_MISSING_LLM_KEY");
        }
        let err = create_client(&config).err().unwrap();
        assert!(matches!(err, LlmError::MissingCredentials(_)));
    }

    #[test]
    #[serial]
    fn test_create_gemini_client() {
        let config = LlmConfig {
            api_key_env: "DR_TEST_GEMINI_KEY".to_string(),
            model: "models/gemini-1.5-flash".to_string(),
            ..Default::default()
        };
        unsafe {
            std::env::set_var("DR_TEST_GEMINI_KEY", "k");
        }
        let client = create_client(&config).unwrap();
        assert_eq!(client.model(), "gemini-1.5-flash");
        unsafe {
            std::env::remove_var("DR_TEST_GEMINI_KEY");
        }
    }
}
