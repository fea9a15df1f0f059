//! OpenAI-compatible Chat Completions client
//!
//! Works against any endpoint that speaks `/v1/chat/completions`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transport::{build_http, post_json};
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// Chat Completions client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl OpenAIClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "OpenAIClient::from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::MissingCredentials(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http: build_http(config.timeout_ms)?,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Reasoning-model families take `max_completion_tokens`
    fn token_limit_field(&self) -> &'static str {
        let reasoning = ["gpt-5", "o1", "o3", "o4"].iter().any(|p| self.model.starts_with(p));
        if reasoning { "max_completion_tokens" } else { "max_tokens" }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, json = request.json_output, "build_request_body: called");
        let system = ChatMessage {
            role: "system",
            content: &request.system_prompt,
        };
        let turns = request.messages.iter().map(|m| ChatMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        });
        let messages: Vec<ChatMessage<'_>> = std::iter::once(system).chain(turns).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        body[self.token_limit_field()] = serde_json::json!(request.max_tokens.min(self.max_tokens));
        if request.json_output {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn into_completion(reply: ChatReply) -> CompletionResponse {
        debug!(choice_count = reply.choices.len(), "into_completion: called");
        let usage = reply.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let first = reply.choices.into_iter().next();
        let stop_reason = first
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .map(StopReason::from_openai)
            .unwrap_or(StopReason::EndTurn);

        CompletionResponse {
            content: first.and_then(|c| c.message.content).filter(|t| !t.is_empty()),
            stop_reason,
            usage: usage.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, "OpenAIClient::complete: called");
        let url = self.endpoint_url();
        let body = self.build_request_body(&request);

        let reply: ChatReply = post_json(|| self.http.post(&url).bearer_auth(&self.api_key), &body).await?;
        Ok(Self::into_completion(reply))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
