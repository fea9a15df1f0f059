//! Google Gemini API client implementation
//!
//! Differences from the OpenAI wire format:
//! - Auth via `?key=API_KEY` query parameter
//! - System prompt is a top-level `system_instruction` field
//! - Roles are `"user"` / `"model"`
//! - JSON output is requested with `responseMimeType`

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::transport::{build_http, post_json};
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// Gemini generateContent client
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "GeminiClient::from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::MissingCredentials(e.to_string()))?;

        Ok(Self {
            model: config.model.trim_start_matches("models/").to_string(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http: build_http(config.timeout_ms)?,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Build the JSON request body for the Gemini API
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": msg.content }] })
            })
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens.min(self.max_tokens),
                "temperature": self.temperature,
            },
        });

        if !request.system_prompt.is_empty() {
            body["system_instruction"] = serde_json::json!({
                "parts": [{ "text": request.system_prompt }]
            });
        }

        if request.json_output {
            debug!("build_request_body: requesting application/json output");
            body["generationConfig"]["responseMimeType"] = serde_json::json!("application/json");
        }

        body
    }

    /// Parse a Gemini API response JSON into a `CompletionResponse`
    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        debug!("parse_response: called");
        if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
            debug!(%reason, "parse_response: prompt blocked");
            return Err(LlmError::Blocked(format!("prompt blocked: {}", reason)));
        }

        let candidate = body["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| LlmError::InvalidResponse("Missing or empty 'candidates' array".to_string()))?;

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        let stop_reason = candidate["finishReason"]
            .as_str()
            .map(StopReason::from_gemini)
            .unwrap_or(StopReason::EndTurn);

        let usage = &body["usageMetadata"];
        Ok(CompletionResponse {
            content: if text.is_empty() { None } else { Some(text) },
            stop_reason,
            usage: TokenUsage {
                input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0),
                output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "GeminiClient::complete: called");
        let url = self.endpoint_url();
        let body = self.build_request_body(&request);

        let reply: Value = post_json(
            || self.http.post(&url).query(&[("key", self.api_key.as_str())]),
            &body,
        )
        .await?;
        Self::parse_response(&reply)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
