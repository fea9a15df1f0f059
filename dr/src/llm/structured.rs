//! Structured output extraction
//!
//! Models asked for JSON still wrap it in code fences or prose now and then.
//! The parse here is the only way a reply becomes a typed value: anything that
//! does not deserialize into the target shape is a `SchemaValidation` error.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::{CompletionRequest, LlmClient, LlmError, StopReason};

/// Send a JSON-mode request and deserialize the reply into `T`
pub async fn complete_json<T: DeserializeOwned>(llm: &dyn LlmClient, request: CompletionRequest) -> Result<T, LlmError> {
    debug!(model = %llm.model(), "complete_json: called");
    let response = llm.complete(request.expect_json()).await?;

    if response.stop_reason == StopReason::Safety {
        debug!("complete_json: response stopped by safety filter");
        return Err(LlmError::Blocked("stopped by safety filter".to_string()));
    }

    let text = response
        .content
        .ok_or_else(|| LlmError::SchemaValidation("empty response".to_string()))?;

    parse_json(&text).map_err(|e| {
        if response.stop_reason == StopReason::MaxTokens {
            LlmError::SchemaValidation(format!("{} (response truncated at max tokens)", e))
        } else {
            e
        }
    })
}

/// Parse `T` out of a model reply
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    debug!(text_len = text.len(), "parse_json: called");
    let candidate = extract_json(text)
        .ok_or_else(|| LlmError::SchemaValidation(format!("no JSON document in response: {}", preview(text))))?;

    serde_json::from_str(candidate).map_err(|e| LlmError::SchemaValidation(format!("{}: {}", e, preview(candidate))))
}

/// Locate the JSON document inside a reply
///
/// A reply that does not open with `{` or `[` is first searched for a fenced
/// code block. Otherwise the span from the first opener to the last matching
/// closer is taken.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !(trimmed.starts_with('{') || trimmed.starts_with('['))
        && let Some(start) = trimmed.find("```")
    {
        let after = &trimmed[start + 3..];
        // Skip an info string such as `json`
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }

    let open = trimmed.find(['{', '['])?;
    let closer = if trimmed.as_bytes()[open] == b'{' { '}' } else { ']' };
    let close = trimmed.rfind(closer)?;
    (close > open).then(|| &trimmed[open..=close])
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
