//! HTTP plumbing shared by the provider clients
//!
//! Transport failures and transient statuses are retried here with a short
//! backoff. A 429 is returned at once as `RateLimited` so the stage-level retry
//! can honor the provider's wait.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::LlmError;

/// Maximum number of retries for transient HTTP errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Wait used when a 429 carries no Retry-After header
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Check if an HTTP status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504)
}

/// HTTP client with the configured request timeout
pub(crate) fn build_http(timeout_ms: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(LlmError::Network)
}

/// POST `body` to the request produced by `prepare` and decode the reply
///
/// `prepare` is called once per attempt since a `RequestBuilder` is consumed
/// by sending.
pub(crate) async fn post_json<T, F>(prepare: F, body: &Value) -> Result<T, LlmError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match send_once(prepare().json(body)).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                attempt += 1;
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS << (attempt - 1));
                warn!(attempt, ?backoff, error = %e, "Provider call failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(err: &LlmError) -> bool {
    match err {
        LlmError::Network(_) => true,
        LlmError::ApiError { status, .. } => is_retryable_status(*status),
        _ => false,
    }
}

async fn send_once<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, LlmError> {
    let response = request.send().await?;
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after = retry_after(response.headers()).unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
        debug!(?retry_after, "send_once: rate limited (429)");
        return Err(LlmError::RateLimited { retry_after });
    }

    if !response.status().is_success() {
        let message = response.text().await.unwrap_or_default();
        debug!(%status, "send_once: API error");
        return Err(LlmError::ApiError { status, message });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| LlmError::InvalidResponse(format!("Failed to decode response body: {}", e)))
}

/// Seconds form of the Retry-After header
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(429));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));

        // HTTP-date form is not interpreted
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&LlmError::ApiError {
            status: 502,
            message: String::new()
        }));
        assert!(!is_transient(&LlmError::ApiError {
            status: 401,
            message: String::new()
        }));
        assert!(!is_transient(&LlmError::RateLimited {
            retry_after: Duration::from_secs(1)
        }));
        assert!(!is_transient(&LlmError::InvalidResponse("bad body".to_string())));
    }
}
