//! Page scraping - fetch a URL and reduce it to readable text

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::SearchError;

/// Responses larger than this are not processed
const MAX_BODY_BYTES: usize = 2_000_000;

/// Fetches pages and converts HTML to markdown
///
/// Output is not length-capped here; callers truncate once.
#[derive(Clone)]
pub struct Scraper {
    http: Client,
}

impl Scraper {
    /// Create a scraper with the given timeout and user agent
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, SearchError> {
        debug!(?timeout, %user_agent, "Scraper::new: called");
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(SearchError::Network)?;
        Ok(Self { http })
    }

    /// Fetch `url` and return its text content
    pub async fn fetch(&self, url: &str) -> Result<String, SearchError> {
        debug!(%url, "Scraper::fetch: called");
        if !url.starts_with("http://") && !url.starts_with("https://") {
            debug!("Scraper::fetch: invalid URL protocol");
            return Err(SearchError::InvalidResponse(format!(
                "URL must start with http:// or https://: {}",
                url
            )));
        }

        let response = self.http.get(url).send().await.map_err(SearchError::Network)?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Scraper::fetch: HTTP error status");
            return Err(SearchError::ApiError {
                status: response.status().as_u16(),
                message: format!("fetching {}", url),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        debug!(%content_type, "Scraper::fetch: content type");

        let body = response.text().await.map_err(SearchError::Network)?;
        if body.len() > MAX_BODY_BYTES {
            debug!(body_len = body.len(), "Scraper::fetch: response too large");
            return Err(SearchError::InvalidResponse(format!(
                "Response too large ({} bytes)",
                body.len()
            )));
        }

        Ok(to_text(&content_type, body))
    }
}

/// Convert a response body to text based on its content type
pub(crate) fn to_text(content_type: &str, body: String) -> String {
    if content_type.contains("text/html") || content_type.contains("application/xhtml") {
        debug!("to_text: converting HTML to markdown");
        html2md::rewrite_html(&body, false)
    } else if content_type.contains("application/json") {
        debug!("to_text: pretty-printing JSON");
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}...\n\n[truncated, {} chars total]", kept, total)
}
