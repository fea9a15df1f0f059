//! Google Programmable Search (Custom Search JSON API) client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::scrape::truncate;
use super::{Scraper, SearchClient, SearchError, SearchResult};
use crate::config::SearchConfig;

/// Google caps `num` at 10 per request
const MAX_RESULTS_PER_REQUEST: u32 = 10;

/// Google Custom Search client with optional page scraping
pub struct GoogleSearchClient {
    http: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
    results_per_query: u32,
    max_content_chars: usize,
    scraper: Option<Scraper>,
}

impl GoogleSearchClient {
    /// Create a client from configuration, reading credentials from the environment
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        debug!(base_url = %config.base_url, scrape = config.scrape, "GoogleSearchClient::from_config: called");
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| SearchError::MissingCredentials(format!("{} is not set", config.api_key_env)))?;
        let engine_id = std::env::var(&config.engine_id_env)
            .map_err(|_| SearchError::MissingCredentials(format!("{} is not set", config.engine_id_env)))?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(SearchError::Network)?;

        let scraper = if config.scrape {
            Some(Scraper::new(timeout, &config.user_agent)?)
        } else {
            None
        };

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
            engine_id,
            results_per_query: config.results_per_query.clamp(1, MAX_RESULTS_PER_REQUEST),
            max_content_chars: config.max_content_chars,
            scraper,
        })
    }

    /// Turn API items into results, scraping pages when enabled
    ///
    /// A page that cannot be scraped falls back to its search snippet.
    async fn collect(&self, items: Vec<GoogleItem>) -> Vec<SearchResult> {
        debug!(item_count = items.len(), "collect: called");
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let scraped = match &self.scraper {
                Some(scraper) => Some(scraper.fetch(&item.link).await),
                None => None,
            };
            let content = page_content(&item, scraped, self.max_content_chars);
            results.push(SearchResult::new(item.link, content));
        }
        results
    }
}

/// Pick the scraped page or the snippet, then cap it at `max_chars`
fn page_content(item: &GoogleItem, scraped: Option<Result<String, SearchError>>, max_chars: usize) -> String {
    let content = match scraped {
        Some(Ok(text)) if !text.trim().is_empty() => text,
        Some(Ok(_)) => {
            debug!(link = %item.link, "page_content: scraped page was empty, using snippet");
            item.snippet_text()
        }
        Some(Err(e)) => {
            warn!(link = %item.link, error = %e, "page_content: scrape failed, using snippet");
            item.snippet_text()
        }
        None => item.snippet_text(),
    };
    truncate(&content, max_chars)
}

#[async_trait]
impl SearchClient for GoogleSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        debug!(%query, "GoogleSearchClient::search: called");
        let num = self.results_per_query.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 429 {
            debug!("GoogleSearchClient::search: rate limited (429)");
            return Err(SearchError::RateLimited {
                retry_after: Duration::from_secs(30),
            });
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%status, "GoogleSearchClient::search: API error");
            return Err(SearchError::ApiError { status, message });
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        let items = body.items.unwrap_or_default();
        if items.is_empty() {
            debug!(%query, "GoogleSearchClient::search: no results");
            return Ok(Vec::new());
        }

        Ok(self.collect(items).await)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleItem {
    fn snippet_text(&self) -> String {
        match (self.title.is_empty(), self.snippet.is_empty()) {
            (false, false) => format!("{}\n{}", self.title, self.snippet),
            (false, true) => self.title.clone(),
            _ => self.snippet.clone(),
        }
    }
}
