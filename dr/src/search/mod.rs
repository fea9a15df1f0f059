//! Search/scrape collaborator
//!
//! One query in, a list of (source, extracted text) records out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod google;
mod scrape;

pub use google::GoogleSearchClient;
pub use scrape::Scraper;

use crate::config::SearchConfig;

/// One piece of collected evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source identifier, normally the page URL
    pub source: String,

    /// Extracted text
    pub content: String,
}

impl SearchResult {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// Errors from the search collaborator
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Search API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Unknown search provider '{0}' (supported: google)")]
    UnknownProvider(String),
}

impl SearchError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Network(_) => true,
            SearchError::RateLimited { .. } => true,
            SearchError::ApiError { status, .. } => *status >= 500 || *status == 408,
            SearchError::InvalidResponse(_) => false,
            SearchError::MissingCredentials(_) => false,
            SearchError::UnknownProvider(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SearchError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Runs a single query against an external search service
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Search for `query`; an empty list is a valid answer
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

/// Create a search client based on the provider specified in config
pub fn create_client(config: &SearchConfig) -> Result<Arc<dyn SearchClient>, SearchError> {
    debug!(provider = %config.provider, "create_client: called");
    match config.provider.as_str() {
        "google" => {
            debug!("create_client: creating Google client");
            Ok(Arc::new(GoogleSearchClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(SearchError::UnknownProvider(other.to_string()))
        }
    }
}
