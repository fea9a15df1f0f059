//! DeepResearch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main DeepResearch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Text-generation provider configuration
    pub llm: LlmConfig,

    /// Search/scrape provider configuration
    pub search: SearchConfig,

    /// Research loop configuration
    pub research: ResearchConfig,

    /// Background context documents
    pub context: ContextConfig,

    /// HTTP server configuration
    pub server: ServerConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables are set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if std::env::var(&self.search.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Search API key not found. Set the {} environment variable.",
                self.search.api_key_env
            ));
        }
        if std::env::var(&self.search.engine_id_env).is_err() {
            return Err(eyre::eyre!(
                "Search engine id not found. Set the {} environment variable.",
                self.search.engine_id_env
            ));
        }
        if self.research.max_queries == 0 {
            return Err(eyre::eyre!("research.max-queries must be at least 1"));
        }
        if self.research.fan_out == 0 {
            return Err(eyre::eyre!("research.fan-out must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .deepresearch.yml
        let local_config = PathBuf::from(".deepresearch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/deepresearch/deepresearch.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is initialized
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".deepresearch.yml")];
                paths.extend(Self::user_config_path());
                paths
            }
        };

        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("deepresearch").join("deepresearch.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Text-generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("gemini" or "openai")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-pro-latest".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_tokens: 8192,
            temperature: 0.0,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(api_key_env = %self.api_key_env, "LlmConfig::get_api_key: called");
        std::env::var(&self.api_key_env).context(format!("Environment variable {} is not set", self.api_key_env))
    }
}

/// Search/scrape provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider name (currently only "google" supported)
    pub provider: String,

    /// Environment variable containing the search API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Environment variable containing the programmable search engine id
    #[serde(rename = "engine-id-env")]
    pub engine_id_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Number of hits requested per query (Google caps this at 10)
    #[serde(rename = "results-per-query")]
    pub results_per_query: u32,

    /// Fetch each hit's page and convert it to markdown
    pub scrape: bool,

    /// Maximum characters of extracted text kept per hit
    #[serde(rename = "max-content-chars")]
    pub max_content_chars: usize,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// User agent sent when scraping pages
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            engine_id_env: "GOOGLE_CSE_ID".to_string(),
            base_url: "https://www.googleapis.com/customsearch/v1".to_string(),
            results_per_query: 5,
            scrape: true,
            max_content_chars: 8_000,
            timeout_ms: 30_000,
            user_agent: "DeepResearch/0.1 (research agent)".to_string(),
        }
    }
}

/// Research loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Revision bound checked by the controller
    #[serde(rename = "max-revisions")]
    pub max_revisions: u32,

    /// Maximum queries kept from one generation
    #[serde(rename = "max-queries")]
    pub max_queries: usize,

    /// Maximum concurrent search calls within one research stage
    #[serde(rename = "fan-out")]
    pub fan_out: usize,

    /// Whole-run timeout in milliseconds, checked at stage boundaries (0 disables)
    #[serde(rename = "run-timeout-ms")]
    pub run_timeout_ms: u64,

    /// Stage-level retry policy
    pub retry: RetryConfig,

    /// Markers that end the loop when found in a reflection
    pub sufficiency: SufficiencyConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_revisions: 3,
            max_queries: 5,
            fan_out: 5,
            run_timeout_ms: 600_000,
            retry: RetryConfig::default(),
            sufficiency: SufficiencyConfig::default(),
        }
    }
}

/// Stage-level retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per stage, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles afterwards
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// How sufficiency markers are matched against a reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Marker is the reflection's first word (the verdict)
    #[default]
    Leading,
    /// Marker appears anywhere
    Substring,
    /// Marker appears delimited by non-word characters
    WholeWord,
    /// Marker is a regular expression
    Regex,
}

/// Sufficiency classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SufficiencyConfig {
    /// Marker phrases, matched case-insensitively
    pub markers: Vec<String>,

    /// Matching mode
    pub mode: MatchMode,
}

impl Default for SufficiencyConfig {
    fn default() -> Self {
        Self {
            markers: vec!["sufficient".to_string()],
            mode: MatchMode::Leading,
        }
    }
}

/// Background context documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Directory holding the context documents
    pub dir: PathBuf,

    /// File name pattern within `dir`
    pub pattern: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("context_data"),
            pattern: "*.md".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}
