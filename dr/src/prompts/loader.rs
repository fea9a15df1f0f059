//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::search::SearchResult;

/// A search result as presented to a template
#[derive(Debug, Clone, Serialize)]
pub struct PromptResult {
    /// 1-based position
    pub index: usize,
    pub source: String,
    pub content: String,
}

/// Context for rendering prompt templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub research_context: String,
    pub question: String,
    /// Latest reflection, absent on the first cycle
    pub reflection: Option<String>,
    /// Queries of the previous cycle
    pub previous_queries: Vec<String>,
    pub search_results: Vec<PromptResult>,
    pub revision_number: u32,
    pub min_queries: usize,
    pub max_queries: usize,
}

impl PromptContext {
    /// Start a context for the given research materials and question
    pub fn new(research_context: &str, question: &str) -> Self {
        debug!(context_len = research_context.len(), "PromptContext::new: called");
        Self {
            research_context: research_context.to_string(),
            question: question.to_string(),
            ..Default::default()
        }
    }

    /// Attach search results, numbering them from 1
    pub fn with_results(mut self, results: &[SearchResult]) -> Self {
        self.search_results = results
            .iter()
            .enumerate()
            .map(|(i, r)| PromptResult {
                index: i + 1,
                source: r.source.clone(),
                content: r.content.clone(),
            })
            .collect();
        self
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.deepresearch/prompts/`)
    user_dir: Option<PathBuf>,
    /// Repo default directory (e.g., `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a new prompt loader rooted at `base`
    ///
    /// Looks for `.deepresearch/prompts/` and `prompts/` under `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        debug!(?base, "PromptLoader::new: called");
        let user_dir = base.join(".deepresearch/prompts");
        let repo_dir = base.join("prompts");

        Self {
            hbs: Self::engine(),
            user_dir: user_dir.is_dir().then_some(user_dir),
            repo_dir: repo_dir.is_dir().then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle quotes and ampersands
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.deepresearch/prompts/{name}.pmt`
    /// 2. Repo default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        debug!("PromptLoader::load_template: trying embedded fallback");
        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        debug!(%template_name, revision = context.revision_number, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
