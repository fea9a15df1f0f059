//! DeepResearch - iterative research agent
//!
//! Given a question and a fixed body of background documents, DeepResearch
//! repeatedly generates web search queries, gathers evidence, reflects on
//! whether it is enough, and finally writes a cited answer.
//!
//! # Modules
//!
//! - [`research`] - the loop: state, stages, controller, orchestrator
//! - [`llm`] - text-generation clients (Gemini, OpenAI-compatible)
//! - [`search`] - Google Custom Search with page scraping
//! - [`context`] - background document loading
//! - [`prompts`] - Handlebars prompt templates
//! - [`server`] - `POST /deepresearch`
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod context;
pub mod llm;
pub mod prompts;
pub mod research;
pub mod search;
pub mod server;

pub use config::Config;
pub use context::ResearchContext;
pub use research::{FinalAnswer, Orchestrator, ResearchError, RunReport};
