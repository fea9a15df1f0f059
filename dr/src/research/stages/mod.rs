//! Research stages
//!
//! Each stage reads the current state and returns the fields it replaces. The
//! orchestrator owns the state and does the merging.

use std::sync::Arc;

use async_trait::async_trait;

mod answer;
mod query;
mod reflect;
mod researcher;

pub use answer::AnswerSynthesizer;
pub use query::QueryGenerator;
pub use reflect::Reflector;
pub use researcher::Researcher;

use super::error::{StageError, StageKind};
use super::state::{ResearchState, StateUpdate};
use crate::config::Config;
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;
use crate::search::SearchClient;

/// One node of the research loop
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which node this is
    fn kind(&self) -> StageKind;

    /// Run once against a snapshot of the state
    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, StageError>;
}

/// The four stages wired into an orchestrator
#[derive(Clone)]
pub struct Stages {
    pub generate: Arc<dyn Stage>,
    pub research: Arc<dyn Stage>,
    pub reflect: Arc<dyn Stage>,
    pub answer: Arc<dyn Stage>,
}

impl Stages {
    /// LLM-backed stages over the given collaborators
    pub fn standard(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchClient>,
        prompts: Arc<PromptLoader>,
        config: &Config,
    ) -> Self {
        let max_tokens = config.llm.max_tokens;
        Self {
            generate: Arc::new(QueryGenerator::new(
                llm.clone(),
                prompts.clone(),
                config.research.max_queries,
                max_tokens,
            )),
            research: Arc::new(Researcher::new(search, config.research.fan_out)),
            reflect: Arc::new(Reflector::new(llm.clone(), prompts.clone(), max_tokens)),
            answer: Arc::new(AnswerSynthesizer::new(llm, prompts, max_tokens)),
        }
    }
}
