//! QueryGenerator - turns the question into web search queries

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::Stage;
use crate::llm::{CompletionRequest, LlmClient, complete_json};
use crate::prompts::{PromptContext, PromptLoader};
use crate::research::error::{StageError, StageKind};
use crate::research::state::{ResearchState, StateUpdate};

/// Fewest queries the prompt asks for
const MIN_QUERIES: usize = 3;

#[derive(Debug, Deserialize)]
struct QueriesReply {
    queries: Vec<String>,
}

pub struct QueryGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_queries: usize,
    max_tokens: u32,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_queries: usize, max_tokens: u32) -> Self {
        debug!(max_queries, "QueryGenerator::new: called");
        Self {
            llm,
            prompts,
            max_queries: max_queries.max(1),
            max_tokens,
        }
    }

    fn prompt_context(&self, state: &ResearchState) -> PromptContext {
        let mut ctx = PromptContext::new(state.research_context(), state.question());
        if !state.reflection().is_empty() {
            ctx.reflection = Some(state.reflection().to_string());
            ctx.previous_queries = state.search_queries().to_vec();
        }
        ctx.revision_number = state.revision_number();
        ctx.min_queries = MIN_QUERIES.min(self.max_queries);
        ctx.max_queries = self.max_queries;
        ctx
    }
}

/// Trim, drop blanks, keep at most `max`
fn normalize_queries(raw: Vec<String>, max: usize) -> Vec<String> {
    raw.into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(max)
        .collect()
}

#[async_trait]
impl Stage for QueryGenerator {
    fn kind(&self) -> StageKind {
        StageKind::GenerateQueries
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        debug!(revision = state.revision_number(), "QueryGenerator::run: called");
        let system = self
            .prompts
            .render("generate-queries", &self.prompt_context(state))
            .map_err(|e| StageError::prompt(self.kind(), e))?;
        let request = CompletionRequest::single(system, state.question(), self.max_tokens);

        let reply: QueriesReply = complete_json(self.llm.as_ref(), request)
            .await
            .map_err(|e| StageError::from_llm(self.kind(), e))?;

        let returned = reply.queries.len();
        let queries = normalize_queries(reply.queries, self.max_queries);
        if queries.is_empty() {
            debug!(returned, "QueryGenerator::run: no usable queries");
            return Err(StageError::empty(self.kind(), "search queries"));
        }

        info!(count = queries.len(), returned, "Generated search queries");
        Ok(StateUpdate::queries(queries))
    }
}
