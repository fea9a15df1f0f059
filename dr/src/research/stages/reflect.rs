//! Reflector - judges whether the gathered evidence is enough

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::Stage;
use crate::llm::{CompletionRequest, LlmClient, complete_json};
use crate::prompts::{PromptContext, PromptLoader};
use crate::research::error::{StageError, StageKind};
use crate::research::state::{ResearchState, StateUpdate};

#[derive(Debug, Deserialize)]
struct ReflectionReply {
    reflection: String,
}

pub struct Reflector {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
        }
    }
}

#[async_trait]
impl Stage for Reflector {
    fn kind(&self) -> StageKind {
        StageKind::Reflect
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        debug!(results = state.search_results().len(), "Reflector::run: called");
        let mut ctx = PromptContext::new(state.research_context(), state.question()).with_results(state.search_results());
        ctx.revision_number = state.revision_number();
        let system = self
            .prompts
            .render("reflect", &ctx)
            .map_err(|e| StageError::prompt(self.kind(), e))?;
        let request = CompletionRequest::single(system, state.question(), self.max_tokens);

        let reply: ReflectionReply = complete_json(self.llm.as_ref(), request)
            .await
            .map_err(|e| StageError::from_llm(self.kind(), e))?;

        let reflection = reply.reflection.trim();
        if reflection.is_empty() {
            return Err(StageError::schema(self.kind(), "reflection is empty"));
        }

        info!(revision = state.revision_number(), "Reflection: {}", preview(reflection));
        Ok(StateUpdate::reflection(reflection))
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResearchContext;
    use crate::llm::client::mock::MockLlmClient;
    use crate::search::SearchResult;

    fn reflector(llm: Arc<MockLlmClient>) -> Reflector {
        Reflector::new(llm, Arc::new(PromptLoader::embedded_only()), 1024)
    }

    fn state() -> ResearchState {
        let mut s = ResearchState::new(ResearchContext::new("ctx"), "q", 3);
        s.apply(StateUpdate::results(vec![SearchResult::new("https://a.example", "evidence text")]))
            .unwrap();
        s
    }

    #[tokio::test]
    async fn test_records_reflection() {
        let llm = Arc::new(MockLlmClient::new(vec![
            "```json\n{\"reflection\": \"  INSUFFICIENT - no regional data  \"}\n```",
        ]));
        let update = reflector(llm.clone()).run(&state()).await.unwrap();

        assert_eq!(update.reflection.as_deref(), Some("INSUFFICIENT - no regional data"));
        assert!(update.search_queries.is_none());
        assert!(llm.requests()[0].system_prompt.contains("[1] https://a.example"));
    }

    #[tokio::test]
    async fn test_blank_reflection_is_schema_error() {
        let llm = Arc::new(MockLlmClient::new(vec![r#"{"reflection": "   "}"#]));
        let err = reflector(llm).run(&state()).await.unwrap_err();
        assert!(matches!(err, StageError::SchemaValidation { .. }));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(200);
        assert_eq!(preview(&long).len(), 123);
    }
}
