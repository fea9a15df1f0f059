//! AnswerSynthesizer - produces the structured, cited final answer

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::Stage;
use crate::llm::{CompletionRequest, LlmClient, complete_json};
use crate::prompts::{PromptContext, PromptLoader};
use crate::research::error::{StageError, StageKind};
use crate::research::state::{FinalAnswer, ResearchState, StateUpdate};
use crate::search::SearchResult;

#[derive(Debug, Deserialize)]
struct AnswerReply {
    answer: String,
    #[serde(default)]
    details: String,
    #[serde(default)]
    sources: Vec<String>,
}

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
        }
    }
}

/// Keep citations that name a source of `results`, first occurrence only
fn filter_citations(cited: Vec<String>, results: &[SearchResult]) -> Vec<String> {
    let known: HashSet<&str> = results.iter().map(|r| r.source.as_str()).collect();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(cited.len());
    for source in cited {
        let source = source.trim().to_string();
        if !known.contains(source.as_str()) {
            warn!(%source, "Dropping citation not found in search results");
            continue;
        }
        if seen.insert(source.clone()) {
            kept.push(source);
        }
    }
    kept
}

#[async_trait]
impl Stage for AnswerSynthesizer {
    fn kind(&self) -> StageKind {
        StageKind::FinalAnswer
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        debug!(results = state.search_results().len(), "AnswerSynthesizer::run: called");
        let mut ctx = PromptContext::new(state.research_context(), state.question()).with_results(state.search_results());
        ctx.reflection = Some(state.reflection().to_string()).filter(|r| !r.is_empty());
        ctx.revision_number = state.revision_number();
        let system = self
            .prompts
            .render("final-answer", &ctx)
            .map_err(|e| StageError::prompt(self.kind(), e))?;
        let request = CompletionRequest::single(system, state.question(), self.max_tokens);

        let reply: AnswerReply = complete_json(self.llm.as_ref(), request)
            .await
            .map_err(|e| StageError::from_llm(self.kind(), e))?;

        let answer = reply.answer.trim();
        if answer.is_empty() {
            return Err(StageError::schema(self.kind(), "answer is empty"));
        }

        let cited = reply.sources.len();
        let sources = filter_citations(reply.sources, state.search_results());
        info!(cited, kept = sources.len(), "Synthesized final answer");

        Ok(StateUpdate::final_answer(FinalAnswer {
            answer: answer.to_string(),
            details: reply.details.trim().to_string(),
            sources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResearchContext;
    use crate::llm::client::mock::MockLlmClient;

    fn synthesizer(llm: Arc<MockLlmClient>) -> AnswerSynthesizer {
        AnswerSynthesizer::new(llm, Arc::new(PromptLoader::embedded_only()), 1024)
    }

    fn state() -> ResearchState {
        let mut s = ResearchState::new(ResearchContext::new("ctx"), "How big is it?", 3);
        s.apply(StateUpdate::results(vec![
            SearchResult::new("https://a.example", "a"),
            SearchResult::new("https://b.example", "b"),
        ]))
        .unwrap();
        s
    }

    #[test]
    fn test_filter_citations() {
        let results = vec![SearchResult::new("u1", ""), SearchResult::new("u2", "")];
        let cited = vec!["u2".into(), "made-up".into(), " u1 ".into(), "u2".into()];
        assert_eq!(filter_citations(cited, &results), vec!["u2".to_string(), "u1".to_string()]);
    }

    #[tokio::test]
    async fn test_synthesizes_answer() {
        let llm = Arc::new(MockLlmClient::new(vec![
            r#"{"answer": "About 5bn", "details": "Two reports agree.", "sources": ["https://b.example", "https://nowhere.example"]}"#,
        ]));
        let update = synthesizer(llm).run(&state()).await.unwrap();

        let answer = update.final_answer.unwrap();
        assert_eq!(answer.answer, "About 5bn");
        assert_eq!(answer.details, "Two reports agree.");
        assert_eq!(answer.sources, vec!["https://b.example".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_answer_is_schema_error() {
        let llm = Arc::new(MockLlmClient::new(vec![r#"{"answer": "", "sources": []}"#]));
        let err = synthesizer(llm).run(&state()).await.unwrap_err();
        assert!(matches!(err, StageError::SchemaValidation { .. }));
    }

    #[tokio::test]
    async fn test_missing_answer_field_is_schema_error() {
        let llm = Arc::new(MockLlmClient::new(vec![r#"{"details": "no answer"}"#]));
        let err = synthesizer(llm).run(&state()).await.unwrap_err();
        assert!(matches!(err, StageError::SchemaValidation { .. }));
    }
}
