//! Run state threaded through the research loop

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ResearchError;
use crate::context::ResearchContext;
use crate::search::SearchResult;

/// Position of a run in the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    GenerateQueries,
    Research,
    Reflect,
    FinalAnswer,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::GenerateQueries => "generate-queries",
            Phase::Research => "research",
            Phase::Reflect => "reflect",
            Phase::FinalAnswer => "final-answer",
            Phase::End => "end",
        };
        f.write_str(name)
    }
}

/// Structured answer returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub answer: String,

    #[serde(default)]
    pub details: String,

    /// Citation URLs, each one a source of the last search batch
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Field replacements produced by one stage
///
/// Only the replaceable fields exist here; context, question and the revision
/// counters cannot be touched by a stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub search_queries: Option<Vec<String>>,
    pub search_results: Option<Vec<SearchResult>>,
    pub reflection: Option<String>,
    pub final_answer: Option<FinalAnswer>,
}

impl StateUpdate {
    pub fn queries(queries: Vec<String>) -> Self {
        Self {
            search_queries: Some(queries),
            ..Default::default()
        }
    }

    pub fn results(results: Vec<SearchResult>) -> Self {
        Self {
            search_results: Some(results),
            ..Default::default()
        }
    }

    pub fn reflection(reflection: impl Into<String>) -> Self {
        Self {
            reflection: Some(reflection.into()),
            ..Default::default()
        }
    }

    pub fn final_answer(answer: FinalAnswer) -> Self {
        Self {
            final_answer: Some(answer),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search_queries.is_none()
            && self.search_results.is_none()
            && self.reflection.is_none()
            && self.final_answer.is_none()
    }
}

/// State of one research run
#[derive(Debug, Clone)]
pub struct ResearchState {
    research_context: ResearchContext,
    question: Arc<str>,
    search_queries: Vec<String>,
    search_results: Vec<SearchResult>,
    reflection: String,
    revision_number: u32,
    max_revisions: u32,
    final_answer: Option<FinalAnswer>,
}

impl ResearchState {
    /// Seed a run: revision 0, nothing gathered yet
    pub fn new(research_context: ResearchContext, question: impl Into<Arc<str>>, max_revisions: u32) -> Self {
        let question = question.into();
        debug!(question_len = question.len(), max_revisions, "ResearchState::new: called");
        Self {
            research_context,
            question,
            search_queries: Vec::new(),
            search_results: Vec::new(),
            reflection: String::new(),
            revision_number: 0,
            max_revisions,
            final_answer: None,
        }
    }

    pub fn research_context(&self) -> &ResearchContext {
        &self.research_context
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn search_queries(&self) -> &[String] {
        &self.search_queries
    }

    pub fn search_results(&self) -> &[SearchResult] {
        &self.search_results
    }

    /// Latest reflection; empty before the first Reflect
    pub fn reflection(&self) -> &str {
        &self.reflection
    }

    pub fn revision_number(&self) -> u32 {
        self.revision_number
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    pub fn final_answer(&self) -> Option<&FinalAnswer> {
        self.final_answer.as_ref()
    }

    /// Merge a stage update by field replacement
    ///
    /// Fails without changing anything when the update would overwrite an
    /// existing final answer.
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), ResearchError> {
        debug!(
            queries = update.search_queries.is_some(),
            results = update.search_results.is_some(),
            reflection = update.reflection.is_some(),
            final_answer = update.final_answer.is_some(),
            "ResearchState::apply: called"
        );
        if update.final_answer.is_some() && self.final_answer.is_some() {
            debug!("ResearchState::apply: final answer already set");
            return Err(ResearchError::FinalAnswerAlreadySet);
        }

        if let Some(queries) = update.search_queries {
            self.search_queries = queries;
        }
        if let Some(results) = update.search_results {
            self.search_results = results;
        }
        if let Some(reflection) = update.reflection {
            self.reflection = reflection;
        }
        if let Some(answer) = update.final_answer {
            self.final_answer = Some(answer);
        }
        Ok(())
    }

    /// Count one completed Reflect
    pub(crate) fn advance_revision(&mut self) {
        self.revision_number = self.revision_number.saturating_add(1);
        debug!(revision_number = self.revision_number, "ResearchState::advance_revision: called");
    }

    /// Take the final answer out of a finished run
    pub(crate) fn into_final_answer(self) -> Option<FinalAnswer> {
        self.final_answer
    }
}
