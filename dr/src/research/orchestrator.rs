//! Orchestrator - drives a run through the research loop
//!
//! GenerateQueries -> Research -> Reflect, then the Controller picks either
//! another cycle or FinalAnswer -> End. Stages run one at a time; the state is
//! owned by the running future and merged after every stage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::{Controller, Decision};
use super::error::{ResearchError, StageError, StageKind};
use super::retry;
use super::stages::{Stage, Stages};
use super::state::{FinalAnswer, Phase, ResearchState, StateUpdate};
use super::sufficiency::SufficiencyError;
use crate::config::{Config, ResearchConfig, RetryConfig};
use crate::context::ResearchContext;
use crate::prompts::PromptLoader;
use crate::{llm, search};

/// One edge taken by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    /// Revision number after the move
    pub revision_number: u32,
    pub final_answer_set: bool,
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub question: String,
    pub final_answer: FinalAnswer,
    /// Completed Reflect count
    pub revisions: u32,
    pub transitions: Vec<Transition>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Number of Research stages that ran
    pub fn research_cycles(&self) -> usize {
        self.transitions.iter().filter(|t| t.from == Phase::Research).count()
    }
}

/// Wires the stages and the Controller into the loop
pub struct Orchestrator {
    stages: Stages,
    context: ResearchContext,
    controller: Controller,
    max_revisions: u32,
    retry: RetryConfig,
    run_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(stages: Stages, context: ResearchContext, config: &ResearchConfig) -> Result<Self, SufficiencyError> {
        debug!(
            max_revisions = config.max_revisions,
            run_timeout_ms = config.run_timeout_ms,
            "Orchestrator::new: called"
        );
        Ok(Self {
            stages,
            context,
            controller: Controller::from_config(&config.sufficiency)?,
            max_revisions: config.max_revisions,
            retry: config.retry.clone(),
            run_timeout: (config.run_timeout_ms > 0).then(|| Duration::from_millis(config.run_timeout_ms)),
        })
    }

    /// Build the production stack: configured LLM and search providers,
    /// prompts resolved from the working directory
    pub fn from_config(config: &Config, context: ResearchContext) -> eyre::Result<Self> {
        debug!(llm = %config.llm.provider, search = %config.search.provider, "Orchestrator::from_config: called");
        let llm = llm::create_client(&config.llm)?;
        let search = search::create_client(&config.search)?;
        let prompts = std::sync::Arc::new(PromptLoader::new(std::env::current_dir()?));
        let stages = Stages::standard(llm, search, prompts, config);
        Ok(Self::new(stages, context, &config.research)?)
    }

    /// Override the revision bound for runs started from here on
    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    pub fn context(&self) -> &ResearchContext {
        &self.context
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    /// Answer `question`
    pub async fn run(&self, question: &str) -> Result<FinalAnswer, ResearchError> {
        Ok(self.execute(question, None).await?.final_answer)
    }

    /// Answer `question` and return the full trace
    pub async fn run_traced(&self, question: &str) -> Result<RunReport, ResearchError> {
        self.execute(question, None).await
    }

    /// Like `run_traced`, stopping at the next stage boundary once `cancel` is set
    pub async fn run_cancellable(&self, question: &str, cancel: &AtomicBool) -> Result<RunReport, ResearchError> {
        self.execute(question, Some(cancel)).await
    }

    async fn execute(&self, question: &str, cancel: Option<&AtomicBool>) -> Result<RunReport, ResearchError> {
        if question.trim().is_empty() {
            debug!("Orchestrator::execute: empty question");
            return Err(ResearchError::EmptyQuestion);
        }

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(%run_id, max_revisions = self.max_revisions, "Starting research run");

        let mut state = ResearchState::new(self.context.clone(), question, self.max_revisions);
        let mut transitions = Vec::new();
        let mut phase = Phase::GenerateQueries;

        while phase != Phase::End {
            self.check_boundary(phase, started, cancel)?;
            let next = self.step(phase, &mut state).await?;
            info!(%run_id, from = %phase, to = %next, revision = state.revision_number(), "Phase transition");
            transitions.push(Transition {
                from: phase,
                to: next,
                revision_number: state.revision_number(),
                final_answer_set: state.final_answer().is_some(),
            });
            phase = next;
        }

        let revisions = state.revision_number();
        let final_answer = state
            .into_final_answer()
            .ok_or_else(|| StageError::empty(StageKind::FinalAnswer, "final answer"))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(%run_id, revisions, elapsed_ms, sources = final_answer.sources.len(), "Research run complete");

        Ok(RunReport {
            run_id,
            question: question.to_string(),
            final_answer,
            revisions,
            transitions,
            started_at,
            elapsed_ms,
        })
    }

    fn check_boundary(&self, phase: Phase, started: Instant, cancel: Option<&AtomicBool>) -> Result<(), ResearchError> {
        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            debug!(%phase, "Orchestrator::check_boundary: cancelled");
            return Err(ResearchError::Cancelled { phase });
        }
        if let Some(timeout) = self.run_timeout
            && started.elapsed() >= timeout
        {
            debug!(%phase, ?timeout, "Orchestrator::check_boundary: timed out");
            return Err(ResearchError::TimedOut { timeout, phase });
        }
        Ok(())
    }

    /// Run the stage for `phase`, merge its output, and pick the next phase
    async fn step(&self, phase: Phase, state: &mut ResearchState) -> Result<Phase, ResearchError> {
        debug!(%phase, revision = state.revision_number(), "Orchestrator::step: called");
        match phase {
            Phase::GenerateQueries => {
                let update = self.invoke(self.stages.generate.as_ref(), state).await?;
                if update.search_queries.as_ref().is_none_or(|q| q.is_empty()) {
                    return Err(StageError::empty(StageKind::GenerateQueries, "search queries").into());
                }
                self.merge(phase, state, update)?;
                Ok(Phase::Research)
            }
            Phase::Research => {
                let update = self.invoke(self.stages.research.as_ref(), state).await?;
                self.merge(phase, state, update)?;
                Ok(Phase::Reflect)
            }
            Phase::Reflect => {
                let update = self.invoke(self.stages.reflect.as_ref(), state).await?;
                self.merge(phase, state, update)?;
                state.advance_revision();
                match self
                    .controller
                    .decide(state.revision_number(), state.max_revisions(), state.reflection())
                {
                    Decision::Continue => Ok(Phase::GenerateQueries),
                    Decision::End => Ok(Phase::FinalAnswer),
                }
            }
            Phase::FinalAnswer => {
                let update = self.invoke(self.stages.answer.as_ref(), state).await?;
                if update.final_answer.is_none() {
                    return Err(StageError::empty(StageKind::FinalAnswer, "final answer").into());
                }
                self.merge(phase, state, update)?;
                Ok(Phase::End)
            }
            Phase::End => Ok(Phase::End),
        }
    }

    async fn invoke(&self, stage: &dyn Stage, state: &ResearchState) -> Result<StateUpdate, StageError> {
        retry::with_backoff(&self.retry, stage.kind(), move || stage.run(state)).await
    }

    /// Only the final-answer phase may set the final answer
    fn merge(&self, phase: Phase, state: &mut ResearchState, mut update: StateUpdate) -> Result<(), ResearchError> {
        if phase != Phase::FinalAnswer && update.final_answer.take().is_some() {
            warn!(%phase, "Discarding final answer produced outside the final-answer phase");
        }
        state.apply(update)
    }
}
