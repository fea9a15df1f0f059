//! Research loop
//!
//! A run threads one `ResearchState` through four stages:
//!
//! 1. `QueryGenerator` writes search queries from the context and question
//! 2. `Researcher` runs them against the search collaborator
//! 3. `Reflector` judges whether the evidence is enough
//! 4. `AnswerSynthesizer` writes the cited final answer
//!
//! After every Reflect the `Orchestrator` bumps the revision number and asks
//! the `Controller` whether to loop back to step 1 or finish with step 4.

pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod stages;
pub mod state;
pub mod sufficiency;

pub use controller::{Controller, Decision};
pub use error::{ErrorKind, ResearchError, StageError, StageKind};
pub use orchestrator::{Orchestrator, RunReport, Transition};
pub use stages::{AnswerSynthesizer, QueryGenerator, Reflector, Researcher, Stage, Stages};
pub use state::{FinalAnswer, Phase, ResearchState, StateUpdate};
pub use sufficiency::{SufficiencyClassifier, SufficiencyError};
