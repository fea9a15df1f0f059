//! Loop controller
//!
//! Pure decision over `(revision_number, max_revisions, reflection)`.

use tracing::debug;

use super::sufficiency::{SufficiencyClassifier, SufficiencyError};
use crate::config::SufficiencyConfig;

/// What happens after a Reflect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run another cycle
    Continue,
    /// Synthesize the final answer
    End,
}

#[derive(Debug, Clone, Default)]
pub struct Controller {
    classifier: SufficiencyClassifier,
}

impl Controller {
    pub fn new(classifier: SufficiencyClassifier) -> Self {
        Self { classifier }
    }

    pub fn from_config(config: &SufficiencyConfig) -> Result<Self, SufficiencyError> {
        Ok(Self::new(SufficiencyClassifier::from_config(config)?))
    }

    /// Decide whether to loop again
    ///
    /// The revision bound is checked first, so it ends the run whatever the
    /// reflection says.
    pub fn decide(&self, revision_number: u32, max_revisions: u32, reflection: &str) -> Decision {
        debug!(revision_number, max_revisions, "Controller::decide: called");
        if revision_number > max_revisions {
            debug!("Controller::decide: revision bound reached");
            return Decision::End;
        }
        if self.classifier.is_sufficient(reflection) {
            debug!("Controller::decide: reflection marked sufficient");
            return Decision::End;
        }
        Decision::Continue
    }
}
