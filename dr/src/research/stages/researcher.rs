//! Researcher - runs every query against the search collaborator

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::Stage;
use crate::research::error::{StageError, StageKind};
use crate::research::state::{ResearchState, StateUpdate};
use crate::search::{SearchClient, SearchError, SearchResult};

pub struct Researcher {
    search: Arc<dyn SearchClient>,
    fan_out: usize,
}

impl Researcher {
    pub fn new(search: Arc<dyn SearchClient>, fan_out: usize) -> Self {
        debug!(fan_out, "Researcher::new: called");
        Self {
            search,
            fan_out: fan_out.max(1),
        }
    }
}

#[async_trait]
impl Stage for Researcher {
    fn kind(&self) -> StageKind {
        StageKind::Research
    }

    /// Search every query with bounded concurrency
    ///
    /// Results keep query order. A failed query is skipped; the stage fails
    /// only when all of them do.
    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        let queries = state.search_queries();
        debug!(query_count = queries.len(), fan_out = self.fan_out, "Researcher::run: called");
        if queries.is_empty() {
            return Err(StageError::empty(self.kind(), "search queries"));
        }

        let outcomes: Vec<(String, Result<Vec<SearchResult>, SearchError>)> = stream::iter(queries.to_vec())
            .map(|query| {
                let search = Arc::clone(&self.search);
                async move {
                    let outcome = search.search(&query).await;
                    (query, outcome)
                }
            })
            .buffered(self.fan_out)
            .collect()
            .await;

        let mut results = Vec::new();
        let mut last_error = None;
        let mut failed = 0;
        for (query, outcome) in outcomes {
            match outcome {
                Ok(batch) => {
                    debug!(%query, hits = batch.len(), "Researcher::run: query done");
                    results.extend(batch);
                }
                Err(e) => {
                    warn!(%query, error = %e, "Search failed, skipping query");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error
            && failed == queries.len()
        {
            debug!(failed, "Researcher::run: every query failed");
            return Err(StageError::from_search(self.kind(), e));
        }

        info!(results = results.len(), queries = queries.len(), failed, "Collected search results");
        Ok(StateUpdate::results(results))
    }
}
