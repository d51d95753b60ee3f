// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component C: the Placement Selector.

use std::sync::Arc;

use super::contract::WorkerHandle;
use super::errors::{SupervisorError, SupervisorResult};

/// Picks a worker to host a new replica or shard.
///
/// Algorithm: among the candidate set, query each worker's current model
/// count and return the one with the fewest, breaking ties by iteration
/// order. A cheap proxy for load that avoids hammering GPU-probe APIs on
/// the placement hot path.
pub struct PlacementSelector;

impl PlacementSelector {
    /// Choose a worker from `candidates`. An empty whitelist is treated the
    /// same as no whitelist at all (kept intentionally ambiguous, see the
    /// design notes on this open question).
    pub async fn choose(
        candidates: &[Arc<dyn WorkerHandle>],
    ) -> SupervisorResult<Arc<dyn WorkerHandle>> {
        if candidates.is_empty() {
            return Err(SupervisorError::Placement(
                "no candidate workers available".to_string(),
            ));
        }
        let mut best: Option<(usize, &Arc<dyn WorkerHandle>)> = None;
        for worker in candidates {
            let count = worker.get_model_count().await.unwrap_or(usize::MAX);
            match best {
                Some((best_count, _)) if count >= best_count => {}
                _ => best = Some((count, worker)),
            }
        }
        Ok(best
            .expect("candidates is non-empty so best is always set")
            .1
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::test_support::FakeWorker;

    #[tokio::test]
    async fn picks_fewest_loaded_worker() {
        let busy = Arc::new(FakeWorker::new("busy").with_model_count(5));
        let idle = Arc::new(FakeWorker::new("idle").with_model_count(0));
        let candidates: Vec<Arc<dyn WorkerHandle>> = vec![busy, idle];
        let chosen = PlacementSelector::choose(&candidates).await.unwrap();
        assert_eq!(chosen.address(), "idle");
    }

    #[tokio::test]
    async fn empty_candidates_errors() {
        let candidates: Vec<Arc<dyn WorkerHandle>> = vec![];
        assert!(PlacementSelector::choose(&candidates).await.is_err());
    }
}
