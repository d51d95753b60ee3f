// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component F: the Request Router.

use std::sync::Arc;

use tracing::warn;

use super::contract::{AbortToken, WorkerHandle};
use super::errors::{SupervisorError, SupervisorResult};
use super::state::Supervisor;
use super::types::build_replica_uid;

impl Supervisor {
    /// Resolve `model_uid` to a worker handle using round-robin, advancing
    /// the cursor by exactly one slot. For a sharded replica this always
    /// returns the driver (shard 0), which fans inference calls out
    /// internally.
    pub fn get_model(&mut self, model_uid: &str) -> SupervisorResult<Arc<dyn WorkerHandle>> {
        let info = self
            .replicas
            .get_mut(model_uid)
            .ok_or_else(|| SupervisorError::NotFound(format!("unknown model_uid '{model_uid}'")))?;
        let i = info.next_replica_index();
        let n = info.replica_count;
        let replica_uid = build_replica_uid(model_uid, i, n);
        let worker_address = self
            .replicas
            .workers_for_replica(&replica_uid)
            .and_then(|workers| workers.first())
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(format!("no worker bound to replica '{replica_uid}'")))?;
        self.workers
            .get_handle(&worker_address)
            .ok_or_else(|| SupervisorError::NotFound(format!("worker '{worker_address}' has no handle")))
    }

    /// Cancel an in-flight request by fanning `abort_request` out to shard 0
    /// of every replica of `model_uid`, stopping at the first `DONE`.
    pub async fn abort_request(
        &self,
        model_uid: &str,
        request_id: &str,
        block_duration_secs: u64,
    ) -> SupervisorResult<AbortToken> {
        if !self.replicas.contains(model_uid) {
            return Err(SupervisorError::NotFound(format!("unknown model_uid '{model_uid}'")));
        }

        let mut last_non_noop = AbortToken::NoOp;
        for replica_uid in self.replicas.replica_uids(model_uid) {
            let Some(worker_address) = self
                .replicas
                .workers_for_replica(&replica_uid)
                .and_then(|workers| workers.first())
            else {
                continue;
            };
            let Some(worker) = self.workers.get_handle(worker_address) else {
                continue;
            };
            match worker.abort_request(&replica_uid, request_id, block_duration_secs).await {
                Ok(AbortToken::Done) => return Ok(AbortToken::Done),
                Ok(token @ AbortToken::NotFound) => last_non_noop = token,
                Ok(AbortToken::NoOp) => {}
                Err(err) => {
                    warn!(%replica_uid, error = %err, "abort_request failed on replica, continuing");
                }
            }
        }
        Ok(last_non_noop)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::config::SupervisorConfig;
    use super::super::contract::AbortToken;
    use super::super::launch::LaunchRequest;
    use super::super::test_support::{FakeCacheTracker, FakeProgressTracker, FakeStatusGuard, FakeWorker};
    use super::*;

    fn new_supervisor() -> Supervisor {
        Supervisor::new(
            "self:9000",
            SupervisorConfig::default(),
            Arc::new(FakeStatusGuard::default()),
            Arc::new(FakeCacheTracker::default()),
            Arc::new(FakeProgressTracker),
        )
    }

    fn base_request(name: &str, replica: u32) -> LaunchRequest {
        LaunchRequest {
            model_uid: None,
            model_name: name.to_string(),
            model_version: None,
            replica,
            n_worker: 1,
            request_limits: 0,
            gpu_idx: vec![],
            worker_ip: None,
            enable_xavier: false,
            engine_supports_collective: false,
            wait_ready: true,
        }
    }

    #[tokio::test]
    async fn get_model_round_robins_in_index_order() {
        let mut sup = new_supervisor();
        for addr in ["w1", "w2", "w3", "w4"] {
            sup.add_worker(Arc::new(FakeWorker::new(addr))).unwrap();
        }
        sup.launch_model(base_request("m", 4)).await.unwrap();

        // Four replicas, each bound to a distinct worker (placement favors
        // the least-loaded candidate and every worker starts at zero), so
        // 12 round-robin calls must land exactly 3 visits on each one.
        let mut visits: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for _ in 0..12 {
            let worker = sup.get_model("m").unwrap();
            *visits.entry(worker.address().to_string()).or_insert(0) += 1;
        }
        assert_eq!(visits.len(), 4, "expected all four workers to be visited: {visits:?}");
        for (address, count) in &visits {
            assert_eq!(*count, 3, "worker '{address}' visited {count} times, expected 3");
        }
    }

    #[tokio::test]
    async fn get_model_unknown_uid_errors() {
        let mut sup = new_supervisor();
        assert!(sup.get_model("ghost").is_err());
    }

    #[tokio::test]
    async fn abort_request_stops_at_first_done() {
        let mut sup = new_supervisor();
        let w1 = Arc::new(FakeWorker::new("w1").with_abort_responses(vec![AbortToken::NotFound]));
        let w2 = Arc::new(FakeWorker::new("w2").with_abort_responses(vec![AbortToken::NotFound]));
        let w3 = Arc::new(FakeWorker::new("w3").with_abort_responses(vec![AbortToken::Done]));
        sup.add_worker(w1).unwrap();
        sup.add_worker(w2).unwrap();
        sup.add_worker(w3).unwrap();
        sup.launch_model(base_request("z", 3)).await.unwrap();
        let token = sup.abort_request("z", "req-1", 10).await.unwrap();
        assert_eq!(token, AbortToken::Done);
    }

    #[tokio::test]
    async fn abort_request_returns_not_found_over_no_op() {
        let mut sup = new_supervisor();
        let w1 = Arc::new(FakeWorker::new("w1").with_abort_responses(vec![AbortToken::NotFound]));
        let w2 = Arc::new(FakeWorker::new("w2").with_abort_responses(vec![AbortToken::NoOp]));
        let w3 = Arc::new(FakeWorker::new("w3").with_abort_responses(vec![AbortToken::NotFound]));
        sup.add_worker(w1).unwrap();
        sup.add_worker(w2).unwrap();
        sup.add_worker(w3).unwrap();
        sup.launch_model(base_request("z", 3)).await.unwrap();
        let token = sup.abort_request("z", "req-1", 10).await.unwrap();
        assert_eq!(token, AbortToken::NotFound);
    }
}
