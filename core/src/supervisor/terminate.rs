// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component E: the Termination Coordinator.

use tracing::{debug, warn};

use super::errors::{SupervisorError, SupervisorResult};
use super::state::Supervisor;

impl Supervisor {
    /// Tear down every worker binding for `model_uid`'s replicas, the
    /// synthetic rank-0 observer, and the collective auxiliary actors,
    /// without touching `InstanceInfo`. Shared by [`Supervisor::terminate_model`]
    /// and by launch rollback (see `launch::run_protocol`), which report two
    /// different final instance statuses (`Terminating`/removed vs. `Error`)
    /// over the same underlying cleanup.
    ///
    /// When `suppress_exception` is `true`, a missing `model_uid` or a
    /// failing worker RPC is logged and swallowed rather than returned.
    pub(super) async fn teardown_replicas(&mut self, model_uid: &str, suppress_exception: bool) -> SupervisorResult<()> {
        if !self.replicas.contains(model_uid) {
            if suppress_exception {
                debug!(model_uid, "teardown on unknown model_uid suppressed");
                self.collective.destroy(model_uid);
                return Ok(());
            }
            return Err(SupervisorError::NotFound(format!("unknown model_uid '{model_uid}'")));
        }

        for replica_uid in self.replicas.replica_uids(model_uid) {
            let Some(worker_addresses) = self.replicas.workers_for_replica(&replica_uid).cloned() else {
                if !suppress_exception {
                    return Err(SupervisorError::NotFound(format!(
                        "no worker binding for replica '{replica_uid}'"
                    )));
                }
                continue;
            };
            for address in worker_addresses {
                let Some(worker) = self.workers.get_handle(&address) else {
                    continue;
                };
                if let Err(err) = worker.terminate_model(&replica_uid).await {
                    if suppress_exception {
                        warn!(%replica_uid, %address, error = %err, "terminate_model failed, continuing teardown");
                    } else {
                        return Err(SupervisorError::worker_rpc(model_uid, err));
                    }
                }
            }
            self.replicas.remove_replica_binding(&replica_uid);
        }

        self.replicas.remove_model(model_uid);

        if let Some(rank0_uid) = self.collective.rank0_replica_uid(model_uid).cloned() {
            if let Some(workers) = self.replicas.workers_for_replica(&rank0_uid).cloned() {
                for address in workers {
                    if let Some(worker) = self.workers.get_handle(&address) {
                        if let Err(err) = worker.terminate_model(&rank0_uid).await {
                            debug!(%rank0_uid, error = %err, "rank0 teardown failed, ignoring");
                        }
                    }
                }
            }
        }
        self.collective.destroy(model_uid);

        Ok(())
    }

    /// Tear down every replica of `model_uid` and remove its `InstanceInfo`.
    ///
    /// When `suppress_exception` is `true` (used for idempotent retries), a
    /// missing `model_uid` or a failing worker RPC is logged and swallowed
    /// rather than returned.
    pub async fn terminate_model(&mut self, model_uid: &str, suppress_exception: bool) -> SupervisorResult<()> {
        self.teardown_replicas(model_uid, suppress_exception).await?;

        self.status_guard
            .update_instance_info(model_uid, super::types::InstanceStatus::Terminating)
            .await;
        self.status_guard.remove_instance_info(model_uid).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::config::SupervisorConfig;
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
    async fn terminate_clears_replica_and_worker_maps() {
        let mut sup = new_supervisor();
        let worker = Arc::new(FakeWorker::new("w1"));
        sup.add_worker(worker.clone()).unwrap();
        sup.launch_model(base_request("m", 2)).await.unwrap();
        sup.terminate_model("m", false).await.unwrap();
        assert!(!sup.replicas.contains("m"));
        assert!(sup.replicas.workers_for_replica("m-replica-0-of-2").is_none());
        assert_eq!(worker.terminated_replicas().len(), 2);
    }

    #[tokio::test]
    async fn terminate_unknown_uid_errors_unless_suppressed() {
        let mut sup = new_supervisor();
        assert!(sup.terminate_model("ghost", false).await.is_err());
        assert!(sup.terminate_model("ghost", true).await.is_ok());
    }

    #[tokio::test]
    async fn terminate_is_idempotent_when_suppressed() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.launch_model(base_request("m", 1)).await.unwrap();
        sup.terminate_model("m", true).await.unwrap();
        sup.terminate_model("m", true).await.unwrap();
    }
}
