// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component D: the Launch Coordinator.

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, instrument, warn};

use super::contract::{LaunchSpec, WorkerHandle, XavierConfig};
use super::errors::{SupervisorError, SupervisorResult};
use super::placement::PlacementSelector;
use super::state::Supervisor;
use super::types::{build_replica_uid, is_valid_model_uid, InstanceInfo, InstanceStatus};

/// Caller-supplied parameters for a launch, covering both protocols and the
/// optional collective bring-up.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Caller-chosen UID, or `None` to synthesize one from `model_name`.
    pub model_uid: Option<String>,
    /// Human-readable model name.
    pub model_name: String,
    /// Model version, if known; mirrored into `InstanceInfo` only.
    pub model_version: Option<String>,
    /// Number of replicas, N ≥ 1.
    pub replica: u32,
    /// Workers per replica; 1 selects the replicated protocol, >1 the
    /// sharded protocol.
    pub n_worker: u32,
    /// Concurrent request limit per replica (0 = unlimited).
    pub request_limits: i64,
    /// GPU indices to split across replicas (and shards, when sharded).
    pub gpu_idx: Vec<u32>,
    /// Pin placement to the worker whose address contains this host
    /// fragment.
    pub worker_ip: Option<String>,
    /// Ask for collective-communication bring-up.
    pub enable_xavier: bool,
    /// Whether the target engine actually supports collective bring-up;
    /// `enable_xavier` is silently downgraded when this is `false`.
    pub engine_supports_collective: bool,
    /// Block until every replica is loaded before returning.
    pub wait_ready: bool,
}

fn gpu_slice(gpu_idx: &[u32], n: u32, i: u32) -> Vec<u32> {
    if gpu_idx.is_empty() || n == 0 {
        return Vec::new();
    }
    let n = n as usize;
    let i = i as usize;
    let base = gpu_idx.len() / n;
    let extra = gpu_idx.len() % n;
    let start = i * base + i.min(extra);
    let len = base + usize::from(i < extra);
    gpu_idx[start..start + len].to_vec()
}

impl Supervisor {
    /// Candidate worker handles for placement: just the worker matching
    /// `worker_ip` when pinned, otherwise every registered worker.
    fn candidate_handles(&self, worker_ip: Option<&str>) -> SupervisorResult<Vec<Arc<dyn WorkerHandle>>> {
        if let Some(ip) = worker_ip {
            let address = self
                .lookup_by_ip(ip)
                .ok_or_else(|| SupervisorError::NotFound(format!("no worker matching ip '{ip}'")))?;
            let handle = self
                .workers
                .get_handle(&address)
                .ok_or_else(|| SupervisorError::NotFound(format!("worker '{address}' has no handle")))?;
            return Ok(vec![handle]);
        }
        let handles: Vec<_> = self
            .list_workers()
            .iter()
            .filter_map(|addr| self.workers.get_handle(addr))
            .collect();
        if handles.is_empty() {
            return Err(SupervisorError::Placement("no workers registered".to_string()));
        }
        Ok(handles)
    }

    /// Validate, synthesize the UID if needed, insert the `ReplicaInfo`, and
    /// publish `InstanceInfo{status: Creating}`. Must run to completion
    /// without yielding between the duplicate check and the insert so two
    /// concurrent launches cannot both claim the same UID.
    fn begin_launch(&mut self, req: &mut LaunchRequest) -> SupervisorResult<String> {
        if req.replica == 0 {
            return Err(SupervisorError::Validation("replica must be >= 1".to_string()));
        }
        if req.request_limits < 0 {
            return Err(SupervisorError::Validation("request_limits must be >= 0".to_string()));
        }

        if self.is_local_deployment() && req.n_worker > 1 {
            warn!("n_worker > 1 in single-node mode; coercing to 1");
            req.n_worker = 1;
        }
        if req.replica == 1 && req.enable_xavier {
            warn!("replica=1 is incompatible with collective bring-up; disabling");
            req.enable_xavier = false;
        }

        let model_uid = match &req.model_uid {
            Some(uid) => {
                if !is_valid_model_uid(uid) {
                    return Err(SupervisorError::Validation(format!("invalid model_uid '{uid}'")));
                }
                if self.replicas.contains(uid) {
                    return Err(SupervisorError::Validation(format!("model_uid '{uid}' already exists")));
                }
                uid.clone()
            }
            None => {
                if !self.replicas.contains(&req.model_name) {
                    req.model_name.clone()
                } else {
                    let suffix: String = rand::thread_rng()
                        .sample_iter(&Alphanumeric)
                        .take(8)
                        .map(char::from)
                        .collect();
                    format!("{}-{}", req.model_name, suffix)
                }
            }
        };

        self.replicas.insert(model_uid.clone(), req.replica);
        info!(%model_uid, "launch claimed model_uid");
        Ok(model_uid)
    }

    /// Publish the initial `InstanceInfo`; a separate step from
    /// [`Supervisor::begin_launch`] only because it suspends (it calls the
    /// external Status Guard) while the UID claim itself must not.
    async fn publish_creating(&self, model_uid: &str, req: &LaunchRequest) {
        self.status_guard
            .set_instance_info(InstanceInfo {
                model_uid: model_uid.to_string(),
                model_name: req.model_name.clone(),
                model_version: req.model_version.clone(),
                replica: req.replica,
                n_worker: req.n_worker,
                status: InstanceStatus::Creating,
                created_ts: Utc::now(),
            })
            .await;
    }

    /// Run the replicated or sharded protocol (plus collective bring-up,
    /// when applicable), rolling back on any failure.
    #[instrument(skip(self, req), fields(model_uid))]
    async fn run_protocol(&mut self, model_uid: &str, req: &LaunchRequest) -> SupervisorResult<()> {
        let result = if req.n_worker > 1 {
            self.run_sharded_protocol(model_uid, req).await
        } else {
            self.run_replicated_protocol(model_uid, req).await
        };

        match result {
            Ok(()) => {
                self.status_guard
                    .update_instance_info(model_uid, InstanceStatus::Ready)
                    .await;
                Ok(())
            }
            Err(err) => {
                self.teardown_replicas(model_uid, true).await.ok();
                self.status_guard
                    .update_instance_info(model_uid, InstanceStatus::Error)
                    .await;
                Err(err)
            }
        }
    }

    /// Launch a model end-to-end, blocking until every replica has loaded
    /// (`wait_ready=true` semantics). For `wait_ready=false`, use
    /// [`super::SupervisorHandle::launch_model`] instead, which detaches the
    /// protocol into a background task after this same claim step.
    pub async fn launch_model(&mut self, mut req: LaunchRequest) -> SupervisorResult<String> {
        let model_uid = self.begin_launch(&mut req)?;
        self.publish_creating(&model_uid, &req).await;
        self.run_protocol(&model_uid, &req).await?;
        Ok(model_uid)
    }

    /// The claim-only half of a launch, exposed so [`super::SupervisorHandle`]
    /// can return the synthesized UID immediately for `wait_ready=false`
    /// callers and run [`Supervisor::finish_launch`] in a detached task.
    pub fn begin_launch_public(&mut self, req: &mut LaunchRequest) -> SupervisorResult<String> {
        self.begin_launch(req)
    }

    /// The suspending half of a launch: publish CREATING and run the
    /// protocol. Companion to [`Supervisor::begin_launch_public`].
    pub async fn finish_launch(&mut self, model_uid: &str, req: &LaunchRequest) -> SupervisorResult<()> {
        self.publish_creating(model_uid, req).await;
        self.run_protocol(model_uid, req).await
    }

    async fn run_replicated_protocol(&mut self, model_uid: &str, req: &LaunchRequest) -> SupervisorResult<()> {
        let candidates = self.candidate_handles(req.worker_ip.as_deref())?;
        let use_collective = req.enable_xavier && req.engine_supports_collective && req.replica >= 2;

        let mut xavier_store: Option<(String, u16)> = None;
        if use_collective {
            let rank0_worker = PlacementSelector::choose(&candidates).await?;
            let rank0_uid = format!("{model_uid}-rank0");
            let world_size = req.replica + 1;
            let bootstrap = XavierConfig {
                store_address: String::new(),
                store_port: 0,
                rank: 0,
                world_size,
            };
            let (store_address, store_port) = rank0_worker
                .launch_rank0_model(model_uid, &bootstrap)
                .await
                .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;
            self.collective.create(model_uid, rank0_uid);
            if let Some(manager) = self.collective.manager(model_uid) {
                manager.register_rank(0, rank0_worker.address().to_string());
            }
            xavier_store = Some((store_address, store_port));
        }

        let mut ranks: Vec<(u32, String)> = Vec::new();
        for i in 0..req.replica {
            let worker = PlacementSelector::choose(&candidates).await?;
            let address = worker.address().to_string();
            let replica_uid = build_replica_uid(model_uid, i, req.replica);
            self.replicas.bind_worker(model_uid, i, req.replica, address.clone());

            let xavier_config = xavier_store.as_ref().map(|(store_address, store_port)| XavierConfig {
                store_address: store_address.clone(),
                store_port: *store_port,
                rank: i + 1,
                world_size: req.replica + 1,
            });
            let spec = LaunchSpec {
                model_uid: model_uid.to_string(),
                model_name: req.model_name.clone(),
                replica_uid: replica_uid.clone(),
                request_limits: req.request_limits,
                gpu_idx: gpu_slice(&req.gpu_idx, req.replica, i),
                shard: None,
                n_worker: None,
                driver_info: None,
                xavier_config,
            };
            worker
                .launch_builtin_model(spec)
                .await
                .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;
            worker
                .wait_for_load(&replica_uid)
                .await
                .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;

            if use_collective {
                ranks.push((i + 1, address));
            }
        }

        if use_collective {
            self.bring_up_collective(model_uid, req, &ranks).await?;
        }
        Ok(())
    }

    /// Kick off the state-transfer concurrently on every rank, then register
    /// every rank address with the `CollectiveManager` in strictly
    /// increasing rank order.
    async fn bring_up_collective(
        &self,
        model_uid: &str,
        req: &LaunchRequest,
        ranks: &[(u32, String)],
    ) -> SupervisorResult<()> {
        let all_addresses: Vec<String> = ranks.iter().map(|(_, addr)| addr.clone()).collect();

        let mut joins = Vec::new();
        for (rank, address) in ranks {
            let worker = self
                .workers
                .get_handle(address)
                .ok_or_else(|| SupervisorError::NotFound(format!("worker '{address}' vanished mid-launch")))?;
            let replica_uid = build_replica_uid(model_uid, rank - 1, req.replica);
            let addresses = all_addresses.clone();
            joins.push(tokio::spawn(async move {
                worker.start_transfer_for_vllm(&replica_uid, &addresses).await
            }));
        }
        for join in joins {
            join.await
                .map_err(|e| SupervisorError::Validation(format!("transfer task panicked: {e}")))?
                .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;
        }

        if let Some(manager) = self.collective.manager(model_uid) {
            for (rank, address) in ranks {
                manager.register_rank(*rank, address.clone());
            }
        }
        Ok(())
    }

    async fn run_sharded_protocol(&mut self, model_uid: &str, req: &LaunchRequest) -> SupervisorResult<()> {
        let candidates = self.candidate_handles(req.worker_ip.as_deref())?;
        if (req.n_worker as usize) > candidates.len() {
            return Err(SupervisorError::Validation(format!(
                "n_worker={} exceeds {} candidate workers",
                req.n_worker,
                candidates.len()
            )));
        }

        for i in 0..req.replica {
            let mut driver_info: Option<String> = None;
            let mut used: Vec<String> = Vec::new();
            let replica_uid = build_replica_uid(model_uid, i, req.replica);

            for shard in 0..req.n_worker {
                let pool: Vec<Arc<dyn WorkerHandle>> = candidates
                    .iter()
                    .filter(|w| !used.contains(&w.address().to_string()))
                    .cloned()
                    .collect();
                let pool = if pool.is_empty() { candidates.clone() } else { pool };
                let worker = PlacementSelector::choose(&pool).await?;
                let address = worker.address().to_string();
                used.push(address.clone());

                if shard > 1 {
                    debug_assert!(driver_info.is_some(), "shard > 1 expects driver_info from shard 0");
                }

                self.replicas.bind_worker(model_uid, i, req.replica, address);
                let spec = LaunchSpec {
                    model_uid: model_uid.to_string(),
                    model_name: req.model_name.clone(),
                    replica_uid: replica_uid.clone(),
                    request_limits: req.request_limits,
                    gpu_idx: gpu_slice(&req.gpu_idx, req.n_worker, shard),
                    shard: Some(shard),
                    n_worker: Some(req.n_worker),
                    driver_info: if shard == 0 { None } else { driver_info.clone() },
                    xavier_config: None,
                };
                let outcome = worker
                    .launch_builtin_model(spec)
                    .await
                    .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;
                if shard == 0 {
                    driver_info = outcome.driver_info;
                }
            }

            for worker_address in &used {
                if let Some(worker) = self.workers.get_handle(worker_address) {
                    worker
                        .wait_for_load(&replica_uid)
                        .await
                        .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;
                }
            }
        }
        Ok(())
    }

    /// Fan out `cancel_launch_model` to every worker currently bound to any
    /// replica slot, best-effort, then remove the `ReplicaInfo`.
    pub async fn cancel_launch(&mut self, model_uid: &str) -> SupervisorResult<()> {
        if !self.replicas.contains(model_uid) {
            return Err(SupervisorError::NotFound(format!("unknown model_uid '{model_uid}'")));
        }
        for replica_uid in self.replicas.replica_uids(model_uid) {
            let Some(worker_addresses) = self.replicas.workers_for_replica(&replica_uid).cloned() else {
                continue;
            };
            for address in worker_addresses {
                if let Some(worker) = self.workers.get_handle(&address) {
                    if let Err(err) = worker.cancel_launch_model(&replica_uid).await {
                        warn!(%replica_uid, %address, error = %err, "cancel_launch_model failed, continuing");
                    }
                }
            }
        }
        self.replicas.remove_model(model_uid);
        self.status_guard.remove_instance_info(model_uid).await;
        Ok(())
    }

    /// Arithmetic mean of `launching-{replica_uid}` progress over every
    /// replica slot that has reported any, `0.0` if none have.
    pub async fn launch_progress(&self, model_uid: &str) -> f64 {
        let mut total = 0.0;
        let mut count = 0;
        for replica_uid in self.replicas.replica_uids(model_uid) {
            if let Some(progress) = self
                .progress_tracker
                .get_progress(&format!("launching-{replica_uid}"))
                .await
            {
                total += progress;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total / f64::from(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::config::SupervisorConfig;
    use crate::supervisor::test_support::{FakeCacheTracker, FakeProgressTracker, FakeStatusGuard, FakeWorker};

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
    async fn replicated_launch_round_robins_across_replicas() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        let uid = sup.launch_model(base_request("m", 2)).await.unwrap();
        assert_eq!(uid, "m");
        assert_eq!(sup.replicas.replica_uids("m").len(), 2);
    }

    #[tokio::test]
    async fn duplicate_model_uid_rejected() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        let mut req = base_request("alpha", 1);
        req.model_uid = Some("alpha".to_string());
        sup.launch_model(req.clone()).await.unwrap();
        let err = sup.launch_model(req).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Validation(_)));
        assert_eq!(sup.replicas.get("alpha").unwrap().replica_count, 1);
    }

    #[tokio::test]
    async fn failed_launch_rolls_back() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1").failing_launch("boom"))).unwrap();
        let err = sup.launch_model(base_request("m", 1)).await.unwrap_err();
        assert!(matches!(err, SupervisorError::WorkerRpc { .. }));
        assert!(!sup.replicas.contains("m"));
    }

    #[tokio::test]
    async fn sharded_launch_requires_enough_workers() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        let mut req = base_request("m", 1);
        req.n_worker = 2;
        let err = sup.launch_model(req).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Validation(_)));
    }

    #[tokio::test]
    async fn sharded_launch_binds_all_shards() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.add_worker(Arc::new(FakeWorker::new("w2"))).unwrap();
        let mut req = base_request("m", 1);
        req.n_worker = 2;
        sup.launch_model(req).await.unwrap();
        let workers = sup.replicas.workers_for_replica("m-replica-0-of-1").unwrap();
        assert_eq!(workers.len(), 2);
    }

    #[tokio::test]
    async fn single_node_coerces_n_worker_to_one() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("self:9000"))).unwrap();
        let mut req = base_request("m", 1);
        req.n_worker = 4;
        sup.launch_model(req).await.unwrap();
        let workers = sup.replicas.workers_for_replica("m-replica-0-of-1").unwrap();
        assert_eq!(workers.len(), 1);
    }

    #[tokio::test]
    async fn replica_one_disables_xavier() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        let mut req = base_request("m", 1);
        req.enable_xavier = true;
        req.engine_supports_collective = true;
        sup.launch_model(req).await.unwrap();
        assert!(!sup.collective.contains("m"));
    }

    #[tokio::test]
    async fn collective_bring_up_creates_rank0_and_manager() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.add_worker(Arc::new(FakeWorker::new("w2"))).unwrap();
        let mut req = base_request("m", 2);
        req.enable_xavier = true;
        req.engine_supports_collective = true;
        sup.launch_model(req).await.unwrap();
        assert!(sup.collective.contains("m"));
        let ranks = sup.collective.manager("m").unwrap().ranks();
        assert_eq!(ranks.len(), 3);
        assert_eq!(ranks[0].0, 0);
        assert_eq!(ranks[1].0, 1);
        assert_eq!(ranks[2].0, 2);
    }

    #[tokio::test]
    async fn cancel_launch_removes_replica_info() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.launch_model(base_request("m", 1)).await.unwrap();
        sup.cancel_launch("m").await.unwrap();
        assert!(!sup.replicas.contains("m"));
    }

    #[tokio::test]
    async fn launch_progress_defaults_to_zero() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.launch_model(base_request("m", 1)).await.unwrap();
        assert_eq!(sup.launch_progress("m").await, 0.0);
    }
}
