// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The production entry point: [`SupervisorHandle`] serializes every caller
//! behind one `tokio::sync::Mutex<Supervisor>`, realizing the single-threaded
//! cooperative scheduler the design assumes (see the module-level
//! concurrency notes). It also owns the in-flight-launch bookkeeping needed
//! for `wait_ready=false` callers: `begin_launch` runs synchronously while
//! holding the lock (so two concurrent launches can never claim the same
//! UID), then the suspending remainder of the protocol either runs inline
//! (`wait_ready=true`) or is detached into its own task whose completion
//! handler clears its entry from the in-flight map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use super::config::SupervisorConfig;
use super::contract::{
    AbortToken, CacheTracker, ModelDescription, ModelTypeHandler, ProgressTracker, StatusGuard,
    WorkerHandle,
};
use super::errors::SupervisorResult;
use super::launch::LaunchRequest;
use super::registration::ShutdownHandle;
use super::state::Supervisor;
use super::status::{ModelListEntry, StatusSnapshot};
use super::types::{DeviceStatus, InstanceInfo, ModelUid, WorkerAddress};

/// Shared, lock-serialized handle to a running [`Supervisor`]. Clone freely;
/// every clone talks to the same underlying state.
#[derive(Clone)]
pub struct SupervisorHandle {
    inner: Arc<Mutex<Supervisor>>,
    in_flight: Arc<Mutex<HashMap<ModelUid, JoinHandle<()>>>>,
    shutdown: ShutdownHandle,
}

impl SupervisorHandle {
    /// Assemble a handle around a freshly-created [`Supervisor`].
    #[must_use]
    pub fn new(
        self_address: impl Into<String>,
        config: SupervisorConfig,
        status_guard: Arc<dyn StatusGuard>,
        cache_tracker: Arc<dyn CacheTracker>,
        progress_tracker: Arc<dyn ProgressTracker>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Supervisor::new(
                self_address,
                config,
                status_guard,
                cache_tracker,
                progress_tracker,
            ))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            shutdown: ShutdownHandle::new(),
        }
    }

    /// The raw lock-protected supervisor, for callers that need to drive it
    /// directly (such as [`super::spawn_health_monitor`], which must hold the
    /// lock for the duration of one sweep rather than one method call).
    #[must_use]
    pub fn shared(&self) -> Arc<Mutex<Supervisor>> {
        self.inner.clone()
    }

    /// The cooperative shutdown signal driven by [`Self::trigger_exit`] and
    /// [`Self::abort_cluster`].
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Register a model-type handler used by the Registration Broker.
    pub async fn register_model_handler(&self, handler: Arc<dyn ModelTypeHandler>) {
        self.inner.lock().await.register_model_handler(handler);
    }

    /// Register a worker. Fails if its address is already known.
    pub async fn add_worker(&self, worker: Arc<dyn WorkerHandle>) -> SupervisorResult<()> {
        self.inner.lock().await.add_worker(worker)
    }

    /// Remove a worker and purge every replica it was serving. Idempotent.
    pub async fn remove_worker(&self, address: &str) -> bool {
        self.inner.lock().await.remove_worker(address)
    }

    /// Ingest a status push from a worker.
    pub async fn report_status(&self, address: &str, status: HashMap<String, DeviceStatus>) {
        self.inner.lock().await.report_status(address, status);
    }

    /// All registered worker addresses.
    pub async fn list_workers(&self) -> Vec<WorkerAddress> {
        self.inner.lock().await.list_workers()
    }

    /// Find a registered worker by host fragment.
    pub async fn lookup_by_ip(&self, ip: &str) -> Option<WorkerAddress> {
        self.inner.lock().await.lookup_by_ip(ip)
    }

    /// `true` iff this is the degenerate single-node topology.
    pub async fn is_local_deployment(&self) -> bool {
        self.inner.lock().await.is_local_deployment()
    }

    /// Launch a model. When `req.wait_ready` is `true`, blocks until every
    /// replica has loaded (or rolled back on failure) before returning; when
    /// `false`, the claim step runs inline (so the returned UID is always
    /// valid immediately) and the remaining protocol runs detached, tracked
    /// in the in-flight launches map until it completes.
    pub async fn launch_model(&self, mut req: LaunchRequest) -> SupervisorResult<String> {
        let wait_ready = req.wait_ready;
        let model_uid = {
            let mut sup = self.inner.lock().await;
            sup.begin_launch_public(&mut req)?
        };

        if wait_ready {
            let mut sup = self.inner.lock().await;
            sup.finish_launch(&model_uid, &req).await?;
            return Ok(model_uid);
        }

        let inner = self.inner.clone();
        let in_flight = self.in_flight.clone();
        let uid_for_task = model_uid.clone();
        let task = tokio::spawn(async move {
            let result = {
                let mut sup = inner.lock().await;
                sup.finish_launch(&uid_for_task, &req).await
            };
            if let Err(err) = result {
                warn!(model_uid = %uid_for_task, error = %err, "detached launch failed");
            }
            in_flight.lock().await.remove(&uid_for_task);
        });
        self.in_flight.lock().await.insert(model_uid.clone(), task);
        Ok(model_uid)
    }

    /// Cancel a launch: aborts its detached task if still in flight, fans
    /// `cancel_launch_model` out to every bound worker best-effort, and
    /// removes the `ReplicaInfo`.
    pub async fn cancel_launch(&self, model_uid: &str) -> SupervisorResult<()> {
        if let Some(task) = self.in_flight.lock().await.remove(model_uid) {
            task.abort();
        }
        self.inner.lock().await.cancel_launch(model_uid).await
    }

    /// Arithmetic mean of reported progress across every replica slot.
    pub async fn launch_progress(&self, model_uid: &str) -> f64 {
        self.inner.lock().await.launch_progress(model_uid).await
    }

    /// Tear down every replica of `model_uid`.
    pub async fn terminate_model(&self, model_uid: &str, suppress_exception: bool) -> SupervisorResult<()> {
        if let Some(task) = self.in_flight.lock().await.remove(model_uid) {
            task.abort();
        }
        self.inner
            .lock()
            .await
            .terminate_model(model_uid, suppress_exception)
            .await
    }

    /// Resolve `model_uid` to a worker handle via round-robin.
    pub async fn get_model(&self, model_uid: &str) -> SupervisorResult<Arc<dyn WorkerHandle>> {
        self.inner.lock().await.get_model(model_uid)
    }

    /// Cancel an in-flight request, fanning the abort out across every
    /// replica of `model_uid`.
    pub async fn abort_request(
        &self,
        model_uid: &str,
        request_id: &str,
        block_duration_secs: u64,
    ) -> SupervisorResult<AbortToken> {
        self.inner
            .lock()
            .await
            .abort_request(model_uid, request_id, block_duration_secs)
            .await
    }

    /// Merge this supervisor's own device reading with every worker's.
    pub async fn cluster_device_info(&self, detailed: bool) -> HashMap<String, HashMap<String, DeviceStatus>> {
        self.inner.lock().await.cluster_device_info(detailed).await
    }

    /// The raw per-worker status map.
    pub async fn get_status(&self) -> StatusSnapshot {
        self.inner.lock().await.get_status()
    }

    /// Every live model, its replica count, and the workers serving it.
    pub async fn list_models(&self) -> Vec<ModelListEntry> {
        self.inner.lock().await.list_models().await
    }

    /// Describe `model_uid` using replica slot 0.
    pub async fn describe_model(&self, model_uid: &str) -> SupervisorResult<ModelDescription> {
        self.inner.lock().await.describe_model(model_uid).await
    }

    /// Delegate to the external Status Guard.
    pub async fn get_instance_info(&self, model_uid: &str) -> Option<InstanceInfo> {
        self.inner.lock().await.get_instance_info(model_uid).await
    }

    /// Delegate to the external Status Guard.
    pub async fn get_instance_count(&self) -> usize {
        self.inner.lock().await.get_instance_count().await
    }

    /// `{ supervisor_address }`.
    pub async fn get_supervisor_info(&self) -> String {
        self.inner.lock().await.get_supervisor_info()
    }

    /// Sequentially collect every worker's self-reported info.
    pub async fn get_workers_info(&self) -> Vec<String> {
        self.inner.lock().await.get_workers_info().await
    }

    /// Register a model version.
    pub async fn register_model(
        &self,
        model_type: &str,
        model_name: &str,
        model_path: &str,
        persist: bool,
        worker_ip: Option<&str>,
    ) -> SupervisorResult<()> {
        self.inner
            .lock()
            .await
            .register_model(model_type, model_name, model_path, persist, worker_ip)
            .await
    }

    /// Unregister a model version.
    pub async fn unregister_model(
        &self,
        model_type: &str,
        model_name: &str,
        version: &str,
    ) -> SupervisorResult<()> {
        self.inner
            .lock()
            .await
            .unregister_model(model_type, model_name, version)
            .await
    }

    /// Cached model versions, optionally targeted at one worker.
    pub async fn list_cached_models(
        &self,
        model_name: Option<&str>,
        worker_ip: Option<&str>,
    ) -> SupervisorResult<Vec<String>> {
        self.inner.lock().await.list_cached_models(model_name, worker_ip).await
    }

    /// Model versions eligible for deletion, unioned across every worker.
    pub async fn list_deletable_models(&self, model_version: &str) -> Vec<String> {
        self.inner.lock().await.list_deletable_models(model_version).await
    }

    /// Confirm and remove a cached model version.
    pub async fn confirm_and_remove_model(
        &self,
        model_version: &str,
        worker_ip: Option<&str>,
    ) -> SupervisorResult<bool> {
        self.inner
            .lock()
            .await
            .confirm_and_remove_model(model_version, worker_ip)
            .await
    }

    /// Forward an operation to the `CollectiveManager` for `model_uid`.
    pub async fn call_collective_manager(&self, model_uid: &str, op: &str) -> SupervisorResult<Vec<(u32, String)>> {
        self.inner.lock().await.call_collective_manager(model_uid, op)
    }

    /// Ask the process to shut down gracefully.
    pub async fn trigger_exit(&self) -> bool {
        self.inner.lock().await.trigger_exit(&self.shutdown)
    }

    /// Ask every worker to exit, then trigger this supervisor's own exit.
    pub async fn abort_cluster(&self) -> bool {
        self.inner.lock().await.abort_cluster(&self.shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::test_support::{FakeCacheTracker, FakeProgressTracker, FakeStatusGuard, FakeWorker};

    fn new_handle() -> SupervisorHandle {
        SupervisorHandle::new(
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
    async fn wait_ready_launch_is_visible_immediately() {
        let handle = new_handle();
        handle.add_worker(Arc::new(FakeWorker::new("w1"))).await.unwrap();
        let uid = handle.launch_model(base_request("m", 1)).await.unwrap();
        assert_eq!(uid, "m");
        assert_eq!(handle.list_models().await.len(), 1);
    }

    #[tokio::test]
    async fn detached_launch_completes_in_background() {
        let handle = new_handle();
        handle.add_worker(Arc::new(FakeWorker::new("w1"))).await.unwrap();
        let mut req = base_request("m", 1);
        req.wait_ready = false;
        let uid = handle.launch_model(req).await.unwrap();
        assert_eq!(uid, "m");

        for _ in 0..50 {
            if !handle.list_models().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(handle.list_models().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_launches_never_collide_on_uid() {
        let handle = new_handle();
        handle.add_worker(Arc::new(FakeWorker::new("w1"))).await.unwrap();
        let mut req = base_request("alpha", 1);
        req.model_uid = Some("alpha".to_string());
        let (a, b) = tokio::join!(
            handle.launch_model(req.clone()),
            handle.launch_model(req.clone())
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn terminate_aborts_in_flight_launch() {
        let handle = new_handle();
        handle.add_worker(Arc::new(FakeWorker::new("w1"))).await.unwrap();
        let mut req = base_request("m", 1);
        req.wait_ready = false;
        handle.launch_model(req).await.unwrap();
        handle.terminate_model("m", true).await.unwrap();
        assert!(handle.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn trigger_exit_reports_false_second_time() {
        let handle = new_handle();
        assert!(handle.trigger_exit().await);
        assert!(!handle.trigger_exit().await);
    }
}
