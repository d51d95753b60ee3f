// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component J: the Registration Broker.

use tracing::warn;

use super::errors::{SupervisorError, SupervisorResult};
use super::state::Supervisor;

impl Supervisor {
    /// Register a model version, either forwarding to a pinned worker or
    /// applying locally through the matching [`super::contract::ModelTypeHandler`].
    ///
    /// On a post-registration failure the matching `unregister` is called
    /// with the error suppressed *before* the original error is re-raised,
    /// so a failed registration never leaves a half-registered model in the
    /// catalog.
    pub async fn register_model(
        &self,
        model_type: &str,
        model_name: &str,
        model_path: &str,
        persist: bool,
        worker_ip: Option<&str>,
    ) -> SupervisorResult<()> {
        if let Some(ip) = worker_ip {
            if !self.is_local_deployment() {
                let address = self
                    .lookup_by_ip(ip)
                    .ok_or_else(|| SupervisorError::NotFound(format!("no worker matching ip '{ip}'")))?;
                let worker = self
                    .workers
                    .get_handle(&address)
                    .ok_or_else(|| SupervisorError::NotFound(format!("worker '{address}' has no handle")))?;
                return worker
                    .register_model(model_type, model_path, persist)
                    .await
                    .map_err(|e| SupervisorError::worker_rpc(model_name, e));
            }
        }

        let handler = self
            .model_handlers
            .get(model_type)
            .ok_or_else(|| SupervisorError::Unsupported(model_type.to_string()))?;

        match handler.register(model_name, model_path).await {
            Ok(version) => {
                self.cache_tracker.record_model_version(model_type, &version).await;
                Ok(())
            }
            Err(err) => {
                if let Err(unregister_err) = handler.unregister(model_name, "unknown").await {
                    warn!(model_name, error = %unregister_err, "rollback unregister after failed registration also failed");
                }
                Err(err)
            }
        }
    }

    /// Unregister a model version, broadcasting to every worker in
    /// multi-node mode and telling the cache tracker to drop the version.
    pub async fn unregister_model(&self, model_type: &str, model_name: &str, version: &str) -> SupervisorResult<()> {
        let handler = self
            .model_handlers
            .get(model_type)
            .ok_or_else(|| SupervisorError::Unsupported(model_type.to_string()))?;

        handler.unregister(model_name, version).await?;
        self.cache_tracker.unregister_model_version(model_type, version).await;

        if !self.is_local_deployment() {
            for address in self.list_workers() {
                let Some(worker) = self.workers.get_handle(&address) else {
                    continue;
                };
                if let Err(err) = worker.unregister_model(model_type, model_name).await {
                    warn!(%address, error = %err, "broadcast unregister_model failed, continuing");
                }
            }
        }
        Ok(())
    }

    /// Cached model versions, optionally targeted at one worker, otherwise
    /// unioned across every worker.
    pub async fn list_cached_models(&self, model_name: Option<&str>, worker_ip: Option<&str>) -> SupervisorResult<Vec<String>> {
        if let Some(ip) = worker_ip {
            let address = self
                .lookup_by_ip(ip)
                .ok_or_else(|| SupervisorError::NotFound(format!("no worker matching ip '{ip}'")))?;
            let worker = self
                .workers
                .get_handle(&address)
                .ok_or_else(|| SupervisorError::NotFound(format!("worker '{address}' has no handle")))?;
            return worker
                .list_cached_models(model_name)
                .await
                .map_err(|e| SupervisorError::worker_rpc(address, e));
        }

        let mut union = Vec::new();
        for address in self.list_workers() {
            let Some(worker) = self.workers.get_handle(&address) else {
                continue;
            };
            if let Ok(models) = worker.list_cached_models(model_name).await {
                union.extend(models);
            }
        }
        union.sort();
        union.dedup();
        Ok(union)
    }

    /// Model versions eligible for deletion, unioned across every worker.
    pub async fn list_deletable_models(&self, model_version: &str) -> Vec<String> {
        let mut union = Vec::new();
        for address in self.list_workers() {
            let Some(worker) = self.workers.get_handle(&address) else {
                continue;
            };
            if let Ok(models) = worker.list_deletable_models(model_version).await {
                union.extend(models);
            }
        }
        union.sort();
        union.dedup();
        union
    }

    /// Confirm and remove a cached model version. Targeted at one worker
    /// when `worker_ip` is given; otherwise every worker must confirm
    /// removal (logical AND) for the overall result to be `true`.
    pub async fn confirm_and_remove_model(&self, model_version: &str, worker_ip: Option<&str>) -> SupervisorResult<bool> {
        if let Some(ip) = worker_ip {
            let address = self
                .lookup_by_ip(ip)
                .ok_or_else(|| SupervisorError::NotFound(format!("no worker matching ip '{ip}'")))?;
            let worker = self
                .workers
                .get_handle(&address)
                .ok_or_else(|| SupervisorError::NotFound(format!("worker '{address}' has no handle")))?;
            return worker
                .confirm_and_remove_model(model_version)
                .await
                .map_err(|e| SupervisorError::worker_rpc(address, e));
        }

        let mut all_confirmed = true;
        for address in self.list_workers() {
            let Some(worker) = self.workers.get_handle(&address) else {
                continue;
            };
            match worker.confirm_and_remove_model(model_version).await {
                Ok(confirmed) => all_confirmed &= confirmed,
                Err(err) => {
                    warn!(%address, error = %err, "confirm_and_remove_model failed");
                    all_confirmed = false;
                }
            }
        }
        Ok(all_confirmed)
    }

    /// Forward an operation to the `CollectiveManager` for `model_uid`, used
    /// by workers that cannot address each other's collective actors
    /// directly.
    pub fn call_collective_manager(&self, model_uid: &str, _op: &str) -> SupervisorResult<Vec<(u32, String)>> {
        self.collective
            .manager(model_uid)
            .map(super::collective::CollectiveManager::ranks)
            .ok_or_else(|| SupervisorError::NotFound(format!("no collective manager for '{model_uid}'")))
    }

    /// Ask the process to shut down gracefully. Returns `false` if the
    /// shutdown signal was already sent.
    pub fn trigger_exit(&self, shutdown: &ShutdownHandle) -> bool {
        shutdown.trigger()
    }

    /// Ask every worker to exit, AND-reducing their booleans, then trigger
    /// this supervisor's own exit.
    pub async fn abort_cluster(&self, shutdown: &ShutdownHandle) -> bool {
        let mut all_exited = true;
        for address in self.list_workers() {
            let Some(worker) = self.workers.get_handle(&address) else {
                continue;
            };
            match worker.trigger_exit().await {
                Ok(exited) => all_exited &= exited,
                Err(err) => {
                    warn!(%address, error = %err, "trigger_exit failed during abort_cluster");
                    all_exited = false;
                }
            }
        }
        all_exited & self.trigger_exit(shutdown)
    }
}

/// Cooperative shutdown signal: a `trigger_exit`/`abort_cluster` fires it
/// once; anything awaiting [`ShutdownHandle::wait`] wakes up. A second
/// `trigger` call is a no-op and reports failure, matching "already closed".
#[derive(Debug, Default)]
pub struct ShutdownHandle {
    notify: std::sync::Arc<tokio::sync::Notify>,
    closed: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ShutdownHandle {
    /// A fresh, untriggered shutdown handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the shutdown signal. Returns `false` (and logs) if it was
    /// already fired.
    pub fn trigger(&self) -> bool {
        if self.closed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            warn!("trigger_exit called on an already-closed shutdown channel");
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    /// Wait for the shutdown signal to fire.
    pub async fn wait(&self) {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        Self {
            notify: self.notify.clone(),
            closed: self.closed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::config::SupervisorConfig;
    use super::super::test_support::{FakeCacheTracker, FakeModelTypeHandler, FakeProgressTracker, FakeStatusGuard, FakeWorker};
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

    #[tokio::test]
    async fn register_model_records_version_in_cache() {
        let mut sup = new_supervisor();
        sup.register_model_handler(Arc::new(FakeModelTypeHandler::new("llm")));
        sup.register_model("llm", "my-model", "/models/my-model", true, None)
            .await
            .unwrap();
        assert_eq!(sup.cache_tracker.get_model_versions("llm").await, vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn failed_registration_rolls_back_via_unregister() {
        let mut sup = new_supervisor();
        let handler = Arc::new(FakeModelTypeHandler::new("llm").failing_register());
        sup.register_model_handler(handler.clone());
        let err = sup
            .register_model("llm", "my-model", "/models/my-model", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Validation(_)));
        assert_eq!(handler.unregistered_calls(), vec!["my-model".to_string()]);
    }

    #[tokio::test]
    async fn unknown_model_type_is_unsupported() {
        let sup = new_supervisor();
        let err = sup
            .register_model("unknown", "m", "/m", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Unsupported(_)));
    }

    #[tokio::test]
    async fn confirm_and_remove_requires_all_workers() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.add_worker(Arc::new(FakeWorker::new("w2"))).unwrap();
        let confirmed = sup.confirm_and_remove_model("v1", None).await.unwrap();
        assert!(confirmed);
    }

    #[tokio::test]
    async fn shutdown_handle_reports_false_when_already_closed() {
        let shutdown = ShutdownHandle::new();
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
    }

    #[tokio::test]
    async fn abort_cluster_and_reduces_worker_exits() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        let shutdown = ShutdownHandle::new();
        assert!(sup.abort_cluster(&shutdown).await);
    }
}
