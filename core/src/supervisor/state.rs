// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `Supervisor` struct: the single owner of every mutable registry.
//!
//! Every other file under this module adds an `impl Supervisor` block for
//! one component (launch, terminate, router, health, status, registration)
//! rather than defining its own top-level type. The struct itself only
//! assembles state and exposes Component A's worker-directory operations
//! directly, since they do not warrant their own file beyond
//! [`super::registry`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::collective::CollectiveState;
use super::config::SupervisorConfig;
use super::contract::{CacheTracker, ModelTypeHandler, ProgressTracker, StatusGuard, WorkerHandle};
use super::errors::SupervisorResult;
use super::registry::WorkerRegistry;
use super::replica::ReplicaRegistry;
use super::types::WorkerAddress;

/// The control-plane core: worker and replica registries, collective
/// auxiliary state, the registration broker's per-type dispatch table, and
/// handles to the three external services it relies on but does not own.
///
/// Every method that mutates state takes `&mut self`; concurrent access is
/// the caller's responsibility. [`super::SupervisorHandle`] is the
/// production entry point and serializes callers for you.
pub struct Supervisor {
    pub(super) self_address: String,
    pub(super) config: SupervisorConfig,
    pub(super) workers: WorkerRegistry,
    pub(super) replicas: ReplicaRegistry,
    pub(super) collective: CollectiveState,
    pub(super) model_handlers: HashMap<String, Arc<dyn ModelTypeHandler>>,
    pub(super) status_guard: Arc<dyn StatusGuard>,
    pub(super) cache_tracker: Arc<dyn CacheTracker>,
    pub(super) progress_tracker: Arc<dyn ProgressTracker>,
}

impl Supervisor {
    /// Assemble a supervisor with empty registries.
    #[must_use]
    pub fn new(
        self_address: impl Into<String>,
        config: SupervisorConfig,
        status_guard: Arc<dyn StatusGuard>,
        cache_tracker: Arc<dyn CacheTracker>,
        progress_tracker: Arc<dyn ProgressTracker>,
    ) -> Self {
        let failure_threshold = config.health_check_failure_threshold;
        Self {
            self_address: self_address.into(),
            config,
            workers: WorkerRegistry::new(failure_threshold),
            replicas: ReplicaRegistry::new(),
            collective: CollectiveState::new(),
            model_handlers: HashMap::new(),
            status_guard,
            cache_tracker,
            progress_tracker,
        }
    }

    /// Register a model-type handler under its `spec_class`, used by the
    /// Registration Broker's dispatch table (§4.J).
    pub fn register_model_handler(&mut self, handler: Arc<dyn ModelTypeHandler>) {
        self.model_handlers
            .insert(handler.spec_class().to_string(), handler);
    }

    /// This supervisor's own network address.
    #[must_use]
    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Register a worker. Fails if its address is already known.
    pub fn add_worker(&mut self, handle: Arc<dyn WorkerHandle>) -> SupervisorResult<()> {
        self.workers.add_worker(handle)
    }

    /// Remove a worker and purge every replica it was serving, the same
    /// cleanup the Health Monitor performs on eviction. Idempotent.
    pub fn remove_worker(&mut self, address: &str) -> bool {
        let affected = self.replicas.models_affected_by_worker(address);
        for model_uid in &affected {
            self.replicas.remove_model(model_uid);
        }
        let removed = self.workers.remove_worker(address);
        if !affected.is_empty() {
            debug!(address, ?affected, "worker removal purged affected models");
        }
        removed
    }

    /// Ingest a status push from a worker.
    pub fn report_status(
        &mut self,
        address: &str,
        status: HashMap<String, super::types::DeviceStatus>,
    ) {
        self.workers.report_status(address, status);
    }

    /// All registered worker addresses.
    #[must_use]
    pub fn list_workers(&self) -> Vec<WorkerAddress> {
        self.workers.list()
    }

    /// Find a registered worker by host fragment.
    #[must_use]
    pub fn lookup_by_ip(&self, ip: &str) -> Option<WorkerAddress> {
        self.workers.lookup_by_ip(ip)
    }

    /// `true` iff exactly one worker is registered and it is this supervisor
    /// itself (the degenerate single-node topology).
    #[must_use]
    pub fn is_local_deployment(&self) -> bool {
        self.workers.is_local_deployment(&self.self_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn add_and_remove_worker_purges_replicas() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("w1"))).unwrap();
        sup.replicas.insert("m".into(), 1);
        sup.replicas.bind_worker("m", 0, 1, "w1".into());
        assert!(sup.remove_worker("w1"));
        assert!(!sup.replicas.contains("m"));
    }

    #[test]
    fn local_deployment_reflects_registry() {
        let mut sup = new_supervisor();
        assert!(!sup.is_local_deployment());
        sup.add_worker(Arc::new(FakeWorker::new("self:9000"))).unwrap();
        assert!(sup.is_local_deployment());
    }
}
