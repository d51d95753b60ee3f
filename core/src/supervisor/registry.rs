// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component A: the Worker Registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::contract::WorkerHandle;
use super::errors::{SupervisorError, SupervisorResult};
use super::types::{DeviceStatus, WorkerAddress, WorkerEntry};

/// Directory of known workers: address, last reported status, and health
/// countdown. Mutated only through these methods; every operation here is
/// O(1) except [`WorkerRegistry::remove_worker`], which is O(replicas) and
/// is driven by the health monitor and explicit removal requests.
pub struct WorkerRegistry {
    workers: HashMap<WorkerAddress, WorkerEntry>,
    handles: HashMap<WorkerAddress, Arc<dyn WorkerHandle>>,
    failure_threshold: u32,
}

impl WorkerRegistry {
    /// Create an empty registry with the given eviction threshold.
    #[must_use]
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            workers: HashMap::new(),
            handles: HashMap::new(),
            failure_threshold,
        }
    }

    /// Add a worker. Fails if the address is already registered.
    pub fn add_worker(
        &mut self,
        handle: Arc<dyn WorkerHandle>,
    ) -> SupervisorResult<()> {
        let address = handle.address().to_string();
        if self.workers.contains_key(&address) {
            return Err(SupervisorError::WorkerRegistry(format!(
                "worker '{address}' already registered"
            )));
        }
        self.workers
            .insert(address.clone(), WorkerEntry::new(address.clone(), self.failure_threshold));
        self.handles.insert(address, handle);
        Ok(())
    }

    /// Remove a worker. Idempotent: removing an absent address is a no-op
    /// and returns `false`.
    pub fn remove_worker(&mut self, address: &str) -> bool {
        let removed = self.workers.remove(address).is_some();
        self.handles.remove(address);
        removed
    }

    /// Ingest a status push from a worker, resetting its failure countdown.
    pub fn report_status(&mut self, address: &str, status: HashMap<String, DeviceStatus>) {
        if let Some(entry) = self.workers.get_mut(address) {
            entry.last_status = status;
            entry.last_update_time = Utc::now();
            entry.failure_remaining = self.failure_threshold;
        } else {
            debug!(address, "status report from unregistered worker ignored");
        }
    }

    /// Handle to a registered worker, if present.
    #[must_use]
    pub fn get_handle(&self, address: &str) -> Option<Arc<dyn WorkerHandle>> {
        self.handles.get(address).cloned()
    }

    /// Registry entry for a worker, if present.
    #[must_use]
    pub fn get_entry(&self, address: &str) -> Option<&WorkerEntry> {
        self.workers.get(address)
    }

    /// All registered worker addresses.
    #[must_use]
    pub fn list(&self) -> Vec<WorkerAddress> {
        self.workers.keys().cloned().collect()
    }

    /// Find the first registered worker whose address contains the given
    /// host fragment (mirrors a loose IP-based lookup used by targeted
    /// operations).
    #[must_use]
    pub fn lookup_by_ip(&self, ip: &str) -> Option<WorkerAddress> {
        self.workers.keys().find(|addr| addr.contains(ip)).cloned()
    }

    /// `true` iff exactly one worker is registered and it is `self_address`.
    #[must_use]
    pub fn is_local_deployment(&self, self_address: &str) -> bool {
        self.workers.len() == 1 && self.workers.contains_key(self_address)
    }

    /// Advance every worker's failure countdown for one health sweep tick.
    /// Workers whose last update is within `timeout_secs` get their budget
    /// reset; stale ones are decremented. Returns the addresses that hit
    /// zero and must be evicted.
    pub fn tick_health(&mut self, timeout_secs: u64) -> Vec<WorkerAddress> {
        let now = Utc::now();
        let timeout = Duration::seconds(timeout_secs as i64);
        let mut dead = Vec::new();
        for (address, entry) in &mut self.workers {
            if now.signed_duration_since(entry.last_update_time) > timeout {
                entry.failure_remaining = entry.failure_remaining.saturating_sub(1);
                if entry.failure_remaining == 0 {
                    dead.push(address.clone());
                }
            } else {
                entry.failure_remaining = self.failure_threshold;
            }
        }
        if !dead.is_empty() {
            warn!(?dead, "workers failed health check");
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::test_support::FakeWorker;

    #[test]
    fn add_and_remove_worker() {
        let mut reg = WorkerRegistry::new(3);
        let w = FakeWorker::new("10.0.0.1:9000");
        reg.add_worker(Arc::new(w)).unwrap();
        assert_eq!(reg.list(), vec!["10.0.0.1:9000".to_string()]);
        assert!(reg.remove_worker("10.0.0.1:9000"));
        assert!(!reg.remove_worker("10.0.0.1:9000"));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn duplicate_add_rejected() {
        let mut reg = WorkerRegistry::new(3);
        reg.add_worker(Arc::new(FakeWorker::new("a"))).unwrap();
        assert!(reg.add_worker(Arc::new(FakeWorker::new("a"))).is_err());
    }

    #[test]
    fn health_tick_decrements_and_evicts() {
        let mut reg = WorkerRegistry::new(2);
        reg.add_worker(Arc::new(FakeWorker::new("a"))).unwrap();
        reg.workers.get_mut("a").unwrap().last_update_time = Utc::now() - Duration::seconds(1);
        let dead = reg.tick_health(0);
        assert!(dead.is_empty());
        assert_eq!(reg.get_entry("a").unwrap().failure_remaining, 1);
        let dead = reg.tick_health(0);
        assert_eq!(dead, vec!["a".to_string()]);
    }

    #[test]
    fn local_deployment_detection() {
        let mut reg = WorkerRegistry::new(3);
        reg.add_worker(Arc::new(FakeWorker::new("self"))).unwrap();
        assert!(reg.is_local_deployment("self"));
        reg.add_worker(Arc::new(FakeWorker::new("other"))).unwrap();
        assert!(!reg.is_local_deployment("self"));
    }
}
