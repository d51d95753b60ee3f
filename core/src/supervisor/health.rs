// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component G: the Health Monitor.
//!
//! The sweep itself ([`Supervisor::health_tick`]) is a plain method so it
//! can be driven directly by tests; [`spawn_health_monitor`] is the
//! production entry point that runs it periodically on its own scheduling
//! domain, per the concurrency model's "second scheduling domain".

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use super::state::Supervisor;
use super::types::ModelUid;

impl Supervisor {
    /// One health sweep: age every worker's status, evict the ones that hit
    /// zero, and purge every model a dead worker was serving. Returns the
    /// model UIDs purged this tick, for logging by the caller.
    ///
    /// Never panics on a missing entry — a worker that was removed between
    /// the eviction check and the purge step is simply skipped, matching
    /// the "sweep never throws" design.
    pub fn health_tick(&mut self) -> Vec<ModelUid> {
        let dead = self.workers.tick_health(self.config.health_check_timeout);
        let mut purged = Vec::new();
        for address in &dead {
            let affected = self.replicas.models_affected_by_worker(address);
            for model_uid in &affected {
                self.replicas.remove_model(model_uid);
                self.collective.destroy(model_uid);
                purged.push(model_uid.clone());
            }
            self.workers.remove_worker(address);
            if !affected.is_empty() {
                warn!(address, ?affected, "evicted worker invalidated models");
            }
        }
        purged
    }
}

/// Handle to a running health-monitor loop; dropping it does not stop the
/// loop (use [`HealthMonitorHandle::stop`]).
pub struct HealthMonitorHandle {
    task: tokio::task::JoinHandle<()>,
}

impl HealthMonitorHandle {
    /// Abort the background sweep loop.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Spawn the periodic sweep loop as its own `tokio::task`, a scheduling
/// domain independent of any caller's request/response path. Returns `None`
/// if `disable_health_monitor` is set (used by tests that want full control
/// over eviction timing).
pub fn spawn_health_monitor(supervisor: Arc<Mutex<Supervisor>>) -> Option<HealthMonitorHandle> {
    let interval_secs = {
        let guard = supervisor.try_lock().expect("supervisor must be unshared at startup");
        if guard.config.disable_health_monitor {
            return None;
        }
        guard.config.health_check_interval
    };

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let purged = {
                let mut guard = supervisor.lock().await;
                guard.health_tick()
            };
            if !purged.is_empty() {
                warn!(?purged, "health sweep purged models");
            }
        }
    });

    Some(HealthMonitorHandle { task })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::config::SupervisorConfig;
    use super::super::test_support::{FakeCacheTracker, FakeProgressTracker, FakeStatusGuard, FakeWorker};
    use super::*;

    fn new_supervisor() -> Supervisor {
        Supervisor::new(
            "self:9000",
            SupervisorConfig {
                health_check_timeout: 1,
                health_check_failure_threshold: 2,
                ..SupervisorConfig::default()
            },
            Arc::new(FakeStatusGuard::default()),
            Arc::new(FakeCacheTracker::default()),
            Arc::new(FakeProgressTracker),
        )
    }

    #[tokio::test]
    async fn dead_worker_purges_its_models_only() {
        let mut sup = new_supervisor();
        sup.add_worker(Arc::new(FakeWorker::new("good"))).unwrap();
        sup.add_worker(Arc::new(FakeWorker::new("bad"))).unwrap();
        sup.replicas.insert("x".into(), 1);
        sup.replicas.bind_worker("x", 0, 1, "good".into());
        sup.replicas.insert("y".into(), 1);
        sup.replicas.bind_worker("y", 0, 1, "bad".into());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        sup.workers.report_status("good", Default::default());
        let purged = sup.health_tick();
        assert!(purged.is_empty());
        assert!(sup.list_workers().contains(&"bad".to_string()));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        sup.workers.report_status("good", Default::default());
        let purged = sup.health_tick();
        assert_eq!(purged, vec!["y".to_string()]);
        assert!(sup.replicas.contains("x"));
        assert!(!sup.replicas.contains("y"));
        assert!(!sup.list_workers().contains(&"bad".to_string()));
        assert!(sup.list_workers().contains(&"good".to_string()));
    }
}
