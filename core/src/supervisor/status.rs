// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component I: the Status & Progress Surface.

use std::collections::HashMap;

use super::contract::ModelDescription;
use super::errors::{SupervisorError, SupervisorResult};
use super::state::Supervisor;
use super::types::{build_replica_uid, DeviceStatus, InstanceInfo};

/// One row of [`Supervisor::list_models`]: a live model's UID, replica
/// count, and every worker address currently serving any of its replicas.
#[derive(Debug, Clone)]
pub struct ModelListEntry {
    /// The model's unique identifier.
    pub model_uid: String,
    /// Number of replicas.
    pub replica: u32,
    /// Every worker address serving at least one of its replicas.
    pub worker_addresses: Vec<String>,
}

/// Snapshot returned by [`Supervisor::get_status`]: per-worker device status
/// and the set of known workers, mirroring the raw worker-status map the
/// original supervisor exposes.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// `address -> last reported status map`.
    pub worker_status: HashMap<String, HashMap<String, DeviceStatus>>,
}

impl Supervisor {
    /// Merge this supervisor's own (always-empty, since it runs no
    /// inference) device reading with every worker's last-reported status.
    /// When `detailed` is `false`, GPU memory fields are summed into a
    /// single synthetic entry per worker rather than reported per-device.
    pub async fn cluster_device_info(&self, detailed: bool) -> HashMap<String, HashMap<String, DeviceStatus>> {
        let mut info = HashMap::new();
        for address in self.list_workers() {
            let Some(worker) = self.workers.get_handle(&address) else {
                continue;
            };
            let Ok(status) = worker.get_status().await else {
                continue;
            };
            if detailed {
                info.insert(address, status);
                continue;
            }
            let mut total_memory = 0u64;
            let mut used_memory = 0u64;
            for device in status.values() {
                if let DeviceStatus::Gpu { memory_total, memory_used, .. } = device {
                    total_memory += memory_total;
                    used_memory += memory_used;
                }
            }
            let mut summary = HashMap::new();
            summary.insert(
                "gpu_summary".to_string(),
                DeviceStatus::Gpu {
                    index: 0,
                    memory_total: total_memory,
                    memory_used: used_memory,
                },
            );
            info.insert(address, summary);
        }
        info
    }

    /// The raw per-worker status map, as last ingested by `report_status`.
    #[must_use]
    pub fn get_status(&self) -> StatusSnapshot {
        let mut worker_status = HashMap::new();
        for address in self.list_workers() {
            if let Some(entry) = self.workers.get_entry(&address) {
                worker_status.insert(address, entry.last_status.clone());
            }
        }
        StatusSnapshot { worker_status }
    }

    /// Every live model UID, its replica count, and the workers serving it.
    pub async fn list_models(&self) -> Vec<ModelListEntry> {
        let mut entries = Vec::new();
        for model_uid in self.replicas.list_models() {
            let Some(info) = self.replicas.get(&model_uid) else {
                continue;
            };
            let mut workers = Vec::new();
            for replica_uid in self.replicas.replica_uids(&model_uid) {
                if let Some(bound) = self.replicas.workers_for_replica(&replica_uid) {
                    workers.extend(bound.iter().cloned());
                }
            }
            workers.sort();
            workers.dedup();
            entries.push(ModelListEntry {
                model_uid,
                replica: info.replica_count,
                worker_addresses: workers,
            });
        }
        entries
    }

    /// Describe `model_uid` using replica slot 0 explicitly, without
    /// consuming the round-robin cursor.
    pub async fn describe_model(&self, model_uid: &str) -> SupervisorResult<ModelDescription> {
        let info = self
            .replicas
            .get(model_uid)
            .ok_or_else(|| SupervisorError::NotFound(format!("unknown model_uid '{model_uid}'")))?;
        let replica_uid = build_replica_uid(model_uid, 0, info.replica_count);
        let worker_address = self
            .replicas
            .workers_for_replica(&replica_uid)
            .and_then(|workers| workers.first())
            .ok_or_else(|| SupervisorError::NotFound(format!("no worker bound to replica '{replica_uid}'")))?;
        let worker = self
            .workers
            .get_handle(worker_address)
            .ok_or_else(|| SupervisorError::NotFound(format!("worker '{worker_address}' has no handle")))?;
        let mut description = worker
            .describe_model(&replica_uid)
            .await
            .map_err(|e| SupervisorError::worker_rpc(model_uid, e))?;
        description.replica = info.replica_count;
        Ok(description)
    }

    /// Delegate to the external Status Guard.
    pub async fn get_instance_info(&self, model_uid: &str) -> Option<InstanceInfo> {
        self.status_guard.get_instance_info(model_uid).await
    }

    /// Delegate to the external Status Guard.
    pub async fn get_instance_count(&self) -> usize {
        self.status_guard.get_instance_count().await
    }

    /// `{ supervisor_address }`.
    #[must_use]
    pub fn get_supervisor_info(&self) -> String {
        self.self_address().to_string()
    }

    /// Sequentially collect every worker's self-reported info, matching the
    /// original's back-pressure-preserving fan-out rather than a concurrent
    /// one.
    pub async fn get_workers_info(&self) -> Vec<String> {
        let mut info = Vec::new();
        for address in self.list_workers() {
            let Some(worker) = self.workers.get_handle(&address) else {
                continue;
            };
            match worker.get_worker_info().await {
                Ok(description) => info.push(description),
                Err(err) => {
                    tracing::debug!(%address, error = %err, "get_worker_info failed, skipping");
                }
            }
        }
        info
    }
}
