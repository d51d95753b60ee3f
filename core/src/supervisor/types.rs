// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Core data model: workers, replicas, instance info and the replica UID
//! encoding shared by every supervisor component.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network address of a worker, used as its registry key.
pub type WorkerAddress = String;

/// User-facing model identifier.
pub type ModelUid = String;

/// Synthetic per-replica key, see [`build_replica_uid`].
pub type ReplicaUid = String;

/// Minimum accepted length for a `model_uid`.
pub const MIN_MODEL_UID_LEN: usize = 1;

/// Maximum accepted length for a `model_uid`.
pub const MAX_MODEL_UID_LEN: usize = 100;

/// A resource reading reported by a worker for one of its devices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum DeviceStatus {
    /// CPU/host memory reading.
    Cpu {
        /// Total system memory, bytes.
        memory_total: u64,
        /// Memory currently in use, bytes.
        memory_used: u64,
    },
    /// A single GPU's reading.
    Gpu {
        /// GPU ordinal on the worker.
        index: u32,
        /// Total device memory, bytes.
        memory_total: u64,
        /// Memory currently in use, bytes.
        memory_used: u64,
    },
}

/// Everything the supervisor knows about one worker between health sweeps.
#[derive(Debug, Clone)]
pub struct WorkerEntry {
    /// The worker's network address; unique registry key.
    pub address: WorkerAddress,
    /// Last status map reported by the worker, keyed by resource name.
    pub last_status: HashMap<String, DeviceStatus>,
    /// Timestamp of the last status ingest.
    pub last_update_time: DateTime<Utc>,
    /// Remaining consecutive stale sweeps before eviction.
    pub failure_remaining: u32,
}

impl WorkerEntry {
    /// Create a freshly-registered worker entry with a full failure budget.
    #[must_use]
    pub fn new(address: WorkerAddress, failure_threshold: u32) -> Self {
        Self {
            address,
            last_status: HashMap::new(),
            last_update_time: Utc::now(),
            failure_remaining: failure_threshold,
        }
    }
}

/// Lifecycle state of a user-visible model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Launch in progress.
    Creating,
    /// All replicas loaded and serving.
    Ready,
    /// Launch failed and was rolled back.
    Error,
    /// Termination in progress.
    Terminating,
}

/// User-facing record mirrored to the external status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// The model's unique identifier.
    pub model_uid: ModelUid,
    /// Human-readable model name.
    pub model_name: String,
    /// Model version string, if known.
    pub model_version: Option<String>,
    /// Number of replicas requested.
    pub replica: u32,
    /// Workers per replica (>1 means sharded/tensor-parallel).
    pub n_worker: u32,
    /// Current lifecycle state.
    pub status: InstanceStatus,
    /// Timestamp this instance was created.
    pub created_ts: DateTime<Utc>,
}

/// Registry record for one launched model: replica count, the worker(s)
/// bound to each replica slot, and the round-robin cursor used by routing.
#[derive(Debug, Clone)]
pub struct ReplicaInfo {
    /// Number of replicas (N).
    pub replica_count: u32,
    /// `worker_refs[i]` holds every worker address serving replica `i`;
    /// length 1 for a replicated launch, >1 for a sharded one (index 0 is
    /// always the driver / shard 0).
    pub worker_refs: Vec<Vec<WorkerAddress>>,
    /// Next replica index to hand out to a routing request.
    pub round_robin_cursor: u32,
}

impl ReplicaInfo {
    /// Start a brand-new registry record with `n` empty replica slots.
    #[must_use]
    pub fn new(n: u32) -> Self {
        Self {
            replica_count: n,
            worker_refs: vec![Vec::new(); n as usize],
            round_robin_cursor: 0,
        }
    }

    /// Advance the round-robin cursor and return the replica index to use.
    pub fn next_replica_index(&mut self) -> u32 {
        let i = self.round_robin_cursor;
        self.round_robin_cursor = (self.round_robin_cursor + 1) % self.replica_count.max(1);
        i
    }
}

/// Build the synthetic per-replica key `{model_uid}-replica-{i}-of-{n}`.
#[must_use]
pub fn build_replica_uid(model_uid: &str, i: u32, n: u32) -> ReplicaUid {
    format!("{model_uid}-replica-{i}-of-{n}")
}

/// Inverse of [`build_replica_uid`]: recover `(model_uid, i, n)`.
#[must_use]
pub fn parse_replica_uid(replica_uid: &str) -> Option<(ModelUid, u32, u32)> {
    let rest = replica_uid.strip_suffix(&format!("-of-{}", suffix_n(replica_uid)?))?;
    let n: u32 = suffix_n(replica_uid)?;
    let marker = "-replica-";
    let idx = rest.rfind(marker)?;
    let model_uid = rest[..idx].to_string();
    let i: u32 = rest[idx + marker.len()..].parse().ok()?;
    Some((model_uid, i, n))
}

fn suffix_n(replica_uid: &str) -> Option<u32> {
    let idx = replica_uid.rfind("-of-")?;
    replica_uid[idx + 4..].parse().ok()
}

/// Validate a caller-supplied or synthesized `model_uid`.
#[must_use]
pub fn is_valid_model_uid(uid: &str) -> bool {
    let len = uid.chars().count();
    (MIN_MODEL_UID_LEN..=MAX_MODEL_UID_LEN).contains(&len)
        && uid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_uid_round_trips() {
        let uid = build_replica_uid("alpha", 2, 4);
        assert_eq!(uid, "alpha-replica-2-of-4");
        assert_eq!(
            parse_replica_uid(&uid),
            Some(("alpha".to_string(), 2, 4))
        );
    }

    #[test]
    fn replica_uid_round_trips_with_hyphenated_model_uid() {
        let uid = build_replica_uid("my-model-7", 0, 1);
        assert_eq!(parse_replica_uid(&uid), Some(("my-model-7".to_string(), 0, 1)));
    }

    #[test]
    fn model_uid_length_boundaries() {
        assert!(is_valid_model_uid("a"));
        assert!(!is_valid_model_uid(""));
        assert!(is_valid_model_uid(&"a".repeat(100)));
        assert!(!is_valid_model_uid(&"a".repeat(101)));
    }

    #[test]
    fn round_robin_cursor_cycles() {
        let mut info = ReplicaInfo::new(2);
        let seq: Vec<u32> = (0..5).map(|_| info.next_replica_index()).collect();
        assert_eq!(seq, vec![0, 1, 0, 1, 0]);
    }
}
