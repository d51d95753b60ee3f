// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component B: the Replica Registry.

use std::collections::HashMap;

use super::types::{build_replica_uid, parse_replica_uid, ModelUid, ReplicaInfo, ReplicaUid, WorkerAddress};

/// Directory of live model instances: `model_uid -> ReplicaInfo` and
/// `replica_uid -> worker(s)`. Consistency across the two maps is the
/// responsibility of the launch, terminate, and health-monitor components;
/// this type only enforces its own local bookkeeping.
#[derive(Default)]
pub struct ReplicaRegistry {
    infos: HashMap<ModelUid, ReplicaInfo>,
    workers: HashMap<ReplicaUid, Vec<WorkerAddress>>,
}

impl ReplicaRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` iff `model_uid` is already registered (invariant 1).
    #[must_use]
    pub fn contains(&self, model_uid: &str) -> bool {
        self.infos.contains_key(model_uid)
    }

    /// Insert a brand-new, empty `ReplicaInfo` for `model_uid`. Called by the
    /// launch coordinator before any worker RPC so rollback always has a
    /// well-defined starting point.
    pub fn insert(&mut self, model_uid: ModelUid, n: u32) {
        self.infos.insert(model_uid, ReplicaInfo::new(n));
    }

    /// The registry record for a model, if present.
    #[must_use]
    pub fn get(&self, model_uid: &str) -> Option<&ReplicaInfo> {
        self.infos.get(model_uid)
    }

    /// Mutable access to a model's registry record.
    pub fn get_mut(&mut self, model_uid: &str) -> Option<&mut ReplicaInfo> {
        self.infos.get_mut(model_uid)
    }

    /// Bind a worker to replica slot `i` of `model_uid` and record the
    /// resulting replica UID -> worker-list mapping. Appends rather than
    /// overwrites the slot's worker list, so sharded launches can call this
    /// once per shard with the same `i`.
    pub fn bind_worker(&mut self, model_uid: &str, i: u32, n: u32, worker: WorkerAddress) {
        if let Some(info) = self.infos.get_mut(model_uid) {
            if let Some(slot) = info.worker_refs.get_mut(i as usize) {
                slot.push(worker.clone());
            }
        }
        let uid = build_replica_uid(model_uid, i, n);
        self.workers.entry(uid).or_default().push(worker);
    }

    /// Worker list bound to a replica UID, if any.
    #[must_use]
    pub fn workers_for_replica(&self, replica_uid: &str) -> Option<&Vec<WorkerAddress>> {
        self.workers.get(replica_uid)
    }

    /// All replica UIDs currently registered for `model_uid`.
    #[must_use]
    pub fn replica_uids(&self, model_uid: &str) -> Vec<ReplicaUid> {
        let Some(info) = self.infos.get(model_uid) else {
            return Vec::new();
        };
        (0..info.replica_count)
            .map(|i| build_replica_uid(model_uid, i, info.replica_count))
            .collect()
    }

    /// Remove every trace of `model_uid`: its `ReplicaInfo` and every
    /// `replica_uid -> worker` binding it owns.
    pub fn remove_model(&mut self, model_uid: &str) -> Option<ReplicaInfo> {
        let info = self.infos.remove(model_uid)?;
        for i in 0..info.replica_count {
            self.workers
                .remove(&build_replica_uid(model_uid, i, info.replica_count));
        }
        Some(info)
    }

    /// Remove a single replica UID's worker binding (used for sharded
    /// partial rollback when only some shards launched).
    pub fn remove_replica_binding(&mut self, replica_uid: &str) {
        self.workers.remove(replica_uid);
    }

    /// Every replica UID currently bound (wholly or partly) to `worker`.
    #[must_use]
    pub fn replicas_on_worker(&self, worker: &str) -> Vec<ReplicaUid> {
        self.workers
            .iter()
            .filter(|(_, workers)| workers.iter().any(|w| w == worker))
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    /// Model UIDs affected when `worker` is evicted, derived by parsing back
    /// every replica UID bound to it. Conservative by design (see design
    /// notes): a single dead worker invalidates the whole model.
    #[must_use]
    pub fn models_affected_by_worker(&self, worker: &str) -> Vec<ModelUid> {
        let mut models: Vec<ModelUid> = self
            .replicas_on_worker(worker)
            .iter()
            .filter_map(|uid| parse_replica_uid(uid).map(|(m, _, _)| m))
            .collect();
        models.sort();
        models.dedup();
        models
    }

    /// All model UIDs with a live `ReplicaInfo`.
    #[must_use]
    pub fn list_models(&self) -> Vec<ModelUid> {
        self.infos.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_lookup_round_trips() {
        let mut reg = ReplicaRegistry::new();
        reg.insert("m".into(), 2);
        reg.bind_worker("m", 0, 2, "w1".into());
        reg.bind_worker("m", 1, 2, "w1".into());
        assert_eq!(
            reg.workers_for_replica("m-replica-0-of-2"),
            Some(&vec!["w1".to_string()])
        );
        assert_eq!(reg.replica_uids("m").len(), 2);
    }

    #[test]
    fn remove_model_clears_both_maps() {
        let mut reg = ReplicaRegistry::new();
        reg.insert("m".into(), 1);
        reg.bind_worker("m", 0, 1, "w1".into());
        reg.remove_model("m");
        assert!(!reg.contains("m"));
        assert!(reg.workers_for_replica("m-replica-0-of-1").is_none());
    }

    #[test]
    fn models_affected_by_worker_conservative() {
        let mut reg = ReplicaRegistry::new();
        reg.insert("x".into(), 1);
        reg.bind_worker("x", 0, 1, "bad".into());
        reg.insert("y".into(), 2);
        reg.bind_worker("y", 0, 2, "good".into());
        reg.bind_worker("y", 1, 2, "bad".into());
        let mut affected = reg.models_affected_by_worker("bad");
        affected.sort();
        assert_eq!(affected, vec!["x".to_string(), "y".to_string()]);
    }
}
