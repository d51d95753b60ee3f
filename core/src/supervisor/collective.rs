// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Component H: Collective Bring-Up auxiliary actors.
//!
//! `BlockTracker` and `CollectiveManager` are owned directly by the
//! supervisor (unlike the worker contract and the three external services in
//! [`super::contract`]), so they are plain in-process structs rather than
//! trait objects: there is nothing to substitute a transport for.

use std::collections::HashMap;
use std::sync::Mutex;

use super::types::ModelUid;

/// Placeholder for per-block state-transfer bookkeeping. The source's
/// `BlockTracker` actor tracks in-flight transfer completions; nothing in
/// this port reads that state back, so it carries no fields yet.
#[derive(Debug, Default)]
pub struct BlockTracker;

impl BlockTracker {
    /// A freshly created tracker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Owns the rendezvous world for one collective-enabled model: every rank's
/// address, registered in strictly increasing rank order by the launch
/// coordinator.
#[derive(Debug, Default)]
pub struct CollectiveManager {
    ranks: Mutex<Vec<(u32, String)>>,
}

impl CollectiveManager {
    /// A manager with no ranks registered yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one rank's address. Callers must preserve increasing rank
    /// order themselves; this type does not enforce it.
    pub fn register_rank(&self, rank: u32, address: String) {
        self.ranks.lock().unwrap().push((rank, address));
    }

    /// Every registered `(rank, address)` pair, in registration order.
    #[must_use]
    pub fn ranks(&self) -> Vec<(u32, String)> {
        self.ranks.lock().unwrap().clone()
    }
}

/// Per-UID collective auxiliary state: a [`BlockTracker`] and a
/// [`CollectiveManager`] keyed by `model_uid`, plus the replica UID of the
/// synthetic rank-0 observer. Populated by the Launch Coordinator, read by
/// `call_collective_manager`, cleared by the Termination Coordinator.
#[derive(Default)]
pub struct CollectiveState {
    block_trackers: HashMap<ModelUid, BlockTracker>,
    managers: HashMap<ModelUid, CollectiveManager>,
    rank0_replica: HashMap<ModelUid, String>,
}

impl CollectiveState {
    /// An empty collective state table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the auxiliary actors for `model_uid`, recording the synthetic
    /// rank-0 replica UID that was launched to host the rendezvous store.
    pub fn create(&mut self, model_uid: &str, rank0_replica_uid: String) {
        self.block_trackers
            .insert(model_uid.to_string(), BlockTracker::new());
        self.managers
            .insert(model_uid.to_string(), CollectiveManager::new());
        self.rank0_replica
            .insert(model_uid.to_string(), rank0_replica_uid);
    }

    /// The collective manager for `model_uid`, if collective mode is enabled
    /// for it.
    #[must_use]
    pub fn manager(&self, model_uid: &str) -> Option<&CollectiveManager> {
        self.managers.get(model_uid)
    }

    /// The synthetic rank-0 replica UID for `model_uid`, if any.
    #[must_use]
    pub fn rank0_replica_uid(&self, model_uid: &str) -> Option<&String> {
        self.rank0_replica.get(model_uid)
    }

    /// `true` iff `model_uid` has collective auxiliary state.
    #[must_use]
    pub fn contains(&self, model_uid: &str) -> bool {
        self.managers.contains_key(model_uid)
    }

    /// Drop every auxiliary actor for `model_uid`. Never fails: a missing
    /// entry is simply a no-op, matching the tolerant-teardown design.
    pub fn destroy(&mut self, model_uid: &str) {
        self.block_trackers.remove(model_uid);
        self.managers.remove(model_uid);
        self.rank0_replica.remove(model_uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_destroy_round_trips() {
        let mut state = CollectiveState::new();
        state.create("m", "m-rank0".to_string());
        assert!(state.contains("m"));
        state.manager("m").unwrap().register_rank(0, "a".to_string());
        state.manager("m").unwrap().register_rank(1, "b".to_string());
        assert_eq!(
            state.manager("m").unwrap().ranks(),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
        state.destroy("m");
        assert!(!state.contains("m"));
        assert!(state.manager("m").is_none());
    }

    #[test]
    fn destroy_missing_model_is_noop() {
        let mut state = CollectiveState::new();
        state.destroy("nope");
    }
}
