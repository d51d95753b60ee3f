// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Supervisor: the control plane of a distributed model-serving cluster
//!
//! The supervisor chooses workers, creates replicas (optionally sharded
//! across several workers for tensor-parallel inference), tracks their
//! health, dispatches inference traffic across replicas, and reclaims
//! resources when workers die.
//!
//! ## Components
//!
//! | Module | Responsibility |
//! |--------|-----------------|
//! | [`registry`] | Worker Registry: directory of known workers |
//! | [`replica`] | Replica Registry: `model_uid -> ReplicaInfo`, `replica_uid -> worker(s)` |
//! | [`placement`] | Placement Selector: picks the least-loaded candidate worker |
//! | [`launch`] | Launch Coordinator: replicated and sharded launch protocols, with rollback |
//! | [`terminate`] | Termination Coordinator: tears down a model's replicas and auxiliary actors |
//! | [`router`] | Request Router: round-robin `get_model`, fan-out `abort_request` |
//! | [`health`] | Health Monitor: periodic sweep, eviction, replica purge |
//! | [`collective`] | Collective Bring-Up: `BlockTracker` / `CollectiveManager` auxiliary state |
//! | [`status`] | Status & Progress Surface: read-only cluster/model queries |
//! | [`registration`] | Registration Broker: per-model-type register/unregister dispatch |
//!
//! [`Supervisor`] owns every registry directly; its methods assume a single
//! caller at a time (see the module's concurrency notes). [`SupervisorHandle`]
//! is the production entry point: it wraps a `Supervisor` behind a
//! `tokio::sync::Mutex` so every public operation is serialized the way the
//! single-threaded cooperative scheduler in the design requires, and it owns
//! the in-flight-launch bookkeeping for `wait_ready=false` callers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleet_supervisor_core::supervisor::{SupervisorConfig, SupervisorHandle};
//! # use fleet_supervisor_core::supervisor::test_support::*;
//!
//! # #[cfg(test)]
//! # async fn example() {
//! let handle = SupervisorHandle::new(
//!     "10.0.0.1:9000",
//!     SupervisorConfig::default(),
//!     Arc::new(FakeStatusGuard::default()),
//!     Arc::new(FakeCacheTracker::default()),
//!     Arc::new(FakeProgressTracker),
//! );
//! handle.add_worker(Arc::new(FakeWorker::new("10.0.0.2:9000"))).await.unwrap();
//! # }
//! ```

pub mod collective;
pub mod config;
pub mod contract;
mod errors;
mod handle;
mod health;
mod launch;
mod placement;
mod registration;
mod registry;
mod replica;
mod router;
mod state;
mod status;
#[cfg(any(test, feature = "test-util"))]
pub mod test_support;
pub mod types;
mod terminate;

pub use collective::{BlockTracker, CollectiveManager, CollectiveState};
pub use config::SupervisorConfig;
pub use contract::{
    AbortToken, CacheTracker, LaunchOutcome, LaunchSpec, ModelDescription, ModelTypeHandler,
    ProgressTracker, StatusGuard, WorkerHandle, XavierConfig,
};
pub use errors::{SupervisorError, SupervisorResult, WorkerCallError};
pub use handle::SupervisorHandle;
pub use health::{spawn_health_monitor, HealthMonitorHandle};
pub use launch::LaunchRequest;
pub use registration::ShutdownHandle;
pub use registry::WorkerRegistry;
pub use replica::ReplicaRegistry;
pub use state::Supervisor;
pub use status::{ModelListEntry, StatusSnapshot};
pub use types::{
    build_replica_uid, is_valid_model_uid, parse_replica_uid, DeviceStatus, InstanceInfo,
    InstanceStatus, ModelUid, ReplicaInfo, ReplicaUid, WorkerAddress, WorkerEntry,
    MAX_MODEL_UID_LEN, MIN_MODEL_UID_LEN,
};
