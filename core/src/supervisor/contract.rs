// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! External capability handles: the worker RPC contract and the three
//! auxiliary services (status guard, cache tracker, progress tracker) the
//! supervisor talks to but does not own. Each is a trait so tests can
//! substitute an in-memory fake without touching supervisor logic.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::{SupervisorResult, WorkerCallError};
use super::types::DeviceStatus;

/// Token returned by a worker in response to an abort request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortToken {
    /// The request was found and cancelled.
    Done,
    /// The replica never saw this request id.
    NotFound,
    /// The replica saw the request but it had already finished; no action taken.
    NoOp,
}

/// Parameters needed to launch one shard of one replica on a worker.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// The model's unique identifier.
    pub model_uid: String,
    /// Human-readable model name.
    pub model_name: String,
    /// Synthetic per-shard key, see [`super::types::build_replica_uid`].
    pub replica_uid: String,
    /// Concurrent request limit on this replica (0 = unlimited).
    pub request_limits: i64,
    /// GPU indices assigned to this shard.
    pub gpu_idx: Vec<u32>,
    /// Shard index within the replica (0 = driver), when sharded.
    pub shard: Option<u32>,
    /// Total shard count for this replica, when sharded.
    pub n_worker: Option<u32>,
    /// Opaque driver handshake info produced by shard 0, required for
    /// shards with index greater than 1 (see the design notes on the
    /// off-by-one kept intentionally from the source behavior).
    pub driver_info: Option<String>,
    /// Collective rendezvous parameters, when collective bring-up is enabled.
    pub xavier_config: Option<XavierConfig>,
}

/// Rendezvous coordinates handed to every rank in a collective bring-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XavierConfig {
    /// Address of the rank-0 rendezvous store.
    pub store_address: String,
    /// Port of the rank-0 rendezvous store.
    pub store_port: u16,
    /// This replica's rank (0 is the synthetic observer).
    pub rank: u32,
    /// Total world size (`replica + 1`).
    pub world_size: u32,
}

/// Outcome of launching a (possibly sharded) replica on one worker.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// The worker-local subpool address serving this shard.
    pub subpool_address: String,
    /// Driver handshake info, present only when this call launched shard 0.
    pub driver_info: Option<String>,
}

/// A brief, human-readable description of a loaded replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescription {
    /// Model name.
    pub model_name: String,
    /// Model version, if known.
    pub model_version: Option<String>,
    /// Replica count of the owning model.
    pub replica: u32,
}

/// The RPC surface a worker exposes to the supervisor. Implementations are
/// transport-specific (gRPC, in-process, or a test fake); the supervisor
/// only ever depends on this trait.
#[async_trait]
pub trait WorkerHandle: Send + Sync {
    /// This worker's network address.
    fn address(&self) -> &str;

    /// Number of models currently loaded, used by the placement selector.
    async fn get_model_count(&self) -> Result<usize, WorkerCallError>;

    /// Number of GPU devices visible to this worker.
    async fn get_devices_count(&self) -> Result<usize, WorkerCallError>;

    /// Launch one shard of one replica.
    async fn launch_builtin_model(
        &self,
        spec: LaunchSpec,
    ) -> Result<LaunchOutcome, WorkerCallError>;

    /// Launch the synthetic rank-0 collective observer, returning its
    /// rendezvous `(address, port)`.
    async fn launch_rank0_model(
        &self,
        model_uid: &str,
        xavier_config: &XavierConfig,
    ) -> Result<(String, u16), WorkerCallError>;

    /// Block until a previously-launched replica finishes initializing.
    async fn wait_for_load(&self, replica_uid: &str) -> Result<(), WorkerCallError>;

    /// Tear down a replica shard, freeing its worker-side resources.
    async fn terminate_model(&self, replica_uid: &str) -> Result<(), WorkerCallError>;

    /// Cancel an in-flight (not yet loaded) launch.
    async fn cancel_launch_model(&self, replica_uid: &str) -> Result<(), WorkerCallError>;

    /// Describe a loaded replica.
    async fn describe_model(&self, replica_uid: &str) -> Result<ModelDescription, WorkerCallError>;

    /// List every replica this worker currently hosts.
    async fn list_models(&self) -> Result<Vec<String>, WorkerCallError>;

    /// Cancel an in-flight inference request addressed to this replica.
    async fn abort_request(
        &self,
        replica_uid: &str,
        request_id: &str,
        block_duration_secs: u64,
    ) -> Result<AbortToken, WorkerCallError>;

    /// Kick off the collective-comm state transfer for this rank.
    async fn start_transfer_for_vllm(
        &self,
        replica_uid: &str,
        rank_addresses: &[String],
    ) -> Result<(), WorkerCallError>;

    /// Current device status snapshot (CPU + GPUs) on this worker.
    async fn get_status(&self) -> Result<HashMap<String, DeviceStatus>, WorkerCallError>;

    /// Cached models, optionally filtered by model name.
    async fn list_cached_models(
        &self,
        model_name: Option<&str>,
    ) -> Result<Vec<String>, WorkerCallError>;

    /// Model versions eligible for deletion.
    async fn list_deletable_models(
        &self,
        model_version: &str,
    ) -> Result<Vec<String>, WorkerCallError>;

    /// Confirm and remove a cached model version; `true` if removed.
    async fn confirm_and_remove_model(
        &self,
        model_version: &str,
    ) -> Result<bool, WorkerCallError>;

    /// Ask the worker to exit gracefully.
    async fn trigger_exit(&self) -> Result<bool, WorkerCallError>;

    /// Register a model-catalog entry on this worker.
    async fn register_model(
        &self,
        model_type: &str,
        spec: &str,
        persist: bool,
    ) -> Result<(), WorkerCallError>;

    /// Unregister a model-catalog entry on this worker.
    async fn unregister_model(
        &self,
        model_type: &str,
        model_name: &str,
    ) -> Result<(), WorkerCallError>;

    /// A brief self-description for `get_workers_info`.
    async fn get_worker_info(&self) -> Result<String, WorkerCallError>;
}

/// External status-surface mirror, written by the launch/terminate
/// coordinators and read by the status surface (component I).
#[async_trait]
pub trait StatusGuard: Send + Sync {
    /// Record a freshly-created instance.
    async fn set_instance_info(&self, info: super::types::InstanceInfo);
    /// Update an existing instance's status field.
    async fn update_instance_info(&self, model_uid: &str, status: super::types::InstanceStatus);
    /// Remove an instance record.
    async fn remove_instance_info(&self, model_uid: &str);
    /// Fetch the current instance record, if any.
    async fn get_instance_info(&self, model_uid: &str) -> Option<super::types::InstanceInfo>;
    /// Total number of tracked instances.
    async fn get_instance_count(&self) -> usize;
}

/// External model-version cache, updated by the registration broker.
#[async_trait]
pub trait CacheTracker: Send + Sync {
    /// Record that a model version became available.
    async fn record_model_version(&self, model_type: &str, version: &str);
    /// Forget a model version.
    async fn unregister_model_version(&self, model_type: &str, version: &str);
    /// List known versions for a model type.
    async fn get_model_versions(&self, model_type: &str) -> Vec<String>;
}

/// External launch-progress reporter, polled by `launch_progress`.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Fractional progress in `[0.0, 1.0]` for a given progress key, if any
    /// progress has been reported for it yet.
    async fn get_progress(&self, key: &str) -> Option<f64>;
}

/// Per-model-type registration behavior, looked up by `spec_class` in the
/// registration broker's dispatch table.
///
/// Each model type (builtin weights, a LoRA adapter, an embedding model, ...)
/// plugs in its own validation and cache bookkeeping without the broker
/// needing to know the concrete type.
#[async_trait]
pub trait ModelTypeHandler: Send + Sync {
    /// The `spec_class` string this handler answers for, e.g. `"llm"`.
    fn spec_class(&self) -> &str;

    /// Validate and register a model version, returning the version string
    /// that should be recorded in the model cache.
    async fn register(&self, model_name: &str, model_path: &str) -> SupervisorResult<String>;

    /// Remove a previously registered model version.
    async fn unregister(&self, model_name: &str, version: &str) -> SupervisorResult<()>;

    /// Human-readable description of a registered version, for
    /// `describe_model`.
    async fn describe(&self, model_name: &str, version: &str) -> SupervisorResult<String>;
}
