// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error taxonomy for the supervisor core.

use thiserror::Error;

/// Result alias used throughout the supervisor.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Failures a worker-contract call can return, kept distinct from
/// [`SupervisorError`] so callers can tell an RPC failure from a local
/// validation failure before the launch/terminate coordinators convert it.
#[derive(Debug, Error)]
pub enum WorkerCallError {
    /// The worker returned an application-level error.
    #[error("worker {address} rejected call {method}: {source}")]
    Rejected {
        /// Worker address that rejected the call.
        address: String,
        /// Method name that failed.
        method: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
    /// The call could not reach the worker at all (transport failure).
    #[error("worker {address} unreachable during {method}: {source}")]
    Unreachable {
        /// Worker address that could not be reached.
        address: String,
        /// Method name that failed.
        method: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
}

/// Everything that can go wrong at the supervisor level, per the spec's
/// error-handling design: validation and placement failures are returned
/// verbatim, worker RPC failures trigger rollback, not-found is returned,
/// health eviction and auxiliary-actor teardown failures never surface here.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A caller-supplied argument failed validation before any state changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No worker satisfied the placement request.
    #[error("no worker available for placement: {0}")]
    Placement(String),

    /// A worker RPC failed during a launch; the caller sees this only after
    /// rollback of whatever had already been placed has been attempted.
    #[error("worker call failed during launch of '{model_uid}'")]
    WorkerRpc {
        /// The model UID whose launch failed.
        model_uid: String,
        /// Underlying worker-call error.
        #[source]
        source: WorkerCallError,
    },

    /// The requested `model_uid` (or worker address) is not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// The cluster has no worker at all, or the given worker address is
    /// already registered.
    #[error("worker registry error: {0}")]
    WorkerRegistry(String),

    /// The registration broker has no handler for the requested model type.
    #[error("unsupported model type: {0}")]
    Unsupported(String),
}

impl SupervisorError {
    /// Construct a [`SupervisorError::WorkerRpc`] from any worker-call error.
    #[must_use]
    pub fn worker_rpc(model_uid: impl Into<String>, source: WorkerCallError) -> Self {
        Self::WorkerRpc {
            model_uid: model_uid.into(),
            source,
        }
    }
}
