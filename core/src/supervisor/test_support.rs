// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! In-memory fakes of the worker contract and auxiliary services, shared by
//! unit tests across the supervisor module and by the scenario tests in
//! `core/tests/`.

#![cfg(any(test, feature = "test-util"))]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::contract::{
    AbortToken, CacheTracker, LaunchOutcome, LaunchSpec, ModelDescription, ModelTypeHandler,
    ProgressTracker, StatusGuard, WorkerHandle, XavierConfig,
};
use super::errors::{SupervisorError, SupervisorResult, WorkerCallError};
use super::types::{DeviceStatus, InstanceInfo, InstanceStatus};

/// A worker double with scriptable failures, used by unit and scenario
/// tests. Every call is recorded so tests can assert on call order.
pub struct FakeWorker {
    address: String,
    model_count: AtomicUsize,
    fail_launch: Mutex<Option<String>>,
    terminated: Mutex<Vec<String>>,
    abort_responses: Mutex<Vec<AbortToken>>,
    launched: Mutex<Vec<String>>,
}

impl FakeWorker {
    /// A healthy worker with zero loaded models.
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            model_count: AtomicUsize::new(0),
            fail_launch: Mutex::new(None),
            terminated: Mutex::new(Vec::new()),
            abort_responses: Mutex::new(Vec::new()),
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Override the reported model count (drives placement decisions).
    #[must_use]
    pub fn with_model_count(self, n: usize) -> Self {
        self.model_count.store(n, Ordering::SeqCst);
        self
    }

    /// Make every `launch_builtin_model` call fail with `reason`.
    #[must_use]
    pub fn failing_launch(self, reason: &str) -> Self {
        *self.fail_launch.lock().unwrap() = Some(reason.to_string());
        self
    }

    /// Queue the tokens `abort_request` will return, in call order.
    #[must_use]
    pub fn with_abort_responses(self, tokens: Vec<AbortToken>) -> Self {
        *self.abort_responses.lock().unwrap() = tokens;
        self
    }

    /// Replica UIDs this fake has had `terminate_model` called on.
    #[must_use]
    pub fn terminated_replicas(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }

    /// Replica UIDs this fake has had `launch_builtin_model` called with.
    #[must_use]
    pub fn launched_replicas(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerHandle for FakeWorker {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get_model_count(&self) -> Result<usize, WorkerCallError> {
        Ok(self.model_count.load(Ordering::SeqCst))
    }

    async fn get_devices_count(&self) -> Result<usize, WorkerCallError> {
        Ok(1)
    }

    async fn launch_builtin_model(
        &self,
        spec: LaunchSpec,
    ) -> Result<LaunchOutcome, WorkerCallError> {
        if let Some(reason) = self.fail_launch.lock().unwrap().clone() {
            return Err(WorkerCallError::Rejected {
                address: self.address.clone(),
                method: "launch_builtin_model".to_string(),
                source: anyhow::anyhow!(reason),
            });
        }
        self.launched.lock().unwrap().push(spec.replica_uid.clone());
        self.model_count.fetch_add(1, Ordering::SeqCst);
        let driver_info = if spec.shard == Some(0) {
            Some(format!("driver-info-{}", spec.replica_uid))
        } else {
            None
        };
        Ok(LaunchOutcome {
            subpool_address: format!("{}/{}", self.address, spec.replica_uid),
            driver_info,
        })
    }

    async fn launch_rank0_model(
        &self,
        model_uid: &str,
        _xavier_config: &XavierConfig,
    ) -> Result<(String, u16), WorkerCallError> {
        Ok((format!("{}/{}-rank0", self.address, model_uid), 29500))
    }

    async fn wait_for_load(&self, _replica_uid: &str) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn terminate_model(&self, replica_uid: &str) -> Result<(), WorkerCallError> {
        self.terminated.lock().unwrap().push(replica_uid.to_string());
        Ok(())
    }

    async fn cancel_launch_model(&self, _replica_uid: &str) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn describe_model(
        &self,
        _replica_uid: &str,
    ) -> Result<ModelDescription, WorkerCallError> {
        Ok(ModelDescription {
            model_name: "fake-model".to_string(),
            model_version: None,
            replica: 1,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, WorkerCallError> {
        Ok(self.launched.lock().unwrap().clone())
    }

    async fn abort_request(
        &self,
        _replica_uid: &str,
        _request_id: &str,
        _block_duration_secs: u64,
    ) -> Result<AbortToken, WorkerCallError> {
        let mut responses = self.abort_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(AbortToken::NoOp)
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn start_transfer_for_vllm(
        &self,
        _replica_uid: &str,
        _rank_addresses: &[String],
    ) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn get_status(&self) -> Result<HashMap<String, DeviceStatus>, WorkerCallError> {
        Ok(HashMap::new())
    }

    async fn list_cached_models(
        &self,
        _model_name: Option<&str>,
    ) -> Result<Vec<String>, WorkerCallError> {
        Ok(Vec::new())
    }

    async fn list_deletable_models(
        &self,
        _model_version: &str,
    ) -> Result<Vec<String>, WorkerCallError> {
        Ok(Vec::new())
    }

    async fn confirm_and_remove_model(
        &self,
        _model_version: &str,
    ) -> Result<bool, WorkerCallError> {
        Ok(true)
    }

    async fn trigger_exit(&self) -> Result<bool, WorkerCallError> {
        Ok(true)
    }

    async fn register_model(
        &self,
        _model_type: &str,
        _spec: &str,
        _persist: bool,
    ) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn unregister_model(
        &self,
        _model_type: &str,
        _model_name: &str,
    ) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn get_worker_info(&self) -> Result<String, WorkerCallError> {
        Ok(format!("worker at {}", self.address))
    }
}

/// An in-memory [`StatusGuard`] used by tests.
#[derive(Default)]
pub struct FakeStatusGuard {
    instances: Mutex<HashMap<String, InstanceInfo>>,
}

#[async_trait]
impl StatusGuard for FakeStatusGuard {
    async fn set_instance_info(&self, info: InstanceInfo) {
        self.instances.lock().unwrap().insert(info.model_uid.clone(), info);
    }

    async fn update_instance_info(&self, model_uid: &str, status: InstanceStatus) {
        if let Some(info) = self.instances.lock().unwrap().get_mut(model_uid) {
            info.status = status;
        }
    }

    async fn remove_instance_info(&self, model_uid: &str) {
        self.instances.lock().unwrap().remove(model_uid);
    }

    async fn get_instance_info(&self, model_uid: &str) -> Option<InstanceInfo> {
        self.instances.lock().unwrap().get(model_uid).cloned()
    }

    async fn get_instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

/// An in-memory [`ProgressTracker`] used by tests; always reports no progress.
#[derive(Default)]
pub struct FakeProgressTracker;

#[async_trait]
impl ProgressTracker for FakeProgressTracker {
    async fn get_progress(&self, _key: &str) -> Option<f64> {
        None
    }
}

/// An in-memory [`CacheTracker`] used by tests.
#[derive(Default)]
pub struct FakeCacheTracker {
    versions: Mutex<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl CacheTracker for FakeCacheTracker {
    async fn record_model_version(&self, model_type: &str, version: &str) {
        self.versions
            .lock()
            .unwrap()
            .entry(model_type.to_string())
            .or_default()
            .push(version.to_string());
    }

    async fn unregister_model_version(&self, model_type: &str, version: &str) {
        if let Some(versions) = self.versions.lock().unwrap().get_mut(model_type) {
            versions.retain(|v| v != version);
        }
    }

    async fn get_model_versions(&self, model_type: &str) -> Vec<String> {
        self.versions
            .lock()
            .unwrap()
            .get(model_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// A [`ModelTypeHandler`] double, scriptable to fail registration so tests
/// can exercise the broker's rollback-before-re-raise behavior.
pub struct FakeModelTypeHandler {
    spec_class: String,
    fail_register: bool,
    unregistered: Mutex<Vec<String>>,
}

impl FakeModelTypeHandler {
    /// A handler for `spec_class` that always succeeds.
    #[must_use]
    pub fn new(spec_class: &str) -> Self {
        Self {
            spec_class: spec_class.to_string(),
            fail_register: false,
            unregistered: Mutex::new(Vec::new()),
        }
    }

    /// Make `register` always fail, to exercise rollback.
    #[must_use]
    pub fn failing_register(mut self) -> Self {
        self.fail_register = true;
        self
    }

    /// Model names this handler's `unregister` was called with.
    #[must_use]
    pub fn unregistered_calls(&self) -> Vec<String> {
        self.unregistered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelTypeHandler for FakeModelTypeHandler {
    fn spec_class(&self) -> &str {
        &self.spec_class
    }

    async fn register(&self, model_name: &str, _model_path: &str) -> SupervisorResult<String> {
        if self.fail_register {
            return Err(SupervisorError::Validation(format!(
                "handler for {} rejected {model_name}",
                self.spec_class
            )));
        }
        Ok("v1".to_string())
    }

    async fn unregister(&self, model_name: &str, _version: &str) -> SupervisorResult<()> {
        self.unregistered
            .lock()
            .unwrap()
            .push(model_name.to_string());
        Ok(())
    }

    async fn describe(&self, model_name: &str, version: &str) -> SupervisorResult<String> {
        Ok(format!("{model_name}@{version}"))
    }
}
