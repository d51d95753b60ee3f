//! A scripted, in-process rehearsal of the supervisor: registers simulated
//! workers, launches a model, exercises routing and abort, then tears it
//! down. Lets an operator sanity-check a `SupervisorConfig` and watch the
//! launch/terminate protocols narrated step by step, without a real cluster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use colored::Colorize;

use fleet_supervisor_core::config::ConfigLoader;
use fleet_supervisor_core::supervisor::{
    AbortToken, CacheTracker, DeviceStatus, InstanceInfo, InstanceStatus, LaunchOutcome,
    LaunchRequest, LaunchSpec, ModelDescription, ProgressTracker, StatusGuard, SupervisorHandle,
    WorkerCallError, WorkerHandle, XavierConfig,
};

use crate::error::CliError;
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Number of simulated workers to register
    #[arg(long, default_value_t = 2)]
    pub workers: usize,

    /// Replica count for the rehearsal launch
    #[arg(long, default_value_t = 2)]
    pub replica: u32,

    /// Name for the rehearsal model
    #[arg(long, default_value = "demo-model")]
    pub model_name: String,

    /// Shard the launch across every registered worker instead of
    /// replicating it on one worker each
    #[arg(long)]
    pub sharded: bool,

    /// Block until every replica has loaded before continuing
    #[arg(long, default_value_t = true)]
    pub wait_ready: bool,

    /// Load `SupervisorConfig` from this file instead of the default location
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,

    /// Output format for the final model listing
    #[arg(long, value_enum, default_value = "pretty")]
    pub format: OutputFormat,
}

pub async fn execute(args: DemoArgs, verbose: bool) -> Result<()> {
    if args.workers == 0 {
        return Err(CliError::invalid_input("--workers must be at least 1", "pass --workers 1 or higher").into());
    }

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().context("failed to load configuration")?;

    println!("{}", "Supervisor rehearsal".bold().cyan());
    println!(
        "  health check: {}s interval / {}s timeout / {} strikes",
        config.supervisor.health_check_interval,
        config.supervisor.health_check_timeout,
        config.supervisor.health_check_failure_threshold,
    );
    println!();

    let handle = SupervisorHandle::new(
        config.supervisor_address.clone(),
        config.supervisor,
        Arc::new(InMemoryStatusGuard::default()),
        Arc::new(InMemoryCacheTracker::default()),
        Arc::new(InMemoryProgressTracker),
    );

    let mut worker_addresses = Vec::with_capacity(args.workers);
    for i in 0..args.workers {
        let address = format!("sim-worker-{i}:9000");
        handle
            .add_worker(Arc::new(SimWorker::new(&address)))
            .await
            .context("failed to register simulated worker")?;
        worker_addresses.push(address);
    }
    println!("{} registered {} simulated worker(s)", "✓".green().bold(), args.workers);
    if verbose {
        output::display_workers(&handle.list_workers().await, OutputFormat::Pretty)?;
    }

    let request = LaunchRequest {
        model_uid: None,
        model_name: args.model_name.clone(),
        model_version: None,
        replica: args.replica,
        n_worker: if args.sharded { args.workers as u32 } else { 1 },
        request_limits: 0,
        gpu_idx: vec![],
        worker_ip: None,
        enable_xavier: false,
        engine_supports_collective: false,
        wait_ready: args.wait_ready,
    };

    let model_uid = handle.launch_model(request).await.context("launch failed")?;
    println!("{} launched '{}'", "✓".green().bold(), model_uid.bold());

    let models = handle.list_models().await;
    output::display_models(&models, args.format)?;

    let worker = handle.get_model(&model_uid).await.context("routing failed")?;
    println!("  routed to {}", worker.address().cyan());

    let token = handle
        .abort_request(&model_uid, "demo-request", 5)
        .await
        .context("abort failed")?;
    println!("  abort_request returned {token:?}");

    let info = handle.get_instance_info(&model_uid).await;
    output::display_instance_info(info.as_ref(), args.format)?;

    handle
        .terminate_model(&model_uid, false)
        .await
        .context("terminate failed")?;
    println!("{} terminated '{}'", "✓".green().bold(), model_uid.bold());

    let remaining = handle.list_models().await;
    output::display_models(&remaining, args.format)?;

    Ok(())
}

/// A single-process worker double with enough real behavior (tracked
/// per-replica model counts, rank-0 rendezvous, abort bookkeeping) to drive
/// every supervisor protocol, but no actual inference or GPU access.
struct SimWorker {
    address: String,
    model_count: AtomicUsize,
}

impl SimWorker {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            model_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WorkerHandle for SimWorker {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get_model_count(&self) -> Result<usize, WorkerCallError> {
        Ok(self.model_count.load(Ordering::SeqCst))
    }

    async fn get_devices_count(&self) -> Result<usize, WorkerCallError> {
        Ok(1)
    }

    async fn launch_builtin_model(&self, spec: LaunchSpec) -> Result<LaunchOutcome, WorkerCallError> {
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

    async fn terminate_model(&self, _replica_uid: &str) -> Result<(), WorkerCallError> {
        self.model_count.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cancel_launch_model(&self, _replica_uid: &str) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn describe_model(&self, _replica_uid: &str) -> Result<ModelDescription, WorkerCallError> {
        Ok(ModelDescription {
            model_name: "sim-model".to_string(),
            model_version: None,
            replica: 1,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, WorkerCallError> {
        Ok(Vec::new())
    }

    async fn abort_request(
        &self,
        _replica_uid: &str,
        _request_id: &str,
        _block_duration_secs: u64,
    ) -> Result<AbortToken, WorkerCallError> {
        Ok(AbortToken::Done)
    }

    async fn start_transfer_for_vllm(
        &self,
        _replica_uid: &str,
        _rank_addresses: &[String],
    ) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn get_status(&self) -> Result<HashMap<String, DeviceStatus>, WorkerCallError> {
        let mut status = HashMap::new();
        status.insert(
            "gpu0".to_string(),
            DeviceStatus::Gpu {
                index: 0,
                memory_total: 80 * 1024 * 1024 * 1024,
                memory_used: (self.model_count.load(Ordering::SeqCst) as u64) * 8 * 1024 * 1024 * 1024,
            },
        );
        Ok(status)
    }

    async fn list_cached_models(&self, _model_name: Option<&str>) -> Result<Vec<String>, WorkerCallError> {
        Ok(Vec::new())
    }

    async fn list_deletable_models(&self, _model_version: &str) -> Result<Vec<String>, WorkerCallError> {
        Ok(Vec::new())
    }

    async fn confirm_and_remove_model(&self, _model_version: &str) -> Result<bool, WorkerCallError> {
        Ok(true)
    }

    async fn trigger_exit(&self) -> Result<bool, WorkerCallError> {
        Ok(true)
    }

    async fn register_model(&self, _model_type: &str, _spec: &str, _persist: bool) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn unregister_model(&self, _model_type: &str, _model_name: &str) -> Result<(), WorkerCallError> {
        Ok(())
    }

    async fn get_worker_info(&self) -> Result<String, WorkerCallError> {
        Ok(format!("sim-worker at {}", self.address))
    }
}

/// Single-process [`StatusGuard`], backing the demo rehearsal's instance
/// records for the lifetime of the command.
#[derive(Default)]
struct InMemoryStatusGuard {
    instances: Mutex<HashMap<String, InstanceInfo>>,
}

#[async_trait]
impl StatusGuard for InMemoryStatusGuard {
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

/// Single-process [`CacheTracker`] for the demo rehearsal.
#[derive(Default)]
struct InMemoryCacheTracker {
    versions: Mutex<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl CacheTracker for InMemoryCacheTracker {
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
        self.versions.lock().unwrap().get(model_type).cloned().unwrap_or_default()
    }
}

/// Single-process [`ProgressTracker`] for the demo rehearsal; the rehearsal
/// never polls launch progress mid-flight, so there is nothing to report.
struct InMemoryProgressTracker;

#[async_trait]
impl ProgressTracker for InMemoryProgressTracker {
    async fn get_progress(&self, _key: &str) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_worker_tracks_model_count_across_launch_and_terminate() {
        let worker = SimWorker::new("w1");
        assert_eq!(worker.get_model_count().await.unwrap(), 0);
        worker
            .launch_builtin_model(LaunchSpec {
                model_uid: "m".to_string(),
                model_name: "m".to_string(),
                replica_uid: "m-replica-0-of-1".to_string(),
                request_limits: 0,
                gpu_idx: vec![],
                shard: None,
                n_worker: None,
                driver_info: None,
                xavier_config: None,
            })
            .await
            .unwrap();
        assert_eq!(worker.get_model_count().await.unwrap(), 1);
        worker.terminate_model("m-replica-0-of-1").await.unwrap();
        assert_eq!(worker.get_model_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn in_memory_status_guard_round_trips() {
        let guard = InMemoryStatusGuard::default();
        guard
            .set_instance_info(InstanceInfo {
                model_uid: "m".to_string(),
                model_name: "m".to_string(),
                model_version: None,
                replica: 1,
                n_worker: 1,
                status: InstanceStatus::Creating,
                created_ts: chrono::Utc::now(),
            })
            .await;
        guard.update_instance_info("m", InstanceStatus::Ready).await;
        assert_eq!(guard.get_instance_info("m").await.unwrap().status, InstanceStatus::Ready);
        guard.remove_instance_info("m").await;
        assert!(guard.get_instance_info("m").await.is_none());
    }
}
