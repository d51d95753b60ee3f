//! Output formatting for `supervisorctl` responses.
//!
//! Every cluster-inspection subcommand can render its result as `Pretty`
//! (human-readable, colored) or `Json` (machine-readable), picked with
//! `--format`.

use anyhow::Result;
use colored::Colorize;
use fleet_supervisor_core::supervisor::{InstanceInfo, ModelListEntry};
use serde::Serialize;

/// Output format options shared by every read-only subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored output.
    #[default]
    Pretty,
    /// Pretty-printed JSON.
    Json,
}

/// A row suitable for JSON serialization mirroring [`ModelListEntry`].
#[derive(Serialize)]
struct ModelRow<'a> {
    model_uid: &'a str,
    replica: u32,
    worker_addresses: &'a [String],
}

/// Render the result of `list-models` in the requested format.
pub fn display_models(models: &[ModelListEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<ModelRow> = models
                .iter()
                .map(|m| ModelRow {
                    model_uid: &m.model_uid,
                    replica: m.replica,
                    worker_addresses: &m.worker_addresses,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Pretty => {
            if models.is_empty() {
                println!("{}", "No models currently running.".dimmed());
                return Ok(());
            }
            println!("{}", "Running models".bold());
            println!("{}", "─".repeat(72).dimmed());
            for model in models {
                println!(
                    "  {} {}  {} {}  {} {}",
                    "uid:".cyan(),
                    model.model_uid.bold(),
                    "replica:".cyan(),
                    model.replica,
                    "workers:".cyan(),
                    model.worker_addresses.join(", "),
                );
            }
            println!("{}", "─".repeat(72).dimmed());
        }
    }
    Ok(())
}

/// Render a single model's instance info, if known.
pub fn display_instance_info(info: Option<&InstanceInfo>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Pretty => match info {
            Some(info) => {
                println!(
                    "{} {}  {} {:?}",
                    "model_uid:".cyan(),
                    info.model_uid.bold(),
                    "status:".cyan(),
                    info.status,
                );
            }
            None => println!("{}", "No instance info recorded for that model.".dimmed()),
        },
    }
    Ok(())
}

/// Render the set of registered worker addresses.
pub fn display_workers(workers: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&workers)?),
        OutputFormat::Pretty => {
            if workers.is_empty() {
                println!("{}", "No workers registered.".dimmed());
                return Ok(());
            }
            println!("{}", "Registered workers".bold());
            for address in workers {
                println!("  {} {address}", "•".cyan());
            }
        }
    }
    Ok(())
}

/// Display an error in a user-friendly way, with an optional hint.
pub fn display_error(error: &str, suggestion: Option<&str>) {
    eprintln!();
    eprintln!("{} {}", "Error:".red().bold(), error.red());
    if let Some(hint) = suggestion {
        eprintln!();
        eprintln!("{} {}", "Hint:".yellow().bold(), hint.yellow());
    }
    eprintln!();
}
