use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use fleet_supervisor_core::config::{init_config_file, Config, ConfigLoader};

use crate::error::CliError;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a freshly-defaulted configuration file to the standard location
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration (defaults + file + environment)
    Show {
        /// Load from this file instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file against the supervisor's schema
    Validate {
        /// Path to the config file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub async fn execute(cmd: ConfigCommands, verbose: bool) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => init_config(force, verbose),
        ConfigCommands::Show { config } => show_config(config, verbose),
        ConfigCommands::Validate { config } => validate_config(config, verbose),
    }
}

fn init_config(force: bool, verbose: bool) -> Result<()> {
    let config_path = ConfigLoader::default_config_path()
        .context("could not determine the default config directory")?;

    if config_path.exists() && !force {
        return Err(CliError::ConfigAlreadyExists {
            path: config_path.display().to_string(),
        }
        .into());
    }

    if config_path.exists() && force {
        std::fs::remove_file(&config_path).context("failed to remove existing config file")?;
    }

    let written_path = init_config_file()?;
    println!("{} wrote default configuration to {}", "✓".green().bold(), written_path.display());

    if verbose {
        let contents = std::fs::read_to_string(&written_path)?;
        println!("\n{contents}");
    }

    Ok(())
}

fn show_config(config_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = config_path {
        loader = loader.with_file(path);
    }

    let config: Config = loader.load().context("failed to load configuration")?;
    let toml_string = toml::to_string_pretty(&config).context("failed to serialize configuration")?;

    println!("{}", "Effective configuration".bold());
    println!("{}", "─".repeat(60).dimmed());
    print!("{toml_string}");
    println!("{}", "─".repeat(60).dimmed());

    if verbose {
        if let Some(path) = config_path {
            println!("\nLoaded with explicit override file: {}", path.display());
        } else if let Some(default_path) = ConfigLoader::default_config_path() {
            println!("\nDefault config location: {}", default_path.display());
        }
    }

    Ok(())
}

fn validate_config(config_path: PathBuf, verbose: bool) -> Result<()> {
    if !config_path.exists() {
        return Err(CliError::configuration(
            format!("configuration file not found: {}", config_path.display()),
            "run `supervisorctl config init` to write a default file",
        )
        .into());
    }

    let config: Config = ConfigLoader::new()
        .with_file(&config_path)
        .skip_env()
        .load()
        .map_err(|e| CliError::configuration(e.to_string(), "check the file against `supervisorctl config show`"))?;

    println!("{} configuration file is valid", "✓".green().bold());
    println!("  supervisor_address:               {}", config.supervisor_address);
    println!("  health_check_interval:            {}s", config.supervisor.health_check_interval);
    println!("  health_check_timeout:             {}s", config.supervisor.health_check_timeout);
    println!(
        "  health_check_failure_threshold:  {}",
        config.supervisor.health_check_failure_threshold
    );
    println!(
        "  default_cancel_block_duration:   {}s",
        config.supervisor.default_cancel_block_duration
    );

    if verbose {
        let contents = std::fs::read_to_string(&config_path)?;
        println!("\n{contents}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn validate_rejects_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        assert!(validate_config(missing, false).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "supervisor_address = \"127.0.0.1:9000\"\n[supervisor]\nhealth_check_interval = 10\n",
        )
        .unwrap();
        assert!(validate_config(path, false).is_ok());
    }

    #[test]
    fn validate_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[supervisor]\nhealth_check_interval = 0\n").unwrap();
        assert!(validate_config(path, false).is_err());
    }
}
