// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration management for the fleet supervisor.
//!
//! This module provides a hierarchical configuration system with the
//! following precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file
//! 3. Defaults (lowest priority)
//!
//! # Examples
//!
//! ```no_run
//! use fleet_supervisor_core::config::ConfigLoader;
//!
//! # fn example() -> anyhow::Result<()> {
//! // Load configuration with all sources
//! let config = ConfigLoader::new().load()?;
//!
//! // Load from a specific file
//! let config = ConfigLoader::new()
//!     .with_file("/path/to/config.toml")
//!     .load()?;
//!
//! // Load with environment variable overrides
//! std::env::set_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_INTERVAL", "10");
//! let config = ConfigLoader::new().load()?;
//! # Ok(())
//! # }
//! ```

pub mod models;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde_valid::Validate;
use std::path::{Path, PathBuf};

pub use models::Config;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "fleet-supervisor";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "LLM_TEST_BENCH_SUPERVISOR";

/// Environment variable separator for nested configuration, e.g.
/// `LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_INTERVAL`.
const ENV_SEPARATOR: &str = "__";

/// Configuration loader with builder pattern.
///
/// Provides a flexible way to load configuration from multiple sources
/// with proper precedence handling.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Optional custom configuration file path.
    custom_file: Option<PathBuf>,
    /// Whether to skip loading from the default config file.
    skip_default_file: bool,
    /// Whether to skip loading from environment variables.
    skip_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration file instead of the default location.
    #[must_use]
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.custom_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skip loading from the default configuration file.
    #[must_use]
    pub fn skip_default_file(mut self) -> Self {
        self.skip_default_file = true;
        self
    }

    /// Skip loading from environment variables.
    #[must_use]
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Load the configuration from all enabled sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be parsed, an environment
    /// variable has an invalid format, or the result fails validation.
    pub fn load(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::builder();

        let defaults = Config::default();
        let defaults_map = config_to_map(&defaults)?;
        builder = builder.add_source(config::Config::try_from(&defaults_map)?);

        if !self.skip_default_file {
            if let Some(config_path) = self.find_config_file() {
                tracing::debug!(path = %config_path.display(), "loading config file");
                builder = builder.add_source(
                    File::from(config_path)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            } else {
                tracing::debug!("no default config file found");
            }
        }

        if let Some(ref custom_path) = self.custom_file {
            tracing::info!(path = %custom_path.display(), "loading custom config file");
            builder = builder.add_source(
                File::from(custom_path.as_ref())
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        if !self.skip_env {
            tracing::debug!("loading config from environment variables");
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let config_result = builder.build().context("failed to build configuration")?;

        let config: Config = config_result
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;

        tracing::info!("configuration loaded");
        Ok(config)
    }

    /// Search the usual locations for a default config file.
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Some(local_config);
        }

        None
    }

    /// The platform-specific configuration directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
    }

    /// The full path where the default config file is expected.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }
}

/// Serialize a [`Config`] to a JSON map so it can seed the builder's
/// default layer.
fn config_to_map(config: &Config) -> Result<serde_json::Value, ConfigError> {
    serde_json::to_value(config).map_err(|e| ConfigError::Foreign(Box::new(e)))
}

/// Write a freshly-defaulted config file to the standard location.
///
/// # Errors
///
/// Returns an error if the config directory cannot be determined or
/// created, if a file already exists there, or if the write fails.
pub fn init_config_file() -> Result<PathBuf> {
    let config_dir =
        ConfigLoader::default_config_dir().context("could not determine config directory")?;

    std::fs::create_dir_all(&config_dir).context("failed to create config directory")?;

    let config_path = config_dir.join(CONFIG_FILE_NAME);

    if config_path.exists() {
        anyhow::bail!("config file already exists at: {}", config_path.display());
    }

    let default_config = Config::default();
    let toml_content =
        toml::to_string_pretty(&default_config).context("failed to serialize default config")?;

    std::fs::write(&config_path, toml_content).context("failed to write config file")?;

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn load_default_config() {
        let config = ConfigLoader::new()
            .skip_default_file()
            .skip_env()
            .load()
            .expect("failed to load default config");

        assert_eq!(config.supervisor.health_check_interval, 30);
        assert_eq!(config.supervisor.health_check_failure_threshold, 3);
    }

    #[test]
    fn load_from_custom_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        std::fs::write(
            &config_path,
            r#"
supervisor_address = "10.0.0.1:9000"

[supervisor]
health_check_interval = 10
health_check_timeout = 45
health_check_failure_threshold = 5
default_cancel_block_duration = 60
disable_health_monitor = true
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(&config_path)
            .skip_env()
            .load()
            .expect("failed to load custom config");

        assert_eq!(config.supervisor_address, "10.0.0.1:9000");
        assert_eq!(config.supervisor.health_check_interval, 10);
        assert!(config.supervisor.disable_health_monitor);
    }

    #[test]
    fn environment_variable_override() {
        env::set_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_INTERVAL", "20");
        env::set_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_FAILURE_THRESHOLD", "7");

        let config = ConfigLoader::new()
            .skip_default_file()
            .load()
            .expect("failed to load config with env vars");

        assert_eq!(config.supervisor.health_check_interval, 20);
        assert_eq!(config.supervisor.health_check_failure_threshold, 7);

        env::remove_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_INTERVAL");
        env::remove_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_FAILURE_THRESHOLD");
    }

    #[test]
    fn env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        std::fs::write(
            &config_path,
            "[supervisor]\nhealth_check_interval = 5\n",
        )
        .unwrap();

        env::set_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_INTERVAL", "15");

        let config = ConfigLoader::new()
            .with_file(&config_path)
            .load()
            .expect("failed to load config");

        assert_eq!(config.supervisor.health_check_interval, 15);

        env::remove_var("LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__HEALTH_CHECK_INTERVAL");
    }

    #[test]
    fn validation_failure_rejects_zero_interval() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid_config.toml");

        std::fs::write(
            &config_path,
            "[supervisor]\nhealth_check_interval = 0\n",
        )
        .unwrap();

        let result = ConfigLoader::new()
            .with_file(&config_path)
            .skip_env()
            .load();

        assert!(result.is_err());
    }

    #[test]
    fn default_config_dir_contains_project_name() {
        let config_dir = ConfigLoader::default_config_dir();
        assert!(config_dir.is_some());
        if let Some(dir) = config_dir {
            assert!(dir.to_string_lossy().contains("fleet-supervisor"));
        }
    }

    #[test]
    fn default_config_path_ends_with_toml() {
        let config_path = ConfigLoader::default_config_path();
        assert!(config_path.is_some());
        if let Some(path) = config_path {
            assert!(path.to_string_lossy().ends_with("config.toml"));
        }
    }
}
