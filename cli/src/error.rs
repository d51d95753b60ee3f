use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors with contextual messages and suggestions.
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file already exists and `--force` was not given.
    #[error("configuration file already exists: {path}")]
    ConfigAlreadyExists { path: String },

    /// A config file could not be found, loaded, or parsed.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A `--worker` / `--model` / numeric argument failed basic sanity
    /// checks before ever reaching the supervisor.
    #[error("invalid input: {message}")]
    InvalidInput { message: String, suggestion: String },

    /// The in-process supervisor rejected or failed an operation.
    #[error("supervisor error: {0}")]
    Supervisor(#[from] fleet_supervisor_core::supervisor::SupervisorError),
}

impl CliError {
    /// A configuration error with an actionable suggestion attached.
    pub fn configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
            source: None,
        }
    }

    /// An invalid-input error with an actionable suggestion attached.
    pub fn invalid_input(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Print the error, followed by its suggestion (if any), to stderr.
    pub fn print_error(&self) {
        eprintln!("\n{} {}", "Error:".red().bold(), self);

        match self {
            Self::Configuration { suggestion, .. } | Self::InvalidInput { suggestion, .. } => {
                if !suggestion.is_empty() {
                    eprintln!("\n{} {}", "Suggestion:".yellow().bold(), suggestion);
                }
            }
            Self::ConfigAlreadyExists { .. } => {
                eprintln!(
                    "\n{} Pass --force to overwrite, or edit the existing file directly.",
                    "Suggestion:".yellow().bold()
                );
            }
            Self::Supervisor(_) => {}
        }
    }
}

/// Exit codes for different error scenarios.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// General error.
    pub const ERROR: i32 = 1;
    /// Configuration error.
    pub const CONFIG_ERROR: i32 = 3;
    /// Invalid input.
    pub const INVALID_INPUT: i32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_carries_suggestion() {
        let err = CliError::configuration("file not found", "run config init first");
        match err {
            CliError::Configuration { message, suggestion, .. } => {
                assert_eq!(message, "file not found");
                assert_eq!(suggestion, "run config init first");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn invalid_input_error_carries_suggestion() {
        let err = CliError::invalid_input("replica must be >= 1", "pass --replica 1 or higher");
        match err {
            CliError::InvalidInput { message, suggestion } => {
                assert_eq!(message, "replica must be >= 1");
                assert_eq!(suggestion, "pass --replica 1 or higher");
            }
            _ => panic!("wrong variant"),
        }
    }
}
