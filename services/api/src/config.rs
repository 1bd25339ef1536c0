use interview_service::config::{Config as InterviewConfig, ConfigError as InterviewConfigError};
use std::net::SocketAddr;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error(transparent)]
    Interview(#[from] InterviewConfigError),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Reviewer, controller tuning, feedback directory and log level. Shared
    /// with the terminal interviewer.
    pub interview: InterviewConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to (e.g., "0.0.0.0:3000").
    /// *   Everything the terminal interviewer reads (`REVIEWER_PROVIDER`,
    ///     `OPENAI_API_KEY`, `CHAT_MODEL`, `RUST_LOG`, `FEEDBACK_DIR`, ...).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let interview = InterviewConfig::from_lookup(lookup)?;

        Ok(Self {
            bind_address,
            interview,
        })
    }
}
