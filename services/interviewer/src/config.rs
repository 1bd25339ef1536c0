//! Application Configuration Module
//!
//! This module centralizes the configuration for the interviewer service.
//! It loads settings from environment variables and provides a single
//! struct that the binaries turn into controller settings and reviewers.

use interview_core::config::{ControllerConfig, VoiceSettings};
use interview_core::reviewer::DEFAULT_BASE_URL;
use secrecy::SecretString;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewerProvider {
    OpenAI,
    /// Local heuristics, no network and no API key.
    Offline,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub provider: ReviewerProvider,
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub log_level: Level,
    pub restart_backoff: Duration,
    pub evaluation_grace: Duration,
    pub max_follow_ups: u32,
    pub voice: VoiceSettings,
    pub feedback_dir: PathBuf,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `REVIEWER_PROVIDER`: "openai" or "offline". Defaults to "openai".
    // *   `OPENAI_API_KEY`: Secret key for the chat completions API. Required for "openai".
    // *   `OPENAI_BASE_URL`: (Optional) Any OpenAI-compatible endpoint.
    // *   `CHAT_MODEL`: (Optional) The model used to review answers. Defaults to "gpt-4o".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `CAPTURE_RESTART_BACKOFF_MS`, `EVALUATION_GRACE_MS`, `MAX_FOLLOW_UPS`: controller tuning.
    // *   `VOICE_MUTED`, `VOICE_VOLUME` (0-100), `VOICE_RATE`: interviewer voice.
    // *   `FEEDBACK_DIR`: (Optional) Where finished transcripts are written. Defaults to "feedback".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider_str = lookup("REVIEWER_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => ReviewerProvider::OpenAI,
            "offline" => ReviewerProvider::Offline,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "REVIEWER_PROVIDER".to_string(),
                    format!("'{provider_str}' is not one of openai, offline"),
                ));
            }
        };

        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        let openai_base_url =
            lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let defaults = ControllerConfig::default();
        let restart_backoff = Duration::from_millis(parse_or(
            &lookup,
            "CAPTURE_RESTART_BACKOFF_MS",
            defaults.restart_backoff.as_millis() as u64,
        )?);
        let evaluation_grace = Duration::from_millis(parse_or(
            &lookup,
            "EVALUATION_GRACE_MS",
            defaults.evaluation_grace.as_millis() as u64,
        )?);
        let max_follow_ups = parse_or(&lookup, "MAX_FOLLOW_UPS", defaults.max_follow_ups)?;
        let voice = VoiceSettings {
            rate: parse_or(&lookup, "VOICE_RATE", defaults.voice.rate)?,
            muted: parse_or(&lookup, "VOICE_MUTED", defaults.voice.muted)?,
            ..defaults.voice.clone()
        }
        .with_volume_percent(parse_or(&lookup, "VOICE_VOLUME", 100u8)?);
        let feedback_dir = lookup("FEEDBACK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("feedback"));

        let config = Self {
            provider,
            openai_api_key,
            openai_base_url,
            chat_model,
            log_level,
            restart_backoff,
            evaluation_grace,
            max_follow_ups,
            voice,
            feedback_dir,
        };

        // Validate that the required API key is present for the selected provider.
        if config.provider == ReviewerProvider::OpenAI && config.openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for openai provider".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            restart_backoff: self.restart_backoff,
            evaluation_grace: self.evaluation_grace,
            max_follow_ups: self.max_follow_ups,
            voice: self.voice.clone(),
            ..ControllerConfig::default()
        }
    }
}
