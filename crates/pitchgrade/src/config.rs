//! Evaluation configuration: loading, defaults, validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scoring oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OracleConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// API key. Empty means "take it from the PITCHGRADE_ORACLE_KEY
    /// environment variable".
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            request_timeout_secs: 60,
        }
    }
}

impl OracleConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolves the API key, preferring the config file over the
    /// environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("PITCHGRADE_ORACLE_KEY").ok().filter(|k| !k.is_empty())
    }
}

/// Top-level evaluation configuration. Every field has a default, so an
/// empty JSON object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EvalConfig {
    /// Worker polling interval in seconds.
    pub poll_interval_secs: u64,
    /// Hard per-job processing timeout in seconds.
    pub job_timeout_secs: u64,
    /// Retry ceiling for evaluation jobs.
    pub max_retries: u32,
    /// Backoff delays in seconds, indexed by attempt number.
    pub backoff_schedule_secs: Vec<u64>,
    /// Terminal jobs older than this many days are cleaned up.
    pub cleanup_after_days: u32,
    /// Minimum oracle-backed scores for an attempt to succeed.
    pub min_scored_questions: u32,
    /// Database file path; `None` selects the default location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    pub oracle: OracleConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            job_timeout_secs: 600,
            max_retries: 3,
            backoff_schedule_secs: vec![30, 120, 300],
            cleanup_after_days: 7,
            min_scored_questions: 1,
            database_path: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl EvalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_schedule_secs
            .iter()
            .map(|&s| Duration::from_secs(s))
            .collect()
    }

    pub fn cleanup_after(&self) -> Duration {
        Duration::from_secs(u64::from(self.cleanup_after_days) * 24 * 60 * 60)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EvalConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EvalConfig, ConfigError> {
    let config: EvalConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &EvalConfig) -> Result<(), ConfigError> {
    if config.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "pollIntervalSecs must be greater than zero".to_string(),
        });
    }
    if config.job_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "jobTimeoutSecs must be greater than zero".to_string(),
        });
    }
    if config.max_retries == 0 {
        return Err(ConfigError::Validation {
            message: "maxRetries must be at least 1".to_string(),
        });
    }
    if config.backoff_schedule_secs.is_empty() {
        return Err(ConfigError::Validation {
            message: "backoffScheduleSecs must not be empty".to_string(),
        });
    }
    if config.oracle.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "oracle.endpoint must not be empty".to_string(),
        });
    }
    if config.oracle.model.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "oracle.model must not be empty".to_string(),
        });
    }
    Ok(())
}
