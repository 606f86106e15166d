//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on malformed values. Sensitive
//! values are wrapped in `secrecy::SecretString` to keep them out of logs.

pub mod policy;

pub use policy::{GenerationPolicy, QualityThresholds, ScoringWeights};
pub use secrecy::{ExposeSecret, SecretString};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug)]
pub struct Config {
    /// Postgres store and pgmq queue; in-memory when unset.
    pub database_url: Option<SecretString>,
    /// Enables the Anthropic completion provider.
    pub anthropic_api_key: Option<SecretString>,
    pub anthropic_model: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub policy_file: Option<PathBuf>,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub job_timeout: Duration,
    pub backoff_base: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            database_url: var("DATABASE_URL").map(SecretString::from),
            anthropic_api_key: var("ANTHROPIC_API_KEY").map(SecretString::from),
            anthropic_model: var("ANTHROPIC_MODEL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            policy_file: var("CASEGEN_POLICY_FILE").map(PathBuf::from),
            max_concurrent: parsed(&var, "CASEGEN_MAX_CONCURRENT", 4)?,
            max_attempts: parsed(&var, "CASEGEN_MAX_ATTEMPTS", 3)?,
            job_timeout: Duration::from_secs(parsed(&var, "CASEGEN_JOB_TIMEOUT_SECS", 60)?),
            backoff_base: Duration::from_millis(parsed(&var, "CASEGEN_BACKOFF_MS", 500)?),
        };

        if config.max_concurrent == 0 {
            return Err(Error::Config(
                "CASEGEN_MAX_CONCURRENT must be at least 1".to_string(),
            ));
        }
        if config.max_attempts == 0 {
            return Err(Error::Config(
                "CASEGEN_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// The database URL, for commands that cannot run without Postgres.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }

    /// The generation policy from `CASEGEN_POLICY_FILE`, or the defaults.
    pub fn policy(&self) -> Result<GenerationPolicy> {
        match &self.policy_file {
            Some(path) => GenerationPolicy::load(path),
            None => Ok(GenerationPolicy::default()),
        }
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw:?}"))),
    }
}
