//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. The same configuration drives the CRUD
//! service and the `research` command line client.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which `StudyStore` backend a client talks to. Chosen once at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// Studies live in a JSON blob under the local data directory.
    Embedded,
    /// Studies live behind the CRUD service at `api_url`.
    Remote,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" | "local" => Ok(StorageMode::Embedded),
            "remote" | "api" => Ok(StorageMode::Remote),
            other => Err(format!("'{}' is not one of embedded, remote", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub storage_mode: StorageMode,
    pub api_url: String,
    pub data_dir: PathBuf,
    pub agent_delay: Duration,
    pub request_timeout: Duration,
    pub survey_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://user-research.db?mode=rwc".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Client Settings ---
        let storage_mode = std::env::var("STORAGE_MODE")
            .unwrap_or_else(|_| "embedded".to_string())
            .parse::<StorageMode>()
            .map_err(|e| ConfigError::InvalidValue("STORAGE_MODE".to_string(), e))?;

        let api_url = std::env::var("API_URL")
            .unwrap_or_else(|_| "http://localhost:4000/api".to_string())
            .trim_end_matches('/')
            .to_string();

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.user-research"));

        let agent_delay = Duration::from_millis(parse_u64("AGENT_DELAY_MS", 800)?);
        let request_timeout = Duration::from_secs(parse_u64("REQUEST_TIMEOUT_SECS", 10)?);

        let survey_base_url = std::env::var("SURVEY_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            storage_mode,
            api_url,
            data_dir,
            agent_delay,
            request_timeout,
            survey_base_url,
        })
    }

    /// The shareable link a visitor opens to take part in a study.
    pub fn survey_link(&self, study_id: &str) -> String {
        format!("{}/survey/{}", self.survey_base_url, study_id)
    }
}

fn parse_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
