//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use wms_observability::LogFormat;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string; in-memory storage when absent.
    pub database_url: Option<String>,
    /// Shared secret expected in `X-Webhook-Token`; webhooks are open when absent.
    pub webhook_token: Option<String>,
    /// JSON file seeding the in-memory directory.
    pub directory_seed: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            webhook_token: None,
            directory_seed: None,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let bind_addr = match var("WMS_BIND_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "WMS_BIND_ADDR",
                reason: format!("{e}"),
            })?,
            None => defaults.bind_addr,
        };
        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::Invalid { name: "LOG_FORMAT", reason })?,
            None => defaults.log_format,
        };

        Ok(Self {
            bind_addr,
            database_url: var("DATABASE_URL"),
            webhook_token: var("WMS_WEBHOOK_TOKEN"),
            directory_seed: var("WMS_DIRECTORY_SEED").map(PathBuf::from),
            log_format,
        })
    }
}
