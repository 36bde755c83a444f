//! Process configuration loaded from environment variables.

use std::net::SocketAddr;

use thiserror::Error;

use stockbook_inventory::StockPolicy;
use stockbook_observability::{LogConfig, LogFormat};

pub const DEV_JWT_SECRET: &str = "dev-secret";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Production,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub policy: StockPolicy,
    /// Extra attempts after a serialization failure or stale version.
    pub max_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            policy: StockPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Set when `JWT_SECRET` was absent and the dev default is in use.
    pub jwt_secret_defaulted: bool,
    /// `None` runs the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub ledger: LedgerConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("STOCKBOOK_ENV").as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("dev") | Some("development") | Some("local") => Environment::Dev,
            _ => Environment::Production,
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                message: e.to_string(),
            })?;

        let (jwt_secret, jwt_secret_defaulted) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None if environment == Environment::Dev => (DEV_JWT_SECRET.to_string(), true),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), DEFAULT_MAX_CONNECTIONS)?,
            }),
            None => None,
        };

        let policy = match get("STOCK_POLICY") {
            Some(raw) => raw.parse::<StockPolicy>().map_err(|e| ConfigError::Invalid {
                key: "STOCK_POLICY",
                message: e.to_string(),
            })?,
            None => StockPolicy::default(),
        };
        let ledger = LedgerConfig {
            policy,
            max_retries: parse_or("LEDGER_MAX_RETRIES", get("LEDGER_MAX_RETRIES"), DEFAULT_MAX_RETRIES)?,
        };

        let mut log = LogConfig::default();
        if let Some(level) = get("LOG_LEVEL") {
            log.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            log.format = format
                .parse::<LogFormat>()
                .map_err(|message| ConfigError::Invalid { key: "LOG_FORMAT", message })?;
        }

        Ok(Self {
            environment,
            bind_addr,
            jwt_secret,
            jwt_secret_defaulted,
            database,
            ledger,
            log,
        })
    }
}

fn parse_or(key: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match raw {
        Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
            key,
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
