//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::domain::reward_code::MIN_CODE_LENGTH;

/// Where the ledger keeps its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local maps; state is lost on restart
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            _ => Err(ConfigError::InvalidValue("STORAGE_BACKEND")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Apply the bundled schema at startup
    pub database_auto_migrate: bool,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub storage_backend: StorageBackend,

    /// Bootstrap admin key, upserted at startup when set
    pub admin_api_key: Option<String>,

    /// Length of generated reward codes
    pub reward_code_length: usize,

    /// Number of recent transactions on the dashboard
    pub recent_transactions_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::Postgres,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let database_auto_migrate = parse_or(&lookup, "DATABASE_AUTO_MIGRATE", false)?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 3000)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let admin_api_key = lookup("ADMIN_API_KEY").filter(|key| !key.trim().is_empty());

        let reward_code_length: usize = parse_or(&lookup, "REWARD_CODE_LENGTH", 10)?;
        if !(MIN_CODE_LENGTH..=32).contains(&reward_code_length) {
            return Err(ConfigError::InvalidValue("REWARD_CODE_LENGTH"));
        }

        let recent_transactions_limit: usize = parse_or(&lookup, "RECENT_TRANSACTIONS_LIMIT", 10)?;
        if recent_transactions_limit == 0 {
            return Err(ConfigError::InvalidValue("RECENT_TRANSACTIONS_LIMIT"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            database_auto_migrate,
            host,
            port,
            environment,
            storage_backend,
            admin_api_key,
            reward_code_length,
            recent_transactions_limit,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
