//! API server configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use stockroom_core::DEFAULT_LOW_STOCK_THRESHOLD;
use stockroom_db::{DbConfig, LedgerConfig};

const DEV_JWT_SECRET: &str = "stockroom-dev-secret-change-in-production";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address
    pub bind_addr: SocketAddr,

    /// SQLite file path
    pub database_path: String,

    /// Pool size
    pub db_max_connections: u32,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token lifetime in seconds
    pub jwt_access_lifetime_secs: i64,

    /// JWT refresh token lifetime in seconds
    pub jwt_refresh_lifetime_secs: i64,

    /// Sales leaving a product at or below this quantity raise `LowStock`
    pub low_stock_threshold: i64,

    /// Retry budget of a ledger call that hit a busy database
    pub ledger_retry_max_elapsed: Duration,

    /// Bootstrap admin account, created at startup when both are set
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = ApiConfig {
            bind_addr: parse_or(&get, "BIND_ADDR", "0.0.0.0:8000")?,

            database_path: get("DATABASE_PATH").unwrap_or_else(|| "stockroom.db".to_string()),

            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", "5")?,

            // In production this MUST be set via environment variable
            jwt_secret: get("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string()),

            jwt_access_lifetime_secs: parse_or(&get, "JWT_ACCESS_LIFETIME_SECS", "3600")?, // 1 hour

            jwt_refresh_lifetime_secs: parse_or(&get, "JWT_REFRESH_LIFETIME_SECS", "604800")?, // 7 days

            low_stock_threshold: parse_or(
                &get,
                "LOW_STOCK_THRESHOLD",
                &DEFAULT_LOW_STOCK_THRESHOLD.to_string(),
            )?,

            ledger_retry_max_elapsed: Duration::from_millis(parse_or(
                &get,
                "LEDGER_RETRY_MAX_ELAPSED_MS",
                "2000",
            )?),

            admin_username: get("ADMIN_USERNAME"),
            admin_password: get("ADMIN_PASSWORD"),
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }
        if config.jwt_access_lifetime_secs <= 0 || config.jwt_refresh_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("JWT_*_LIFETIME_SECS".to_string()));
        }
        if config.admin_username.is_some() != config.admin_password.is_some() {
            return Err(ConfigError::MissingRequired(
                "ADMIN_USERNAME and ADMIN_PASSWORD must be set together".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.db_max_connections)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            max_elapsed: self.ledger_retry_max_elapsed,
            low_stock_threshold: self.low_stock_threshold,
            ..LedgerConfig::default()
        }
    }

    /// Defaults suitable for tests.
    pub fn for_tests() -> Self {
        ApiConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_path: ":memory:".to_string(),
            db_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            jwt_access_lifetime_secs: 3600,
            jwt_refresh_lifetime_secs: 86400,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            ledger_retry_max_elapsed: Duration::from_millis(500),
            admin_username: None,
            admin_password: None,
        }
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError> {
    get(key)
        .as_deref()
        .unwrap_or(default)
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
