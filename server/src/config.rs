//! Configuration management for the server.

use std::env;

use syncpatch_core::lww::LwwCoordinatorConfig;
use syncpatch_core::ot::OtCoordinatorConfig;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Secret key for token validation (placeholder for auth)
    pub auth_secret: Option<String>,
    /// Gap between committed changes that starts a new session (§6).
    pub session_timeout_minutes: u64,
    /// Committed-change count between LWW snapshot compactions (§6).
    pub snapshot_interval: u64,
    /// Wire ceiling per change; oversized changes are split (§6). `None`
    /// disables splitting.
    pub max_payload_bytes: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let auth_secret = env::var("AUTH_SECRET").ok();

        let session_timeout_minutes = env::var("SESSION_TIMEOUT_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let snapshot_interval = env::var("SNAPSHOT_INTERVAL").ok().and_then(|v| v.parse().ok()).unwrap_or(200);

        let max_payload_bytes = env::var("MAX_PAYLOAD_BYTES").ok().and_then(|v| v.parse().ok());

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            session_timeout_minutes,
            snapshot_interval,
            max_payload_bytes,
        })
    }

    pub fn ot_coordinator_config(&self) -> OtCoordinatorConfig {
        OtCoordinatorConfig { session_timeout_millis: self.session_timeout_minutes * 60 * 1000 }
    }

    pub fn lww_coordinator_config(&self) -> LwwCoordinatorConfig {
        LwwCoordinatorConfig { snapshot_interval: self.snapshot_interval }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,
}
