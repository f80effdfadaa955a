use std::sync::Arc;

use crate::config::{required_env, Config, ConfigError};
use energy_monitor::shared::id_generator::{IdGenerator, RandomIdGenerator};
use energy_monitor::shared::time::{Clock, SystemClock};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Configuration for the REST API
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub store: Config,
    /// Bearer token for /admin routes
    pub admin_token: String,
    /// Secret mixed into session token hashes
    pub session_pepper: String,
    pub session_ttl_hours: i64,
    pub cors_allowed_origin: String,
}

impl ApiConfig {
    pub async fn from_env() -> Result<Self, ConfigError> {
        let store = Config::from_env().await?;
        Self::with_store(store)
    }

    /// Read the API-specific variables on top of an existing store config
    pub fn with_store(store: Config) -> Result<Self, ConfigError> {
        let admin_token = required_env("ADMIN_TOKEN")?;
        let session_pepper = required_env("SESSION_PEPPER")?;

        let session_ttl_hours = match std::env::var("SESSION_TTL_HOURS") {
            Ok(value) => value
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::InvalidEnvVar {
                    name: "SESSION_TTL_HOURS".to_string(),
                    value,
                })?,
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };

        let cors_allowed_origin =
            std::env::var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|_| "*".to_string());

        Ok(ApiConfig {
            store,
            admin_token,
            session_pepper,
            session_ttl_hours,
            cors_allowed_origin,
        })
    }

    #[cfg(test)]
    pub fn for_test(endpoint_url: &str) -> Self {
        use crate::config::Tables;

        ApiConfig {
            store: Config::for_test(endpoint_url, Tables::prefixed("test")),
            admin_token: "test-admin-token".to_string(),
            session_pepper: "test-pepper".to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            cors_allowed_origin: "*".to_string(),
        }
    }
}

/// Everything a request handler needs, built once per Lambda container
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            ids: Arc::new(RandomIdGenerator::new()),
        }
    }

    pub fn with_seams(config: ApiConfig, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { config, clock, ids }
    }

    pub fn client(&self) -> &aws_sdk_dynamodb::Client {
        &self.config.store.dynamodb_client
    }

    pub fn tables(&self) -> &crate::config::Tables {
        &self.config.store.tables
    }
}
