use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::time::Duration;

/// DynamoDB table names, one per entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub users: String,
    pub sessions: String,
    pub homes: String,
    pub devices: String,
    pub device_templates: String,
    pub device_readings: String,
    pub alert_rules: String,
    pub alerts: String,
}

impl Tables {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Tables {
            users: required_env("USERS_TABLE")?,
            sessions: required_env("SESSIONS_TABLE")?,
            homes: required_env("HOMES_TABLE")?,
            devices: required_env("DEVICES_TABLE")?,
            device_templates: required_env("DEVICE_TEMPLATES_TABLE")?,
            device_readings: required_env("DEVICE_READINGS_TABLE")?,
            alert_rules: required_env("ALERT_RULES_TABLE")?,
            alerts: required_env("ALERTS_TABLE")?,
        })
    }

    /// Table names with a common prefix, for tests
    #[cfg(test)]
    pub fn prefixed(prefix: &str) -> Self {
        Tables {
            users: format!("{}-users", prefix),
            sessions: format!("{}-sessions", prefix),
            homes: format!("{}-homes", prefix),
            devices: format!("{}-devices", prefix),
            device_templates: format!("{}-device-templates", prefix),
            device_readings: format!("{}-device-readings", prefix),
            alert_rules: format!("{}-alert-rules", prefix),
            alerts: format!("{}-alerts", prefix),
        }
    }
}

pub(crate) fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Storage configuration shared by every binary
#[derive(Debug, Clone)]
pub struct Config {
    pub dynamodb_client: DynamoDbClient,
    pub tables: Tables,
}

impl Config {
    /// Create a new Config from environment variables
    pub async fn from_env() -> Result<Self, ConfigError> {
        let tables = Tables::from_env()?;

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        // Leave a buffer below the Lambda timeout
        let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&aws_config)
            .timeout_config(
                aws_sdk_dynamodb::config::timeout::TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(25))
                    .operation_attempt_timeout(Duration::from_secs(10))
                    .build(),
            )
            .build();

        Ok(Config {
            dynamodb_client: DynamoDbClient::from_conf(dynamodb_config),
            tables,
        })
    }

    /// Configuration pointing at DynamoDB Local
    #[cfg(test)]
    pub fn for_test(endpoint_url: &str, tables: Tables) -> Self {
        use aws_sdk_dynamodb::config::{Credentials, Region};

        let credentials =
            Credentials::new("test_access_key", "test_secret_key", None, None, "test");

        let dynamodb_config = aws_sdk_dynamodb::config::Builder::new()
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url)
            .timeout_config(
                aws_sdk_dynamodb::config::timeout::TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(10))
                    .operation_attempt_timeout(Duration::from_secs(5))
                    .build(),
            )
            .build();

        Config {
            dynamodb_client: DynamoDbClient::from_conf(dynamodb_config),
            tables,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar { name: String, value: String },
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables
    pub static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub const TABLE_VARS: [(&str, &str); 8] = [
        ("USERS_TABLE", "test-users"),
        ("SESSIONS_TABLE", "test-sessions"),
        ("HOMES_TABLE", "test-homes"),
        ("DEVICES_TABLE", "test-devices"),
        ("DEVICE_TEMPLATES_TABLE", "test-device-templates"),
        ("DEVICE_READINGS_TABLE", "test-device-readings"),
        ("ALERT_RULES_TABLE", "test-alert-rules"),
        ("ALERTS_TABLE", "test-alerts"),
    ];

    pub fn set_table_vars() {
        for (name, value) in TABLE_VARS {
            std::env::set_var(name, value);
        }
    }

    pub fn clear_table_vars() {
        for (name, _) in TABLE_VARS {
            std::env::remove_var(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_env::*;
    use super::*;

    #[test]
    fn test_tables_from_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        set_table_vars();

        let tables = Tables::from_env().unwrap();
        assert_eq!(tables.users, "test-users");
        assert_eq!(tables.device_readings, "test-device-readings");
        assert_eq!(tables.alerts, "test-alerts");

        clear_table_vars();
    }

    #[test]
    fn test_tables_from_env_missing_var() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        set_table_vars();
        std::env::remove_var("HOMES_TABLE");

        match Tables::from_env() {
            Err(ConfigError::MissingEnvVar(var)) => assert_eq!(var, "HOMES_TABLE"),
            other => panic!("Expected MissingEnvVar error, got {:?}", other),
        }

        clear_table_vars();
    }

    #[tokio::test]
    async fn test_config_for_test() {
        let config = Config::for_test("http://localhost:8000", Tables::prefixed("it"));
        assert_eq!(config.tables.homes, "it-homes");
        assert_eq!(config.tables.device_templates, "it-device-templates");
    }
}
