use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub seating: SeatingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SeatingConfig {
    pub default_hold_seconds: u64,
    pub max_hold_seconds: u64,
    pub reaper_interval_seconds: u64,
    pub cas_max_retries: u32,
    pub receipt_retention_seconds: u64,
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            default_hold_seconds: 900,
            max_hold_seconds: 1800,
            reaper_interval_seconds: 30,
            cas_max_retries: 3,
            receipt_retention_seconds: 86_400,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `ALTIS__SEATING__DEFAULT_HOLD_SECONDS=600`
            .add_source(config::Environment::with_prefix("ALTIS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_minimal_config_uses_seating_defaults() {
        let raw = r#"
            [server]
            port = 8080

            [store]
            backend = "memory"

            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600

            [seating]
            default_hold_seconds = 300
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.database.is_none());
        assert_eq!(config.seating.default_hold_seconds, 300);
        assert_eq!(config.seating.reaper_interval_seconds, 30);
        assert_eq!(config.seating.cas_max_retries, 3);
    }
}
