use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::SeatingConfig;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Applies hold-duration overrides from the `business_rules` table.
    pub async fn fetch_seating_rules(&self, defaults: SeatingConfig) -> Result<SeatingConfig, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

// Expected format: {"value": <number>}
fn apply_rule_overrides(defaults: SeatingConfig, rows: Vec<(String, Value)>) -> SeatingConfig {
    let mut rules = defaults;

    for (key, value) in rows {
        let Some(v) = value.get("value").and_then(Value::as_u64) else {
            continue;
        };
        match key.as_str() {
            "seat_hold_seconds" => rules.default_hold_seconds = v,
            "max_seat_hold_seconds" => rules.max_hold_seconds = v,
            "reaper_interval_seconds" => rules.reaper_interval_seconds = v,
            _ => {}
        }
    }

    rules
}
