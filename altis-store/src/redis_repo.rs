use altis_core::{CabinClass, CoreResult, InventoryProvider};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use tracing::info;
use uuid::Uuid;

use crate::storage_error;

fn availability_key(flight_id: &Uuid, cabin: CabinClass) -> String {
    format!("flight:{}:availability:{}", flight_id, cabin.as_str().to_ascii_lowercase())
}

/// Hot per-cabin availability counters.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn set_cabin_availability(&self, flight_id: &Uuid, cabin: CabinClass, count: i64) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set::<_, _, ()>(availability_key(flight_id, cabin), count).await?;
        info!("Seeded {} availability for flight {}: {}", cabin, flight_id, count);
        Ok(())
    }

    pub async fn get_cabin_availability(&self, flight_id: &Uuid, cabin: CabinClass) -> RedisResult<Option<i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(availability_key(flight_id, cabin)).await
    }

    /// Adjusts the counter only when it exists, so a cache miss never seeds a bogus value.
    pub async fn adjust_cabin_availability(
        &self,
        flight_id: &Uuid,
        cabin: CabinClass,
        delta: i64,
    ) -> RedisResult<Option<i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("EXISTS", KEYS[1]) == 1 then
                return redis.call("INCRBY", KEYS[1], ARGV[1])
            else
                return nil
            end
        "#,
        );

        script
            .key(availability_key(flight_id, cabin))
            .arg(delta)
            .invoke_async(&mut conn)
            .await
    }

    pub async fn delete_flight_availability(&self, flight_id: &Uuid) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = CabinClass::ALL.iter().map(|c| availability_key(flight_id, *c)).collect();
        conn.del::<_, ()>(keys).await
    }
}

#[async_trait]
impl InventoryProvider for RedisClient {
    async fn seed_availability(&self, flight_id: Uuid, cabin: CabinClass, count: i64) -> CoreResult<()> {
        self.set_cabin_availability(&flight_id, cabin, count).await.map_err(storage_error)
    }

    async fn adjust_availability(&self, flight_id: Uuid, cabin: CabinClass, delta: i64) -> CoreResult<Option<i64>> {
        self.adjust_cabin_availability(&flight_id, cabin, delta).await.map_err(storage_error)
    }

    async fn availability(&self, flight_id: Uuid, cabin: CabinClass) -> CoreResult<Option<i64>> {
        self.get_cabin_availability(&flight_id, cabin).await.map_err(storage_error)
    }

    async fn clear_availability(&self, flight_id: Uuid) -> CoreResult<()> {
        self.delete_flight_availability(&flight_id).await.map_err(storage_error)
    }
}
