pub mod app_config;
pub mod database;
pub mod events;
pub mod hold_repo;
pub mod memory;
pub mod redis_repo;
pub mod seat_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use hold_repo::PostgresHoldStore;
pub use memory::{InMemoryHoldStore, InMemoryInventory, InMemorySeatStore, MemoryEventLog};
pub use redis_repo::RedisClient;
pub use seat_repo::PostgresSeatStore;

use altis_core::CoreError;

pub(crate) fn storage_error<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::StorageError(err.to_string())
}
