use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::flight::Flight;
use crate::hold::{Hold, HoldToken};
use crate::seat::{CabinClass, SeatMutation, SeatNumber, SeatRecord};
use crate::CoreResult;

/// Authoritative per-flight seat records.
///
/// `compare_and_set` is the only way to change a seat. Implementations
/// must serialise it per record and reject it with
/// `CoreError::VersionConflict` when the stored version differs.
#[async_trait]
pub trait SeatMapStore: Send + Sync {
    /// Stores the flight together with its initial (AVAILABLE) seats.
    async fn create_flight(&self, flight: &Flight, seats: &[SeatRecord]) -> CoreResult<()>;

    async fn get_flight(&self, flight_id: Uuid) -> CoreResult<Flight>;

    /// Drops the flight and all of its seat records.
    async fn remove_flight(&self, flight_id: Uuid) -> CoreResult<()>;

    async fn get_seat(&self, flight_id: Uuid, seat_number: &SeatNumber) -> CoreResult<SeatRecord>;

    /// All seats of a flight ordered by row, then column.
    async fn list_seats(&self, flight_id: Uuid) -> CoreResult<Vec<SeatRecord>>;

    async fn compare_and_set(
        &self,
        flight_id: Uuid,
        seat_number: &SeatNumber,
        expected_version: u64,
        mutation: &SeatMutation,
    ) -> CoreResult<SeatRecord>;

    /// Snapshot of HELD seats whose hold expired at or before `now`, across flights.
    async fn expired_holds(&self, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>>;
}

/// Durable hold metadata, keyed by token.
#[async_trait]
pub trait HoldStore: Send + Sync {
    /// Insert or overwrite.
    async fn save_hold(&self, hold: &Hold) -> CoreResult<()>;

    async fn get_hold(&self, token: &HoldToken) -> CoreResult<Option<Hold>>;

    async fn list_holds_by_owner(&self, flight_id: Uuid, owner_id: &str) -> CoreResult<Vec<Hold>>;

    /// Deletes holds that expired before `cutoff`. Returns how many went.
    async fn purge_holds(&self, cutoff: DateTime<Utc>) -> CoreResult<u64>;

    async fn delete_flight_holds(&self, flight_id: Uuid) -> CoreResult<u64>;
}

/// Flight/inventory provider: per-cabin availability counters.
///
/// Counters are advisory. Seat state is never derived from them.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    async fn seed_availability(&self, flight_id: Uuid, cabin: CabinClass, count: i64) -> CoreResult<()>;

    /// Adds `delta` if the counter exists; returns the new value or `None` on a miss.
    async fn adjust_availability(&self, flight_id: Uuid, cabin: CabinClass, delta: i64) -> CoreResult<Option<i64>>;

    async fn availability(&self, flight_id: Uuid, cabin: CabinClass) -> CoreResult<Option<i64>>;

    async fn clear_availability(&self, flight_id: Uuid) -> CoreResult<()>;
}
