pub mod clock;
pub mod events;
pub mod flight;
pub mod hold;
pub mod identity;
pub mod repository;
pub mod seat;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::SeatEventSink;
pub use flight::{CabinCapacities, Flight, MAX_CABIN_SEATS};
pub use hold::{BookingReceipt, Hold, HoldGrant, HoldStatus, HoldToken};
pub use identity::Requester;
pub use repository::{HoldStore, InventoryProvider, SeatMapStore};
pub use seat::{CabinClass, SeatMutation, SeatNumber, SeatRecord, SeatState};

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Seat unavailable, held by someone else, or booked. Retryable after a refresh.
    #[error("Seat conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The hold lapsed or was released; the caller must lock again.
    #[error("Hold expired: {0}")]
    ExpiredToken(String),
    /// Lost a compare-and-set race. Retried internally, never surfaced as such.
    #[error("Version conflict on {flight_id}/{seat_number}: expected v{expected}, found v{actual}")]
    VersionConflict {
        flight_id: Uuid,
        seat_number: SeatNumber,
        expected: u64,
        actual: u64,
    },
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
