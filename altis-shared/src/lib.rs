pub mod models;

pub use models::events::{SeatEventKind, SeatInventoryEvent};
