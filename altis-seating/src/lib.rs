//! Seat-inventory reservation core.
//!
//! Every seat change goes through `SeatMapStore::compare_and_set`. Multi-seat
//! operations are not transactions: they acquire seat by seat and compensate
//! whatever they already changed when a later seat fails.

pub mod flights;
pub mod locks;
pub mod policy;
pub mod reaper;
pub mod reservation;
pub mod view;

pub use flights::FlightPublisher;
pub use locks::LockManager;
pub use policy::SeatingPolicy;
pub use reaper::{ExpiryReaper, ReaperStats, SweepReport};
pub use reservation::ReservationService;
pub use view::{CabinSummary, DisplayState, SeatMapProjection, SeatMapView, SeatView};

use altis_core::{Clock, HoldStore, InventoryProvider, SeatEventSink, SeatMapStore};
use altis_shared::{SeatEventKind, SeatInventoryEvent};
use std::sync::Arc;
use uuid::Uuid;

/// Collaborators shared by all seating services.
#[derive(Clone)]
pub struct SeatingContext {
    pub seats: Arc<dyn SeatMapStore>,
    pub holds: Arc<dyn HoldStore>,
    pub inventory: Arc<dyn InventoryProvider>,
    pub events: Arc<dyn SeatEventSink>,
    pub clock: Arc<dyn Clock>,
    pub policy: SeatingPolicy,
}

impl SeatingContext {
    pub(crate) async fn emit<S: ToString>(&self, flight_id: Uuid, kind: SeatEventKind, seats: &[S]) {
        if seats.is_empty() {
            return;
        }
        let event = SeatInventoryEvent::new(
            flight_id,
            kind,
            seats.iter().map(|s| s.to_string()).collect(),
            self.clock.now().timestamp(),
        );
        self.events.publish(event).await;
    }
}

pub(crate) fn seat_list<S: ToString>(seats: &[S]) -> String {
    seats.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",")
}
