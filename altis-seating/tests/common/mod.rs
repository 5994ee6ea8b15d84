#![allow(dead_code)]

use altis_core::{CabinCapacities, CabinClass, Flight, ManualClock, SeatMapStore, SeatNumber};
use altis_seating::{
    ExpiryReaper, FlightPublisher, LockManager, ReservationService, SeatMapView, SeatingContext, SeatingPolicy,
};
use altis_store::{InMemoryHoldStore, InMemoryInventory, InMemorySeatStore, MemoryEventLog};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

pub const CAPACITIES: CabinCapacities = CabinCapacities {
    first: 4,
    business: 8,
    economy: 120,
};

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub events: Arc<MemoryEventLog>,
    pub inventory: Arc<InMemoryInventory>,
    pub ctx: SeatingContext,
    pub locks: LockManager,
    pub reservations: ReservationService,
    pub view: SeatMapView,
    pub flights: FlightPublisher,
    pub reaper: ExpiryReaper,
    pub flight: Flight,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(InMemorySeatStore::new())).await
    }

    pub async fn with_store(seats: Arc<dyn SeatMapStore>) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
        let events = Arc::new(MemoryEventLog::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let ctx = SeatingContext {
            seats,
            holds: Arc::new(InMemoryHoldStore::new()),
            inventory: inventory.clone(),
            events: events.clone(),
            clock: clock.clone(),
            policy: SeatingPolicy::default(),
        };

        let flights = FlightPublisher::new(ctx.clone());
        let flight = flights.publish("AL204", CAPACITIES).await.unwrap();

        Self {
            clock,
            events,
            inventory,
            locks: LockManager::new(ctx.clone()),
            reservations: ReservationService::new(ctx.clone()),
            view: SeatMapView::new(&ctx),
            reaper: ExpiryReaper::new(ctx.clone(), Duration::from_secs(30)),
            flights,
            ctx,
            flight,
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(chrono::Duration::seconds(seconds));
    }

    pub async fn economy_counter(&self) -> Option<i64> {
        self.flights
            .availability(self.flight.id)
            .await
            .into_iter()
            .find(|(cabin, _)| *cabin == CabinClass::Economy)
            .and_then(|(_, value)| value)
    }
}

pub fn seats(names: &[&str]) -> Vec<SeatNumber> {
    names.iter().map(|s| s.parse().unwrap()).collect()
}
