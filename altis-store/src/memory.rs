//! In-process backends for tests and single-node development.
//!
//! The seat arena is built once per flight and never reshaped; each seat
//! record sits behind its own mutex so a compare-and-set only serialises
//! writers of that one seat.

use altis_core::{
    CabinClass, CoreError, CoreResult, Flight, Hold, HoldStore, HoldToken, InventoryProvider, SeatEventSink,
    SeatMapStore, SeatMutation, SeatNumber, SeatRecord,
};
use altis_shared::SeatInventoryEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

fn poisoned(what: &str) -> CoreError {
    CoreError::StorageError(format!("{} lock poisoned", what))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> CoreResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| poisoned(what))
}

struct FlightSlot {
    flight: Flight,
    seats: BTreeMap<SeatNumber, Mutex<SeatRecord>>,
}

#[derive(Default)]
pub struct InMemorySeatStore {
    flights: RwLock<HashMap<Uuid, Arc<FlightSlot>>>,
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, flight_id: Uuid) -> CoreResult<Arc<FlightSlot>> {
        let flights = self.flights.read().map_err(|_| poisoned("flight index"))?;
        flights
            .get(&flight_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("flight {}", flight_id)))
    }

    fn slots(&self) -> CoreResult<Vec<Arc<FlightSlot>>> {
        let flights = self.flights.read().map_err(|_| poisoned("flight index"))?;
        Ok(flights.values().cloned().collect())
    }
}

#[async_trait]
impl SeatMapStore for InMemorySeatStore {
    async fn create_flight(&self, flight: &Flight, seats: &[SeatRecord]) -> CoreResult<()> {
        let mut index = BTreeMap::new();
        for seat in seats {
            if seat.flight_id != flight.id {
                return Err(CoreError::ValidationError(format!(
                    "seat {} belongs to flight {}",
                    seat.seat_number, seat.flight_id
                )));
            }
            index.insert(seat.seat_number.clone(), Mutex::new(seat.clone()));
        }

        let mut flights = self.flights.write().map_err(|_| poisoned("flight index"))?;
        if flights.contains_key(&flight.id) {
            return Err(CoreError::Conflict(format!("flight {} already exists", flight.id)));
        }
        flights.insert(flight.id, Arc::new(FlightSlot { flight: flight.clone(), seats: index }));
        Ok(())
    }

    async fn get_flight(&self, flight_id: Uuid) -> CoreResult<Flight> {
        Ok(self.slot(flight_id)?.flight.clone())
    }

    async fn remove_flight(&self, flight_id: Uuid) -> CoreResult<()> {
        let mut flights = self.flights.write().map_err(|_| poisoned("flight index"))?;
        flights
            .remove(&flight_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("flight {}", flight_id)))
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &SeatNumber) -> CoreResult<SeatRecord> {
        let slot = self.slot(flight_id)?;
        let cell = slot
            .seats
            .get(seat_number)
            .ok_or_else(|| CoreError::NotFound(format!("seat {} on flight {}", seat_number, flight_id)))?;
        let record = lock(cell, "seat")?;
        Ok(record.clone())
    }

    async fn list_seats(&self, flight_id: Uuid) -> CoreResult<Vec<SeatRecord>> {
        let slot = self.slot(flight_id)?;
        slot.seats
            .values()
            .map(|cell| lock(cell, "seat").map(|record| record.clone()))
            .collect()
    }

    async fn compare_and_set(
        &self,
        flight_id: Uuid,
        seat_number: &SeatNumber,
        expected_version: u64,
        mutation: &SeatMutation,
    ) -> CoreResult<SeatRecord> {
        let slot = self.slot(flight_id)?;
        let cell = slot
            .seats
            .get(seat_number)
            .ok_or_else(|| CoreError::NotFound(format!("seat {} on flight {}", seat_number, flight_id)))?;

        let mut record = lock(cell, "seat")?;
        if record.version != expected_version {
            return Err(CoreError::VersionConflict {
                flight_id,
                seat_number: seat_number.clone(),
                expected: expected_version,
                actual: record.version,
            });
        }
        *record = record.apply(mutation);
        Ok(record.clone())
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>> {
        let mut expired = Vec::new();
        for slot in self.slots()? {
            for cell in slot.seats.values() {
                let record = lock(cell, "seat")?;
                if record.is_expired_hold(now) {
                    expired.push(record.clone());
                }
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemoryHoldStore {
    holds: Mutex<HashMap<HoldToken, Hold>>,
}

impl InMemoryHoldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldStore for InMemoryHoldStore {
    async fn save_hold(&self, hold: &Hold) -> CoreResult<()> {
        lock(&self.holds, "hold")?.insert(hold.token, hold.clone());
        Ok(())
    }

    async fn get_hold(&self, token: &HoldToken) -> CoreResult<Option<Hold>> {
        Ok(lock(&self.holds, "hold")?.get(token).cloned())
    }

    async fn list_holds_by_owner(&self, flight_id: Uuid, owner_id: &str) -> CoreResult<Vec<Hold>> {
        let holds = lock(&self.holds, "hold")?;
        let mut owned: Vec<Hold> = holds
            .values()
            .filter(|h| h.flight_id == flight_id && h.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|h| h.created_at);
        Ok(owned)
    }

    async fn purge_holds(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let mut holds = lock(&self.holds, "hold")?;
        let before = holds.len();
        holds.retain(|_, h| h.expires_at >= cutoff);
        Ok((before - holds.len()) as u64)
    }

    async fn delete_flight_holds(&self, flight_id: Uuid) -> CoreResult<u64> {
        let mut holds = lock(&self.holds, "hold")?;
        let before = holds.len();
        holds.retain(|_, h| h.flight_id != flight_id);
        Ok((before - holds.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryInventory {
    counters: Mutex<HashMap<(Uuid, CabinClass), i64>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryProvider for InMemoryInventory {
    async fn seed_availability(&self, flight_id: Uuid, cabin: CabinClass, count: i64) -> CoreResult<()> {
        lock(&self.counters, "inventory")?.insert((flight_id, cabin), count);
        Ok(())
    }

    async fn adjust_availability(&self, flight_id: Uuid, cabin: CabinClass, delta: i64) -> CoreResult<Option<i64>> {
        let mut counters = lock(&self.counters, "inventory")?;
        Ok(counters.get_mut(&(flight_id, cabin)).map(|count| {
            *count += delta;
            *count
        }))
    }

    async fn availability(&self, flight_id: Uuid, cabin: CabinClass) -> CoreResult<Option<i64>> {
        Ok(lock(&self.counters, "inventory")?.get(&(flight_id, cabin)).copied())
    }

    async fn clear_availability(&self, flight_id: Uuid) -> CoreResult<()> {
        lock(&self.counters, "inventory")?.retain(|(id, _), _| *id != flight_id);
        Ok(())
    }
}

/// Event sink that keeps everything it is given.
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<SeatInventoryEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SeatInventoryEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SeatEventSink for MemoryEventLog {
    async fn publish(&self, event: SeatInventoryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use altis_core::{CabinCapacities, SeatState};
    use chrono::Duration;

    fn flight() -> Flight {
        Flight::new("AL200", CabinCapacities { first: 0, business: 4, economy: 6 }, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_version() {
        let store = InMemorySeatStore::new();
        let flight = flight();
        store.create_flight(&flight, &flight.seat_layout().unwrap()).await.unwrap();
        let seat: SeatNumber = "1A".parse().unwrap();

        let updated = store
            .compare_and_set(flight.id, &seat, 0, &SeatMutation::Book { booking_id: "BKG-9".to_string() })
            .await
            .unwrap();
        assert_eq!(updated.version, 1);

        let stale = store.compare_and_set(flight.id, &seat, 0, &SeatMutation::Release).await;
        assert!(matches!(stale, Err(CoreError::VersionConflict { expected: 0, actual: 1, .. })));
        assert_eq!(store.get_seat(flight.id, &seat).await.unwrap().state, SeatState::Booked);
    }

    #[tokio::test]
    async fn test_list_seats_is_ordered_and_flight_scoped() {
        let store = InMemorySeatStore::new();
        let flight = flight();
        store.create_flight(&flight, &flight.seat_layout().unwrap()).await.unwrap();

        let seats = store.list_seats(flight.id).await.unwrap();
        assert_eq!(seats.len(), 10);
        assert!(seats.windows(2).all(|w| w[0].seat_number < w[1].seat_number));

        assert!(matches!(store.list_seats(Uuid::new_v4()).await, Err(CoreError::NotFound(_))));
        assert!(matches!(
            store.create_flight(&flight, &[]).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_holds_snapshot() {
        let store = InMemorySeatStore::new();
        let flight = flight();
        store.create_flight(&flight, &flight.seat_layout().unwrap()).await.unwrap();
        let now = Utc::now();

        let hold = |expires_at| SeatMutation::Hold {
            holder_id: "user-1".to_string(),
            token: HoldToken::generate(),
            expires_at,
        };
        store.compare_and_set(flight.id, &"1A".parse().unwrap(), 0, &hold(now - Duration::seconds(1))).await.unwrap();
        store.compare_and_set(flight.id, &"1C".parse().unwrap(), 0, &hold(now + Duration::seconds(60))).await.unwrap();

        let expired = store.expired_holds(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].seat_number.to_string(), "1A");
    }

    #[tokio::test]
    async fn test_inventory_adjust_only_existing_counters() {
        let inventory = InMemoryInventory::new();
        let flight_id = Uuid::new_v4();

        assert_eq!(inventory.adjust_availability(flight_id, CabinClass::Economy, -1).await.unwrap(), None);
        inventory.seed_availability(flight_id, CabinClass::Economy, 10).await.unwrap();
        assert_eq!(inventory.adjust_availability(flight_id, CabinClass::Economy, -2).await.unwrap(), Some(8));

        inventory.clear_availability(flight_id).await.unwrap();
        assert_eq!(inventory.availability(flight_id, CabinClass::Economy).await.unwrap(), None);
    }
}
