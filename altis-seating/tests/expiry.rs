mod common;

use altis_core::{
    Clock, CoreError, CoreResult, Flight, HoldToken, SeatMapStore, SeatMutation, SeatNumber, SeatRecord, SeatState,
};
use altis_seating::ExpiryReaper;
use altis_shared::SeatEventKind;
use altis_store::InMemorySeatStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{seats, Harness};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Seat store that lets a test act between the reaper's snapshot and its writes.
#[derive(Default)]
struct InterleavingStore {
    inner: InMemorySeatStore,
    after_snapshot: Mutex<Option<(Uuid, SeatNumber, Vec<SeatMutation>)>>,
    pause: Mutex<bool>,
    entered: Notify,
    resume: Notify,
}

impl InterleavingStore {
    fn after_snapshot(&self, flight_id: Uuid, seat: SeatNumber, mutations: Vec<SeatMutation>) {
        *self.after_snapshot.lock().unwrap() = Some((flight_id, seat, mutations));
    }
}

#[async_trait]
impl SeatMapStore for InterleavingStore {
    async fn create_flight(&self, flight: &Flight, seats: &[SeatRecord]) -> CoreResult<()> {
        self.inner.create_flight(flight, seats).await
    }

    async fn get_flight(&self, flight_id: Uuid) -> CoreResult<Flight> {
        self.inner.get_flight(flight_id).await
    }

    async fn remove_flight(&self, flight_id: Uuid) -> CoreResult<()> {
        self.inner.remove_flight(flight_id).await
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &SeatNumber) -> CoreResult<SeatRecord> {
        self.inner.get_seat(flight_id, seat_number).await
    }

    async fn list_seats(&self, flight_id: Uuid) -> CoreResult<Vec<SeatRecord>> {
        self.inner.list_seats(flight_id).await
    }

    async fn compare_and_set(
        &self,
        flight_id: Uuid,
        seat_number: &SeatNumber,
        expected_version: u64,
        mutation: &SeatMutation,
    ) -> CoreResult<SeatRecord> {
        self.inner.compare_and_set(flight_id, seat_number, expected_version, mutation).await
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>> {
        let snapshot = self.inner.expired_holds(now).await?;

        let paused = *self.pause.lock().unwrap();
        if paused {
            self.entered.notify_one();
            self.resume.notified().await;
        }

        let interjection = self.after_snapshot.lock().unwrap().take();
        if let Some((flight_id, seat, mutations)) = interjection {
            for mutation in mutations {
                let current = self.inner.get_seat(flight_id, &seat).await?;
                self.inner.compare_and_set(flight_id, &seat, current.version, &mutation).await?;
            }
        }
        Ok(snapshot)
    }
}

#[tokio::test]
async fn test_sweep_reclaims_lapsed_holds() {
    let h = Harness::new().await;
    h.locks.lock(h.flight.id, &seats(&["12A", "12B"]), "alice", Some(5)).await.unwrap();
    h.locks.lock(h.flight.id, &seats(&["14C"]), "bob", Some(60)).await.unwrap();

    let report = h.reaper.sweep().await.unwrap();
    assert_eq!(report.reclaimed, 0);

    h.advance(6);
    let report = h.reaper.sweep().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.lost_races, 0);

    for name in ["12A", "12B"] {
        let record = h.ctx.seats.get_seat(h.flight.id, &seats(&[name])[0]).await.unwrap();
        assert_eq!(record.state, SeatState::Available);
        assert!(record.holder_id.is_none());
    }
    let held = h.ctx.seats.get_seat(h.flight.id, &seats(&["14C"])[0]).await.unwrap();
    assert_eq!(held.state, SeatState::Held);

    let expired = h.events.events().into_iter().find(|e| e.kind == SeatEventKind::Expired).unwrap();
    assert_eq!(expired.seat_numbers, vec!["12A", "12B"]);
    assert_eq!(h.reaper.stats().sweeps(), 2);
    assert_eq!(h.reaper.stats().reclaimed(), 2);
}

#[tokio::test]
async fn test_booking_between_snapshot_and_reclaim_survives() {
    let store = Arc::new(InterleavingStore::default());
    let h = Harness::with_store(store.clone()).await;
    let seat = seats(&["12A"]).remove(0);

    h.locks.lock(h.flight.id, &[seat.clone()], "alice", Some(5)).await.unwrap();
    h.advance(6);

    store.after_snapshot(
        h.flight.id,
        seat.clone(),
        vec![
            SeatMutation::Hold {
                holder_id: "bob".to_string(),
                token: HoldToken::generate(),
                expires_at: h.ctx.clock.now() + chrono::Duration::seconds(60),
            },
            SeatMutation::Book {
                booking_id: "BKG-1".to_string(),
            },
        ],
    );

    let report = h.reaper.sweep().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.lost_races, 1);
    assert_eq!(h.reaper.stats().lost_races(), 1);

    let record = h.ctx.seats.get_seat(h.flight.id, &seat).await.unwrap();
    assert_eq!(record.state, SeatState::Booked);
    assert_eq!(record.booking_id.as_deref(), Some("BKG-1"));
}

#[tokio::test]
async fn test_overlapping_sweep_is_skipped() {
    let store = Arc::new(InterleavingStore::default());
    let h = Harness::with_store(store.clone()).await;
    let reaper = Arc::new(ExpiryReaper::new(h.ctx.clone(), Duration::from_secs(30)));

    *store.pause.lock().unwrap() = true;
    let first = tokio::spawn({
        let reaper = Arc::clone(&reaper);
        async move { reaper.sweep().await }
    });
    store.entered.notified().await;

    let second = reaper.sweep().await.unwrap();
    assert!(second.skipped);

    store.resume.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(!first.skipped);
    assert_eq!(reaper.stats().sweeps(), 1);
}

#[tokio::test]
async fn test_sweep_purges_holds_past_retention() {
    let h = Harness::new().await;
    let grant = h.locks.lock(h.flight.id, &seats(&["12A"]), "alice", Some(5)).await.unwrap();
    let retention = h.ctx.policy.receipt_retention_seconds as i64;

    h.advance(10);
    let report = h.reaper.sweep().await.unwrap();
    assert_eq!(report.purged_holds, 0);
    assert!(matches!(h.reservations.book(&grant.token, "BKG-1").await, Err(CoreError::ExpiredToken(_))));

    h.advance(retention);
    let report = h.reaper.sweep().await.unwrap();
    assert_eq!(report.purged_holds, 1);
    assert!(matches!(h.reservations.book(&grant.token, "BKG-1").await, Err(CoreError::NotFound(_))));
    h.locks.release(&grant.token).await.unwrap();
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = Harness::new().await;
    let reaper = Arc::new(ExpiryReaper::new(h.ctx.clone(), Duration::from_millis(10)));
    let (tx, rx) = tokio::sync::watch::channel(false);

    let task = tokio::spawn(Arc::clone(&reaper).run(rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    task.await.unwrap();

    assert!(reaper.stats().sweeps() >= 1);
}
