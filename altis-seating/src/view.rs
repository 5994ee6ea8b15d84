use altis_core::{CabinClass, Clock, CoreResult, SeatMapStore, SeatNumber, SeatRecord, SeatState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::slice;
use std::sync::Arc;
use uuid::Uuid;

use crate::SeatingContext;

/// How a seat looks to one requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayState {
    Available,
    SelectedByYou,
    Unavailable,
    Booked,
}

impl DisplayState {
    /// A lapsed hold shows as AVAILABLE even before the reaper reclaims it.
    pub fn for_seat(record: &SeatRecord, requester_id: &str, now: DateTime<Utc>) -> Self {
        match record.effective_state(now) {
            SeatState::Available => DisplayState::Available,
            SeatState::Booked => DisplayState::Booked,
            SeatState::Held if record.holder_id.as_deref() == Some(requester_id) => DisplayState::SelectedByYou,
            SeatState::Held => DisplayState::Unavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat_number: SeatNumber,
    pub cabin_class: CabinClass,
    pub display_state: DisplayState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CabinSummary {
    pub cabin_class: CabinClass,
    pub available: u32,
    pub selected_by_you: u32,
    pub unavailable: u32,
    pub booked: u32,
}

impl CabinSummary {
    fn empty(cabin_class: CabinClass) -> Self {
        Self {
            cabin_class,
            available: 0,
            selected_by_you: 0,
            unavailable: 0,
            booked: 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.available + self.selected_by_you + self.unavailable + self.booked
    }
}

/// One consistent read of a flight's seat map for one requester.
#[derive(Debug, Clone)]
pub struct SeatMapProjection {
    flight_id: Uuid,
    requester_id: String,
    as_of: DateTime<Utc>,
    records: Vec<SeatRecord>,
}

impl SeatMapProjection {
    pub fn flight_id(&self) -> Uuid {
        self.flight_id
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seats in row order. Each call restarts from the first seat.
    pub fn iter(&self) -> SeatViews<'_> {
        SeatViews {
            records: self.records.iter(),
            requester_id: &self.requester_id,
            as_of: self.as_of,
        }
    }

    pub fn summary(&self) -> Vec<CabinSummary> {
        let mut cabins: BTreeMap<CabinClass, CabinSummary> = BTreeMap::new();
        for seat in self.iter() {
            let entry = cabins
                .entry(seat.cabin_class)
                .or_insert_with(|| CabinSummary::empty(seat.cabin_class));
            match seat.display_state {
                DisplayState::Available => entry.available += 1,
                DisplayState::SelectedByYou => entry.selected_by_you += 1,
                DisplayState::Unavailable => entry.unavailable += 1,
                DisplayState::Booked => entry.booked += 1,
            }
        }
        cabins.into_values().collect()
    }
}

impl<'a> IntoIterator for &'a SeatMapProjection {
    type Item = SeatView;
    type IntoIter = SeatViews<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a projection.
#[derive(Debug, Clone)]
pub struct SeatViews<'a> {
    records: slice::Iter<'a, SeatRecord>,
    requester_id: &'a str,
    as_of: DateTime<Utc>,
}

impl Iterator for SeatViews<'_> {
    type Item = SeatView;

    fn next(&mut self) -> Option<SeatView> {
        self.records.next().map(|record| SeatView {
            seat_number: record.seat_number.clone(),
            cabin_class: record.cabin_class,
            display_state: DisplayState::for_seat(record, self.requester_id, self.as_of),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// Builds per-requester projections of the seat map.
pub struct SeatMapView {
    seats: Arc<dyn SeatMapStore>,
    clock: Arc<dyn Clock>,
}

impl SeatMapView {
    pub fn new(ctx: &SeatingContext) -> Self {
        Self {
            seats: Arc::clone(&ctx.seats),
            clock: Arc::clone(&ctx.clock),
        }
    }

    pub async fn project(&self, flight_id: Uuid, requester_id: &str) -> CoreResult<SeatMapProjection> {
        let records = self.seats.list_seats(flight_id).await?;
        Ok(SeatMapProjection {
            flight_id,
            requester_id: requester_id.to_string(),
            as_of: self.clock.now(),
            records,
        })
    }
}
