use altis_core::{
    BookingReceipt, CabinClass, CoreError, CoreResult, Hold, HoldStatus, HoldToken, SeatMutation, SeatNumber,
    SeatRecord, SeatState,
};
use altis_shared::SeatEventKind;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::locks::release_seats;
use crate::{seat_list, SeatingContext};

/// Turns holds into bookings and undoes bookings on cancellation.
pub struct ReservationService {
    ctx: SeatingContext,
}

impl ReservationService {
    pub fn new(ctx: SeatingContext) -> Self {
        Self { ctx }
    }

    /// Books every seat of the hold under `booking_id`, or none of them.
    ///
    /// Repeating the call with the same token and booking id returns the
    /// original receipt. On failure the seats this call booked go back to
    /// AVAILABLE and the hold is abandoned.
    pub async fn book(&self, token: &HoldToken, booking_id: &str) -> CoreResult<BookingReceipt> {
        let booking_id = booking_id.trim();
        if booking_id.is_empty() {
            return Err(CoreError::ValidationError("booking id is required".to_string()));
        }

        let now = self.ctx.clock.now();
        let hold = self
            .ctx
            .holds
            .get_hold(token)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("hold {:?}", token)))?;

        match hold.status {
            HoldStatus::Consumed => return replay(&hold, booking_id),
            HoldStatus::Released => return Err(CoreError::ExpiredToken("hold was released".to_string())),
            HoldStatus::Active if hold.is_expired(now) => {
                return Err(CoreError::ExpiredToken(format!("hold expired at {}", hold.expires_at)));
            }
            HoldStatus::Active => {}
        }

        let seats = hold.seat_numbers.clone();
        let mut committed: Vec<SeatRecord> = Vec::with_capacity(seats.len());
        for seat in &seats {
            match self.commit_seat(&hold, seat, booking_id).await {
                Ok(Some(record)) => committed.push(record),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        "Booking {} on flight {} failed at seat {}: {}; rolling back {} seat(s)",
                        booking_id,
                        hold.flight_id,
                        seat,
                        err,
                        committed.len()
                    );
                    self.roll_back(hold.flight_id, &committed).await;
                    self.abandon(hold).await;
                    return Err(err);
                }
            }
        }

        let flight_id = hold.flight_id;
        let receipt = BookingReceipt {
            booking_id: booking_id.to_string(),
            flight_id,
            seats,
            booked_at: now,
        };
        if let Err(err) = self.ctx.holds.save_hold(&hold.consumed(receipt.clone())).await {
            // Seats are already BOOKED under this id, so a retry still lands on them.
            error!("Booking {} committed but its receipt was not stored: {}", booking_id, err);
        }

        self.adjust_counters(flight_id, &committed, -1).await;
        let booked: Vec<SeatNumber> = committed.into_iter().map(|r| r.seat_number).collect();
        info!("Booked seats {} on flight {} as {}", seat_list(&receipt.seats), flight_id, booking_id);
        self.ctx.emit(flight_id, SeatEventKind::Booked, &booked).await;

        Ok(receipt)
    }

    /// Returns the record as it was before booking, or `None` when the seat
    /// is already booked under the same id.
    ///
    /// Seat TTLs are checked against the clock at each attempt, so a hold
    /// that lapses part way through a booking fails the remaining seats.
    async fn commit_seat(&self, hold: &Hold, seat: &SeatNumber, booking_id: &str) -> CoreResult<Option<SeatRecord>> {
        let mutation = SeatMutation::Book {
            booking_id: booking_id.to_string(),
        };
        for _ in 0..self.ctx.policy.attempts() {
            let now = self.ctx.clock.now();
            let record = self.ctx.seats.get_seat(hold.flight_id, seat).await?;
            if record.state == SeatState::Booked && record.booking_id.as_deref() == Some(booking_id) {
                return Ok(None);
            }
            if !record.is_held_by_token(&hold.token, now) {
                let lapsed = record.hold_token == Some(hold.token) && record.is_expired_hold(now);
                return Err(if lapsed {
                    CoreError::ExpiredToken(format!("hold on seat {} has expired", seat))
                } else {
                    CoreError::Conflict(format!("seat {} is no longer held by this token", seat))
                });
            }
            match self.ctx.seats.compare_and_set(hold.flight_id, seat, record.version, &mutation).await {
                Ok(_) => return Ok(Some(record)),
                Err(CoreError::VersionConflict { .. }) => {
                    debug!("Lost race booking seat {} on flight {}, retrying", seat, hold.flight_id);
                }
                Err(err) => return Err(err),
            }
        }
        Err(CoreError::Conflict(format!("seat {} is being changed by another request", seat)))
    }

    async fn roll_back(&self, flight_id: Uuid, committed: &[SeatRecord]) {
        for prior in committed.iter().rev() {
            let seat = &prior.seat_number;
            let booked_version = prior.version + 1;
            match self
                .ctx
                .seats
                .compare_and_set(flight_id, seat, booked_version, &SeatMutation::Release)
                .await
            {
                Ok(_) => debug!("Rolled back seat {} on flight {}", seat, flight_id),
                Err(err) => warn!("Could not roll back seat {} on flight {}: {}", seat, flight_id, err),
            }
        }
    }

    async fn abandon(&self, hold: Hold) {
        let flight_id = hold.flight_id;
        match release_seats(&self.ctx, &hold).await {
            Ok(released) => self.ctx.emit(flight_id, SeatEventKind::Released, &released).await,
            Err(err) => warn!("Could not release abandoned hold on flight {}: {}", flight_id, err),
        }
        if let Err(err) = self.ctx.holds.save_hold(&hold.released()).await {
            warn!("Could not mark abandoned hold on flight {} as released: {}", flight_id, err);
        }
    }

    /// Returns every seat booked under `booking_id` to AVAILABLE. Cancelling
    /// twice frees nothing the second time.
    pub async fn cancel(&self, flight_id: Uuid, booking_id: &str) -> CoreResult<Vec<SeatNumber>> {
        let booking_id = booking_id.trim();
        if booking_id.is_empty() {
            return Err(CoreError::ValidationError("booking id is required".to_string()));
        }

        let booked = self
            .ctx
            .seats
            .list_seats(flight_id)
            .await?
            .into_iter()
            .filter(|r| is_booked_as(r, booking_id));

        let mut freed = Vec::new();
        for record in booked {
            if let Some(prior) = self.free_seat(flight_id, record, booking_id).await? {
                freed.push(prior);
            }
        }

        self.adjust_counters(flight_id, &freed, 1).await;
        let seats: Vec<SeatNumber> = freed.into_iter().map(|r| r.seat_number).collect();
        if seats.is_empty() {
            debug!("Booking {} holds no seats on flight {}", booking_id, flight_id);
        } else {
            info!("Cancelled booking {} on flight {}, freed {}", booking_id, flight_id, seat_list(&seats));
        }
        self.ctx.emit(flight_id, SeatEventKind::Cancelled, &seats).await;

        Ok(seats)
    }

    async fn free_seat(&self, flight_id: Uuid, mut record: SeatRecord, booking_id: &str) -> CoreResult<Option<SeatRecord>> {
        for _ in 0..self.ctx.policy.attempts() {
            if !is_booked_as(&record, booking_id) {
                return Ok(None);
            }
            match self
                .ctx
                .seats
                .compare_and_set(flight_id, &record.seat_number, record.version, &SeatMutation::Release)
                .await
            {
                Ok(_) => return Ok(Some(record)),
                Err(CoreError::VersionConflict { .. }) => {
                    record = self.ctx.seats.get_seat(flight_id, &record.seat_number).await?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(CoreError::Conflict(format!("seat {} is being changed by another request", record.seat_number)))
    }

    /// Counter failures never fail the seat operation; the seat map stays authoritative.
    async fn adjust_counters(&self, flight_id: Uuid, records: &[SeatRecord], sign: i64) {
        let mut per_cabin: BTreeMap<CabinClass, i64> = BTreeMap::new();
        for record in records {
            *per_cabin.entry(record.cabin_class).or_default() += sign;
        }
        for (cabin, delta) in per_cabin {
            match self.ctx.inventory.adjust_availability(flight_id, cabin, delta).await {
                Ok(Some(left)) => debug!("{} availability on flight {} now {}", cabin, flight_id, left),
                Ok(None) => debug!("No {} counter for flight {}", cabin, flight_id),
                Err(err) => warn!("Could not adjust {} counter for flight {}: {}", cabin, flight_id, err),
            }
        }
    }
}

fn is_booked_as(record: &SeatRecord, booking_id: &str) -> bool {
    record.state == SeatState::Booked && record.booking_id.as_deref() == Some(booking_id)
}

fn replay(hold: &Hold, booking_id: &str) -> CoreResult<BookingReceipt> {
    match &hold.receipt {
        Some(receipt) if receipt.booking_id == booking_id => Ok(receipt.clone()),
        _ => Err(CoreError::Conflict("hold was already used for a different booking".to_string())),
    }
}
