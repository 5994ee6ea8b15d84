use altis_core::{
    CoreError, CoreResult, Hold, HoldGrant, HoldStatus, HoldToken, SeatMutation, SeatNumber, SeatRecord, SeatState,
};
use altis_shared::SeatEventKind;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{seat_list, SeatingContext};

/// A seat moved by the current call, with the record it replaced.
struct Acquired {
    prior: SeatRecord,
    current: SeatRecord,
}

/// Creates, extends and releases time-bounded holds.
pub struct LockManager {
    ctx: SeatingContext,
}

impl LockManager {
    pub fn new(ctx: SeatingContext) -> Self {
        Self { ctx }
    }

    /// Holds every requested seat for `owner_id`, or none of them.
    ///
    /// A seat is acquirable when it is AVAILABLE, when its hold has lapsed,
    /// or when it is already held by the same owner (the hold moves to the
    /// new token). On the first seat that cannot be taken, seats already
    /// moved by this call are put back the way they were.
    pub async fn lock(
        &self,
        flight_id: Uuid,
        seat_numbers: &[SeatNumber],
        owner_id: &str,
        ttl_seconds: Option<u64>,
    ) -> CoreResult<HoldGrant> {
        if owner_id.trim().is_empty() {
            return Err(CoreError::ValidationError("lock owner is required".to_string()));
        }
        let ttl = self.ctx.policy.resolve_ttl(ttl_seconds)?;
        let seats = normalize_seats(seat_numbers)?;
        let now = self.ctx.clock.now();
        let token = HoldToken::generate();
        let expires_at = now + Duration::seconds(ttl as i64);
        let mutation = SeatMutation::Hold {
            holder_id: owner_id.to_string(),
            token,
            expires_at,
        };

        let mut acquired = Vec::with_capacity(seats.len());
        for seat in &seats {
            match self.acquire(flight_id, seat, owner_id, &mutation, now).await {
                Ok(moved) => acquired.push(moved),
                Err(err) => {
                    debug!("Lock on flight {} failed at seat {}: {}", flight_id, seat, err);
                    self.compensate(flight_id, &acquired, now).await;
                    return Err(err);
                }
            }
        }

        let hold = Hold::new(token, owner_id, flight_id, seats.clone(), ttl, now, expires_at);
        if let Err(err) = self.ctx.holds.save_hold(&hold).await {
            self.compensate(flight_id, &acquired, now).await;
            return Err(err);
        }

        info!(
            "Held seats {} on flight {} for {} until {}",
            seat_list(&seats),
            flight_id,
            owner_id,
            expires_at
        );
        self.ctx.emit(flight_id, SeatEventKind::Held, &seats).await;

        Ok(HoldGrant { token, expires_at })
    }

    async fn acquire(
        &self,
        flight_id: Uuid,
        seat: &SeatNumber,
        owner_id: &str,
        mutation: &SeatMutation,
        now: DateTime<Utc>,
    ) -> CoreResult<Acquired> {
        for _ in 0..self.ctx.policy.attempts() {
            let prior = self.ctx.seats.get_seat(flight_id, seat).await?;
            match prior.effective_state(now) {
                SeatState::Booked => {
                    return Err(CoreError::Conflict(format!("seat {} is already booked", seat)));
                }
                SeatState::Held if !prior.is_held_by_owner(owner_id, now) => {
                    return Err(CoreError::Conflict(format!("seat {} is held by another customer", seat)));
                }
                _ => {}
            }

            match self.ctx.seats.compare_and_set(flight_id, seat, prior.version, mutation).await {
                Ok(current) => return Ok(Acquired { prior, current }),
                Err(CoreError::VersionConflict { .. }) => {
                    debug!("Lost race for seat {} on flight {}, retrying", seat, flight_id);
                }
                Err(err) => return Err(err),
            }
        }

        Err(CoreError::Conflict(format!("seat {} is being changed by another request", seat)))
    }

    async fn compensate(&self, flight_id: Uuid, acquired: &[Acquired], now: DateTime<Utc>) {
        for moved in acquired.iter().rev() {
            let restore = restore_mutation(&moved.prior, now);
            let seat = &moved.current.seat_number;
            match self.ctx.seats.compare_and_set(flight_id, seat, moved.current.version, &restore).await {
                Ok(_) => debug!("Compensated seat {} on flight {}", seat, flight_id),
                Err(err) => warn!("Could not compensate seat {} on flight {}: {}", seat, flight_id, err),
            }
        }
    }

    /// Pushes the expiry of every seat still under `token` out by the hold's TTL.
    pub async fn extend(&self, token: &HoldToken) -> CoreResult<HoldGrant> {
        let now = self.ctx.clock.now();
        let hold = usable_hold(self.ctx.holds.get_hold(token).await?, now)?;
        let expires_at = now + Duration::seconds(hold.ttl_seconds as i64);
        let mutation = SeatMutation::Hold {
            holder_id: hold.owner_id.clone(),
            token: hold.token,
            expires_at,
        };

        let mut kept = Vec::with_capacity(hold.seat_numbers.len());
        for seat in &hold.seat_numbers {
            if self.refresh(&hold, seat, &mutation, now).await? {
                kept.push(seat.clone());
            }
        }
        if kept.is_empty() {
            return Err(CoreError::ExpiredToken("hold no longer covers any seat".to_string()));
        }

        let flight_id = hold.flight_id;
        let updated = Hold { seat_numbers: kept, expires_at, ..hold };
        self.ctx.holds.save_hold(&updated).await?;
        info!("Extended hold on seats {} of flight {} until {}", seat_list(&updated.seat_numbers), flight_id, expires_at);

        Ok(HoldGrant { token: *token, expires_at })
    }

    async fn refresh(&self, hold: &Hold, seat: &SeatNumber, mutation: &SeatMutation, now: DateTime<Utc>) -> CoreResult<bool> {
        for _ in 0..self.ctx.policy.attempts() {
            let record = self.ctx.seats.get_seat(hold.flight_id, seat).await?;
            if !record.is_held_by_token(&hold.token, now) {
                debug!("Seat {} left hold {:?}, dropping it", seat, hold.token);
                return Ok(false);
            }
            match self.ctx.seats.compare_and_set(hold.flight_id, seat, record.version, mutation).await {
                Ok(_) => return Ok(true),
                Err(CoreError::VersionConflict { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(CoreError::Conflict(format!("seat {} is being changed by another request", seat)))
    }

    /// Frees every seat still under `token`. Unknown, expired and already
    /// released tokens are a successful no-op.
    pub async fn release(&self, token: &HoldToken) -> CoreResult<()> {
        let Some(hold) = self.ctx.holds.get_hold(token).await? else {
            debug!("Release of unknown hold {:?} ignored", token);
            return Ok(());
        };
        if hold.status != HoldStatus::Active {
            debug!("Hold {:?} is {}, nothing to release", token, hold.status.as_str());
            return Ok(());
        }

        let released = release_seats(&self.ctx, &hold).await?;
        let flight_id = hold.flight_id;
        self.ctx.holds.save_hold(&hold.released()).await?;

        if !released.is_empty() {
            info!("Released seats {} on flight {}", seat_list(&released), flight_id);
        }
        self.ctx.emit(flight_id, SeatEventKind::Released, &released).await;
        Ok(())
    }

    pub async fn hold(&self, token: &HoldToken) -> CoreResult<Hold> {
        self.ctx
            .holds
            .get_hold(token)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("hold {:?}", token)))
    }

    /// Unexpired holds of `owner_id` on the flight, trimmed to the seats each
    /// token still holds.
    pub async fn active_holds(&self, flight_id: Uuid, owner_id: &str) -> CoreResult<Vec<Hold>> {
        let now = self.ctx.clock.now();
        let holds: Vec<Hold> = self
            .ctx
            .holds
            .list_holds_by_owner(flight_id, owner_id)
            .await?
            .into_iter()
            .filter(|h| h.is_active(now))
            .collect();
        if holds.is_empty() {
            return Ok(holds);
        }

        let seat_map: BTreeMap<SeatNumber, SeatRecord> = self
            .ctx
            .seats
            .list_seats(flight_id)
            .await?
            .into_iter()
            .map(|r| (r.seat_number.clone(), r))
            .collect();

        Ok(holds
            .into_iter()
            .filter_map(|mut hold| {
                let token = hold.token;
                hold.seat_numbers
                    .retain(|s| seat_map.get(s).is_some_and(|r| r.is_held_by_token(&token, now)));
                (!hold.seat_numbers.is_empty()).then_some(hold)
            })
            .collect())
    }
}

/// CAS every seat still physically under the hold's token back to AVAILABLE.
pub(crate) async fn release_seats(ctx: &SeatingContext, hold: &Hold) -> CoreResult<Vec<SeatNumber>> {
    let mut released = Vec::new();
    for seat in &hold.seat_numbers {
        if release_seat(ctx, hold.flight_id, seat, &hold.token).await? {
            released.push(seat.clone());
        }
    }
    Ok(released)
}

async fn release_seat(ctx: &SeatingContext, flight_id: Uuid, seat: &SeatNumber, token: &HoldToken) -> CoreResult<bool> {
    for _ in 0..ctx.policy.attempts() {
        let record = match ctx.seats.get_seat(flight_id, seat).await {
            Ok(record) => record,
            Err(CoreError::NotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        if record.state != SeatState::Held || record.hold_token.as_ref() != Some(token) {
            return Ok(false);
        }
        match ctx.seats.compare_and_set(flight_id, seat, record.version, &SeatMutation::Release).await {
            Ok(_) => return Ok(true),
            Err(CoreError::VersionConflict { .. }) => continue,
            Err(err) => return Err(err),
        }
    }
    warn!("Gave up releasing seat {} on flight {} after repeated races", seat, flight_id);
    Ok(false)
}

/// The hold a token refers to, if it can still transition seats.
pub(crate) fn usable_hold(hold: Option<Hold>, now: DateTime<Utc>) -> CoreResult<Hold> {
    let hold = hold.ok_or_else(|| CoreError::NotFound("hold".to_string()))?;
    match hold.status {
        HoldStatus::Consumed => Err(CoreError::ExpiredToken("hold was already used for a booking".to_string())),
        HoldStatus::Released => Err(CoreError::ExpiredToken("hold was released".to_string())),
        HoldStatus::Active if hold.is_expired(now) => {
            Err(CoreError::ExpiredToken(format!("hold expired at {}", hold.expires_at)))
        }
        HoldStatus::Active => Ok(hold),
    }
}

fn normalize_seats(seat_numbers: &[SeatNumber]) -> CoreResult<Vec<SeatNumber>> {
    let unique: BTreeSet<SeatNumber> = seat_numbers.iter().cloned().collect();
    if unique.is_empty() {
        return Err(CoreError::ValidationError("at least one seat is required".to_string()));
    }
    Ok(unique.into_iter().collect())
}

/// What puts a seat back the way `prior` had it.
fn restore_mutation(prior: &SeatRecord, now: DateTime<Utc>) -> SeatMutation {
    if prior.effective_state(now) != SeatState::Held {
        return SeatMutation::Release;
    }
    match (&prior.holder_id, prior.hold_token, prior.hold_expires_at) {
        (Some(holder_id), Some(token), Some(expires_at)) => SeatMutation::Hold {
            holder_id: holder_id.clone(),
            token,
            expires_at,
        },
        _ => SeatMutation::Release,
    }
}
