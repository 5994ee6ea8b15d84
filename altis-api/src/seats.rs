use altis_core::{CabinClass, Hold, HoldStatus, HoldToken, SeatNumber};
use altis_seating::{CabinSummary, SeatView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::Caller, state::AppState, stream};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{flight_id}/seats", get(get_seat_map))
        .route("/v1/flights/{flight_id}/seats/lock", post(lock_seats))
        .route("/v1/flights/{flight_id}/seats/extend", post(extend_hold))
        .route("/v1/flights/{flight_id}/seats/release", post(release_hold))
        .route("/v1/flights/{flight_id}/seats/book", post(book_seats))
        .route("/v1/flights/{flight_id}/seats/my-locks", get(my_locks))
        .route("/v1/flights/{flight_id}/seats/stream", get(stream::seat_stream))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockRequest {
    seat_numbers: Vec<String>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    token: HoldToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookRequest {
    token: HoldToken,
    booking_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LockResponse {
    token: HoldToken,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookResponse {
    booking_id: String,
    seats: Vec<SeatNumber>,
    booked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CabinCounter {
    cabin_class: CabinClass,
    remaining: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeatMapResponse {
    flight_id: Uuid,
    as_of: DateTime<Utc>,
    seats: Vec<SeatView>,
    cabins: Vec<CabinSummary>,
    availability: Vec<CabinCounter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HoldResponse {
    token: HoldToken,
    seat_numbers: Vec<SeatNumber>,
    expires_at: DateTime<Utc>,
    status: HoldStatus,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        Self {
            token: hold.token,
            seat_numbers: hold.seat_numbers,
            expires_at: hold.expires_at,
            status: hold.status,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_seat_map(
    Path(flight_id): Path<Uuid>,
    caller: Caller,
    State(state): State<AppState>,
) -> Result<Json<SeatMapResponse>, AppError> {
    let projection = state.view.project(flight_id, caller.owner_id()).await?;
    let availability = state
        .flights
        .availability(flight_id)
        .await
        .into_iter()
        .map(|(cabin_class, remaining)| CabinCounter { cabin_class, remaining })
        .collect();

    Ok(Json(SeatMapResponse {
        flight_id,
        as_of: projection.as_of(),
        seats: projection.iter().collect(),
        cabins: projection.summary(),
        availability,
    }))
}

async fn lock_seats(
    Path(flight_id): Path<Uuid>,
    caller: Caller,
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<(StatusCode, Json<LockResponse>), AppError> {
    let seat_numbers = req
        .seat_numbers
        .iter()
        .map(|s| s.parse::<SeatNumber>())
        .collect::<Result<Vec<_>, _>>()?;

    let result = state
        .locks
        .lock(flight_id, &seat_numbers, caller.owner_id(), req.ttl_seconds)
        .await;
    state.metrics.observe("lock", &result);
    let grant = result?;

    Ok((
        StatusCode::CREATED,
        Json(LockResponse {
            token: grant.token,
            expires_at: grant.expires_at,
        }),
    ))
}

async fn extend_hold(
    Path(flight_id): Path<Uuid>,
    caller: Caller,
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<LockResponse>, AppError> {
    let hold = state.locks.hold(&req.token).await?;
    check_owner(&hold, flight_id, &caller)?;

    let result = state.locks.extend(&req.token).await;
    state.metrics.observe("extend", &result);
    let grant = result?;

    Ok(Json(LockResponse {
        token: grant.token,
        expires_at: grant.expires_at,
    }))
}

async fn release_hold(
    Path(flight_id): Path<Uuid>,
    caller: Caller,
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<StatusCode, AppError> {
    // unknown tokens release as a no-op
    if let Ok(hold) = state.locks.hold(&req.token).await {
        check_owner(&hold, flight_id, &caller)?;
    }

    let result = state.locks.release(&req.token).await;
    state.metrics.observe("release", &result);
    result?;

    Ok(StatusCode::NO_CONTENT)
}

async fn book_seats(
    Path(flight_id): Path<Uuid>,
    caller: Caller,
    State(state): State<AppState>,
    Json(req): Json<BookRequest>,
) -> Result<Json<BookResponse>, AppError> {
    if !caller.0.is_authenticated() {
        return Err(AppError::AuthorizationError("Sign in to book seats".to_string()));
    }
    let hold = state.locks.hold(&req.token).await?;
    check_owner(&hold, flight_id, &caller)?;

    let result = state.reservations.book(&req.token, &req.booking_id).await;
    state.metrics.observe("book", &result);
    let receipt = result?;

    Ok(Json(BookResponse {
        booking_id: receipt.booking_id,
        seats: receipt.seats,
        booked_at: receipt.booked_at,
    }))
}

async fn my_locks(
    Path(flight_id): Path<Uuid>,
    caller: Caller,
    State(state): State<AppState>,
) -> Result<Json<Vec<HoldResponse>>, AppError> {
    let holds = state.locks.active_holds(flight_id, caller.owner_id()).await?;
    Ok(Json(holds.into_iter().map(HoldResponse::from).collect()))
}

fn check_owner(hold: &Hold, flight_id: Uuid, caller: &Caller) -> Result<(), AppError> {
    if hold.flight_id != flight_id {
        return Err(AppError::NotFoundError("hold not found".to_string()));
    }
    if hold.owner_id != caller.owner_id() {
        return Err(AppError::AuthorizationError("Hold belongs to another requester".to_string()));
    }
    Ok(())
}
