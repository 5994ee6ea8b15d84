use altis_core::{CabinCapacities, SeatNumber};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{AdminCaller, ServiceCaller},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/flights", post(publish_flight))
        .route("/v1/admin/flights/{flight_id}", delete(retire_flight))
        .route("/v1/flights/{flight_id}/bookings/{booking_id}/cancel", post(cancel_booking))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishFlightRequest {
    flight_number: String,
    capacities: CabinCapacities,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlightResponse {
    id: Uuid,
    flight_number: String,
    capacities: CabinCapacities,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    booking_id: String,
    released: Vec<SeatNumber>,
}

async fn publish_flight(
    AdminCaller(claims): AdminCaller,
    State(state): State<AppState>,
    Json(req): Json<PublishFlightRequest>,
) -> Result<(StatusCode, Json<FlightResponse>), AppError> {
    let flight = state.flights.publish(&req.flight_number, req.capacities).await?;
    tracing::info!("Flight {} published by {}", flight.flight_number, claims.sub);

    Ok((
        StatusCode::CREATED,
        Json(FlightResponse {
            id: flight.id,
            flight_number: flight.flight_number,
            capacities: flight.capacities,
            published_at: flight.published_at,
        }),
    ))
}

async fn retire_flight(
    AdminCaller(claims): AdminCaller,
    Path(flight_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.flights.retire(flight_id).await?;
    tracing::info!("Flight {} retired by {}", flight_id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_booking(
    _caller: ServiceCaller,
    Path((flight_id, booking_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Json<CancelResponse>, AppError> {
    let result = state.reservations.cancel(flight_id, &booking_id).await;
    state.metrics.observe("cancel", &result);
    let released = result?;

    Ok(Json(CancelResponse { booking_id, released }))
}
