use altis_core::{BookingReceipt, CoreError, CoreResult, Hold, HoldStore, HoldToken, SeatNumber};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage_error;

const HOLD_COLUMNS: &str = "token, owner_id, flight_id, seat_numbers, ttl_seconds, created_at, expires_at, status, \
                            booking_id, booked_at, booked_seats";

#[derive(sqlx::FromRow)]
struct HoldRow {
    token: Uuid,
    owner_id: String,
    flight_id: Uuid,
    seat_numbers: Vec<String>,
    ttl_seconds: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    booking_id: Option<String>,
    booked_at: Option<DateTime<Utc>>,
    booked_seats: Option<Vec<String>>,
}

fn parse_seats(raw: Vec<String>) -> CoreResult<Vec<SeatNumber>> {
    raw.iter()
        .map(|s| s.parse().map_err(|_| CoreError::StorageError(format!("corrupt seat number {}", s))))
        .collect()
}

impl TryFrom<HoldRow> for Hold {
    type Error = CoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        let receipt = match (row.booking_id, row.booked_at) {
            (Some(booking_id), Some(booked_at)) => Some(BookingReceipt {
                booking_id,
                flight_id: row.flight_id,
                seats: parse_seats(row.booked_seats.unwrap_or_default())?,
                booked_at,
            }),
            _ => None,
        };

        Ok(Hold {
            token: HoldToken::from_uuid(row.token),
            owner_id: row.owner_id,
            flight_id: row.flight_id,
            seat_numbers: parse_seats(row.seat_numbers)?,
            ttl_seconds: u64::try_from(row.ttl_seconds)
                .map_err(|_| CoreError::StorageError(format!("negative ttl on hold {}", row.token)))?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            status: row.status.parse()?,
            receipt,
        })
    }
}

fn seat_strings(seats: &[SeatNumber]) -> Vec<String> {
    seats.iter().map(|s| s.to_string()).collect()
}

/// Hold metadata in the `seat_holds` table.
pub struct PostgresHoldStore {
    pool: PgPool,
}

impl PostgresHoldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HoldStore for PostgresHoldStore {
    async fn save_hold(&self, hold: &Hold) -> CoreResult<()> {
        let ttl = i64::try_from(hold.ttl_seconds)
            .map_err(|_| CoreError::ValidationError(format!("ttl {} out of range", hold.ttl_seconds)))?;

        sqlx::query(
            r#"
            INSERT INTO seat_holds (token, owner_id, flight_id, seat_numbers, ttl_seconds, created_at, expires_at,
                                    status, booking_id, booked_at, booked_seats)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (token) DO UPDATE SET
                seat_numbers = EXCLUDED.seat_numbers,
                expires_at = EXCLUDED.expires_at,
                status = EXCLUDED.status,
                booking_id = EXCLUDED.booking_id,
                booked_at = EXCLUDED.booked_at,
                booked_seats = EXCLUDED.booked_seats
            "#,
        )
        .bind(hold.token.as_uuid())
        .bind(&hold.owner_id)
        .bind(hold.flight_id)
        .bind(seat_strings(&hold.seat_numbers))
        .bind(ttl)
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .bind(hold.status.as_str())
        .bind(hold.receipt.as_ref().map(|r| r.booking_id.clone()))
        .bind(hold.receipt.as_ref().map(|r| r.booked_at))
        .bind(hold.receipt.as_ref().map(|r| seat_strings(&r.seats)))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_hold(&self, token: &HoldToken) -> CoreResult<Option<Hold>> {
        let row = sqlx::query_as::<_, HoldRow>(&format!("SELECT {} FROM seat_holds WHERE token = $1", HOLD_COLUMNS))
            .bind(token.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(Hold::try_from).transpose()
    }

    async fn list_holds_by_owner(&self, flight_id: Uuid, owner_id: &str) -> CoreResult<Vec<Hold>> {
        let rows = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {} FROM seat_holds WHERE flight_id = $1 AND owner_id = $2 ORDER BY created_at",
            HOLD_COLUMNS
        ))
        .bind(flight_id)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Hold::try_from).collect()
    }

    async fn purge_holds(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_holds WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_flight_holds(&self, flight_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_holds WHERE flight_id = $1")
            .bind(flight_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}
