use altis_core::{
    CabinCapacities, CabinClass, CoreError, CoreResult, Flight, HoldToken, SeatMapStore, SeatMutation, SeatNumber,
    SeatRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::storage_error;

const SEAT_COLUMNS: &str =
    "flight_id, seat_number, cabin_class, state, holder_id, hold_token, hold_expires_at, booking_id, version";

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    flight_number: String,
    first_capacity: i32,
    business_capacity: i32,
    economy_capacity: i32,
    published_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = CoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        let capacity = |value: i32| {
            u32::try_from(value).map_err(|_| CoreError::StorageError(format!("negative capacity on flight {}", row.id)))
        };
        Ok(Flight {
            id: row.id,
            flight_number: row.flight_number.clone(),
            capacities: CabinCapacities {
                first: capacity(row.first_capacity)?,
                business: capacity(row.business_capacity)?,
                economy: capacity(row.economy_capacity)?,
            },
            published_at: row.published_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    flight_id: Uuid,
    seat_number: String,
    cabin_class: String,
    state: String,
    holder_id: Option<String>,
    hold_token: Option<Uuid>,
    hold_expires_at: Option<DateTime<Utc>>,
    booking_id: Option<String>,
    version: i64,
}

impl TryFrom<SeatRow> for SeatRecord {
    type Error = CoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(SeatRecord {
            flight_id: row.flight_id,
            seat_number: row
                .seat_number
                .parse()
                .map_err(|_| CoreError::StorageError(format!("corrupt seat number {}", row.seat_number)))?,
            cabin_class: row
                .cabin_class
                .parse::<CabinClass>()
                .map_err(|e| CoreError::StorageError(e.to_string()))?,
            state: row.state.parse()?,
            holder_id: row.holder_id,
            hold_token: row.hold_token.map(HoldToken::from_uuid),
            hold_expires_at: row.hold_expires_at,
            booking_id: row.booking_id,
            version: u64::try_from(row.version)
                .map_err(|_| CoreError::StorageError(format!("negative version {}", row.version)))?,
        })
    }
}

fn capacity_column(seats: u32) -> CoreResult<i32> {
    i32::try_from(seats).map_err(|_| CoreError::ValidationError(format!("capacity {} out of range", seats)))
}

fn to_db_version(version: u64) -> CoreResult<i64> {
    i64::try_from(version).map_err(|_| CoreError::StorageError(format!("version {} out of range", version)))
}

/// Seat map backed by the `flights` and `seats` tables.
///
/// Compare-and-set is a single conditional `UPDATE`; Postgres row locks
/// serialise concurrent writers of the same seat across every API instance.
pub struct PostgresSeatStore {
    pool: PgPool,
}

impl PostgresSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_seat(&self, flight_id: Uuid, seat_number: &SeatNumber) -> CoreResult<Option<SeatRecord>> {
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE flight_id = $1 AND seat_number = $2",
            SEAT_COLUMNS
        ))
        .bind(flight_id)
        .bind(seat_number.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(SeatRecord::try_from).transpose()
    }
}

#[async_trait]
impl SeatMapStore for PostgresSeatStore {
    async fn create_flight(&self, flight: &Flight, seats: &[SeatRecord]) -> CoreResult<()> {
        let first = capacity_column(flight.capacities.first)?;
        let business = capacity_column(flight.capacities.business)?;
        let economy = capacity_column(flight.capacities.economy)?;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO flights (id, flight_number, first_capacity, business_capacity, economy_capacity, published_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(flight.id)
        .bind(&flight.flight_number)
        .bind(first)
        .bind(business)
        .bind(economy)
        .bind(flight.published_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if inserted.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!("flight {} already exists", flight.id)));
        }

        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO seats (flight_id, seat_number, seat_row, seat_column, cabin_class, state, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(flight.id)
            .bind(seat.seat_number.to_string())
            .bind(i32::from(seat.seat_number.row()))
            .bind(seat.seat_number.column())
            .bind(seat.cabin_class.as_str())
            .bind(seat.state.as_str())
            .bind(to_db_version(seat.version)?)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn get_flight(&self, flight_id: Uuid) -> CoreResult<Flight> {
        let row = sqlx::query_as::<_, FlightRow>(
            r#"
            SELECT id, flight_number, first_capacity, business_capacity, economy_capacity, published_at
            FROM flights
            WHERE id = $1
            "#,
        )
        .bind(flight_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| CoreError::NotFound(format!("flight {}", flight_id)))?;

        Flight::try_from(row)
    }

    async fn remove_flight(&self, flight_id: Uuid) -> CoreResult<()> {
        // seats and seat_holds cascade
        let deleted = sqlx::query("DELETE FROM flights WHERE id = $1")
            .bind(flight_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if deleted.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("flight {}", flight_id)));
        }
        Ok(())
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &SeatNumber) -> CoreResult<SeatRecord> {
        self.fetch_seat(flight_id, seat_number)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("seat {} on flight {}", seat_number, flight_id)))
    }

    async fn list_seats(&self, flight_id: Uuid) -> CoreResult<Vec<SeatRecord>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE flight_id = $1 ORDER BY seat_row, seat_column COLLATE \"C\"",
            SEAT_COLUMNS
        ))
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        if rows.is_empty() {
            // distinguishes an unknown flight from one with no seats
            self.get_flight(flight_id).await?;
        }

        rows.into_iter().map(SeatRecord::try_from).collect()
    }

    async fn compare_and_set(
        &self,
        flight_id: Uuid,
        seat_number: &SeatNumber,
        expected_version: u64,
        mutation: &SeatMutation,
    ) -> CoreResult<SeatRecord> {
        let current = self.get_seat(flight_id, seat_number).await?;
        let conflict = |actual: u64| CoreError::VersionConflict {
            flight_id,
            seat_number: seat_number.clone(),
            expected: expected_version,
            actual,
        };
        if current.version != expected_version {
            return Err(conflict(current.version));
        }

        let next = current.apply(mutation);
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            r#"
            UPDATE seats
            SET state = $4, holder_id = $5, hold_token = $6, hold_expires_at = $7, booking_id = $8, version = $9
            WHERE flight_id = $1 AND seat_number = $2 AND version = $3
            RETURNING {}
            "#,
            SEAT_COLUMNS
        ))
        .bind(flight_id)
        .bind(seat_number.to_string())
        .bind(to_db_version(expected_version)?)
        .bind(next.state.as_str())
        .bind(next.holder_id.as_deref())
        .bind(next.hold_token.map(|t| t.as_uuid()))
        .bind(next.hold_expires_at)
        .bind(next.booking_id.as_deref())
        .bind(to_db_version(next.version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(row) => SeatRecord::try_from(row),
            None => {
                // lost the race between our read and the conditional update
                let actual = self.fetch_seat(flight_id, seat_number).await?.map_or(0, |s| s.version);
                Err(conflict(actual))
            }
        }
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            r#"
            SELECT {} FROM seats
            WHERE state = 'HELD' AND (hold_expires_at IS NULL OR hold_expires_at <= $1)
            ORDER BY flight_id, seat_row, seat_column COLLATE "C"
            "#,
            SEAT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(SeatRecord::try_from).collect()
    }
}
