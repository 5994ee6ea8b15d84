use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::{CabinClass, SeatNumber, SeatRecord};
use crate::{CoreError, CoreResult};

const FIRST_COLUMNS: [&str; 4] = ["A", "C", "D", "F"];
const BUSINESS_COLUMNS: [&str; 4] = ["A", "C", "D", "F"];
const ECONOMY_COLUMNS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

/// Upper bound on seats in a single cabin.
pub const MAX_CABIN_SEATS: u32 = 1_000;

/// Seats per cabin class. Fixed once the flight is published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinCapacities {
    pub first: u32,
    pub business: u32,
    pub economy: u32,
}

impl CabinCapacities {
    pub fn get(&self, cabin: CabinClass) -> u32 {
        match cabin {
            CabinClass::First => self.first,
            CabinClass::Business => self.business,
            CabinClass::Economy => self.economy,
        }
    }

    /// Seats across all cabins. Fails when any cabin exceeds [`MAX_CABIN_SEATS`].
    pub fn total(&self) -> CoreResult<u32> {
        CabinClass::ALL.iter().try_fold(0u32, |total, &cabin| {
            let seats = self.get(cabin);
            if seats > MAX_CABIN_SEATS {
                return Err(CoreError::ValidationError(format!(
                    "{} cabin of {} seats exceeds the limit of {}",
                    cabin, seats, MAX_CABIN_SEATS
                )));
            }
            total
                .checked_add(seats)
                .ok_or_else(|| CoreError::ValidationError("cabin capacities overflow".to_string()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub capacities: CabinCapacities,
    pub published_at: DateTime<Utc>,
}

impl Flight {
    pub fn new(flight_number: &str, capacities: CabinCapacities, published_at: DateTime<Utc>) -> CoreResult<Self> {
        let flight_number = flight_number.trim();
        if flight_number.is_empty() {
            return Err(CoreError::ValidationError("flight number is required".to_string()));
        }
        if capacities.total()? == 0 {
            return Err(CoreError::ValidationError("a flight needs at least one seat".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            flight_number: flight_number.to_string(),
            capacities,
            published_at,
        })
    }

    /// AVAILABLE records for the whole cabin layout, in row/column order.
    ///
    /// First class is laid out first, then business, then economy; each
    /// cabin starts on a fresh row.
    pub fn seat_layout(&self) -> CoreResult<Vec<SeatRecord>> {
        let mut seats = Vec::with_capacity(self.capacities.total()? as usize);
        let mut row: u16 = 1;

        for cabin in CabinClass::ALL {
            let columns: &[&str] = match cabin {
                CabinClass::First => &FIRST_COLUMNS,
                CabinClass::Business => &BUSINESS_COLUMNS,
                CabinClass::Economy => &ECONOMY_COLUMNS,
            };

            let mut remaining = self.capacities.get(cabin) as usize;
            while remaining > 0 {
                for column in columns.iter().take(remaining) {
                    seats.push(SeatRecord::available(self.id, SeatNumber::new(row, column)?, cabin));
                }
                remaining = remaining.saturating_sub(columns.len());
                row = row
                    .checked_add(1)
                    .ok_or_else(|| CoreError::ValidationError("cabin layout exceeds row limit".to_string()))?;
            }
        }

        Ok(seats)
    }
}
