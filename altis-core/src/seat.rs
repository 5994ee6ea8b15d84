use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::hold::HoldToken;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    First,
    Business,
    Economy,
}

impl CabinClass {
    pub const ALL: [CabinClass; 3] = [CabinClass::First, CabinClass::Business, CabinClass::Economy];

    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::First => "FIRST",
            CabinClass::Business => "BUSINESS",
            CabinClass::Economy => "ECONOMY",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CabinClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIRST" => Ok(CabinClass::First),
            "BUSINESS" => Ok(CabinClass::Business),
            "ECONOMY" => Ok(CabinClass::Economy),
            other => Err(CoreError::ValidationError(format!("unknown cabin class: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Held,
    Booked,
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatState::Available => "AVAILABLE",
            SeatState::Held => "HELD",
            SeatState::Booked => "BOOKED",
        }
    }
}

impl FromStr for SeatState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatState::Available),
            "HELD" => Ok(SeatState::Held),
            "BOOKED" => Ok(SeatState::Booked),
            other => Err(CoreError::StorageError(format!("unknown seat state: {}", other))),
        }
    }
}

/// Seat designator such as `12A`. Orders by row, then column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatNumber {
    row: u16,
    column: String,
}

impl SeatNumber {
    pub fn new(row: u16, column: &str) -> Result<Self, CoreError> {
        let column = column.to_ascii_uppercase();
        let valid_column = !column.is_empty()
            && column.len() <= 2
            && column.chars().all(|c| c.is_ascii_uppercase());
        if row == 0 || !valid_column {
            return Err(CoreError::ValidationError(format!("invalid seat number: {}{}", row, column)));
        }
        Ok(Self { row, column })
    }

    pub fn row(&self) -> u16 {
        self.row
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

impl FromStr for SeatNumber {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (row, column) = s.split_at(split);
        let row: u16 = row
            .parse()
            .map_err(|_| CoreError::ValidationError(format!("invalid seat number: {}", s)))?;
        SeatNumber::new(row, column)
    }
}

impl TryFrom<String> for SeatNumber {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatNumber> for String {
    fn from(value: SeatNumber) -> Self {
        value.to_string()
    }
}

/// Write intent handed to `SeatMapStore::compare_and_set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatMutation {
    Hold {
        holder_id: String,
        token: HoldToken,
        expires_at: DateTime<Utc>,
    },
    Book {
        booking_id: String,
    },
    Release,
}

/// Authoritative state of one seat on one flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRecord {
    pub flight_id: Uuid,
    pub seat_number: SeatNumber,
    pub cabin_class: CabinClass,
    pub state: SeatState,
    pub holder_id: Option<String>,
    pub hold_token: Option<HoldToken>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub booking_id: Option<String>,
    pub version: u64,
}

impl SeatRecord {
    pub fn available(flight_id: Uuid, seat_number: SeatNumber, cabin_class: CabinClass) -> Self {
        Self {
            flight_id,
            seat_number,
            cabin_class,
            state: SeatState::Available,
            holder_id: None,
            hold_token: None,
            hold_expires_at: None,
            booking_id: None,
            version: 0,
        }
    }

    /// A HELD seat whose TTL has passed. Readers treat it as available.
    pub fn is_expired_hold(&self, now: DateTime<Utc>) -> bool {
        self.state == SeatState::Held && self.hold_expires_at.map_or(true, |at| at <= now)
    }

    pub fn effective_state(&self, now: DateTime<Utc>) -> SeatState {
        if self.is_expired_hold(now) {
            SeatState::Available
        } else {
            self.state
        }
    }

    pub fn is_held_by_token(&self, token: &HoldToken, now: DateTime<Utc>) -> bool {
        self.effective_state(now) == SeatState::Held && self.hold_token.as_ref() == Some(token)
    }

    pub fn is_held_by_owner(&self, owner_id: &str, now: DateTime<Utc>) -> bool {
        self.effective_state(now) == SeatState::Held && self.holder_id.as_deref() == Some(owner_id)
    }

    /// Result of applying `mutation`. Always exactly one version ahead.
    pub fn apply(&self, mutation: &SeatMutation) -> SeatRecord {
        let mut next = SeatRecord::available(self.flight_id, self.seat_number.clone(), self.cabin_class);
        next.version = self.version + 1;

        match mutation {
            SeatMutation::Hold { holder_id, token, expires_at } => {
                next.state = SeatState::Held;
                next.holder_id = Some(holder_id.clone());
                next.hold_token = Some(*token);
                next.hold_expires_at = Some(*expires_at);
            }
            SeatMutation::Book { booking_id } => {
                next.state = SeatState::Booked;
                next.booking_id = Some(booking_id.clone());
            }
            SeatMutation::Release => {}
        }

        next
    }
}
