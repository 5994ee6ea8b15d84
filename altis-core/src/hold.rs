use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::seat::SeatNumber;
use crate::CoreError;

/// Secret handed to the lock owner. Possession authorises extend, release and book.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldToken(Uuid);

impl HoldToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

// Tokens end up in log lines; only show a prefix.
impl fmt::Debug for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        write!(f, "HoldToken({}…)", &simple[..8])
    }
}

impl fmt::Display for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HoldToken {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(HoldToken)
            .map_err(|_| CoreError::ValidationError("malformed hold token".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Active,
    Consumed,
    Released,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Active => "ACTIVE",
            HoldStatus::Consumed => "CONSUMED",
            HoldStatus::Released => "RELEASED",
        }
    }
}

impl FromStr for HoldStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(HoldStatus::Active),
            "CONSUMED" => Ok(HoldStatus::Consumed),
            "RELEASED" => Ok(HoldStatus::Released),
            other => Err(CoreError::StorageError(format!("unknown hold status: {}", other))),
        }
    }
}

/// Outcome of a successful booking, replayed verbatim on retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking_id: String,
    pub flight_id: Uuid,
    pub seats: Vec<SeatNumber>,
    pub booked_at: DateTime<Utc>,
}

/// Returned by `lock` and `extend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldGrant {
    pub token: HoldToken,
    pub expires_at: DateTime<Utc>,
}

/// Metadata of a time-bounded claim on seats of one flight.
///
/// The seat records stay authoritative: a seat belongs to this hold only
/// while the record itself carries the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub token: HoldToken,
    pub owner_id: String,
    pub flight_id: Uuid,
    pub seat_numbers: Vec<SeatNumber>,
    pub ttl_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: HoldStatus,
    pub receipt: Option<BookingReceipt>,
}

impl Hold {
    pub fn new(
        token: HoldToken,
        owner_id: &str,
        flight_id: Uuid,
        seat_numbers: Vec<SeatNumber>,
        ttl_seconds: u64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            owner_id: owner_id.to_string(),
            flight_id,
            seat_numbers,
            ttl_seconds,
            created_at,
            expires_at,
            status: HoldStatus::Active,
            receipt: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && !self.is_expired(now)
    }

    pub fn consumed(mut self, receipt: BookingReceipt) -> Self {
        self.status = HoldStatus::Consumed;
        self.receipt = Some(receipt);
        self
    }

    pub fn released(mut self) -> Self {
        self.status = HoldStatus::Released;
        self
    }
}
