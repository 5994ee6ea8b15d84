use uuid::Uuid;

/// What happened to a group of seats on one flight.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatEventKind {
    Held,
    Released,
    Booked,
    Expired,
    Cancelled,
}

impl SeatEventKind {
    /// Kafka topic the event is published to.
    pub fn topic(&self) -> &'static str {
        match self {
            SeatEventKind::Held => "seats.held",
            SeatEventKind::Released => "seats.released",
            SeatEventKind::Booked => "seats.booked",
            SeatEventKind::Expired => "seats.expired",
            SeatEventKind::Cancelled => "seats.cancelled",
        }
    }

    /// SSE event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatEventKind::Held => "held",
            SeatEventKind::Released => "released",
            SeatEventKind::Booked => "booked",
            SeatEventKind::Expired => "expired",
            SeatEventKind::Cancelled => "cancelled",
        }
    }
}

/// Public seat-map change notification. Never carries a hold token or owner.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatInventoryEvent {
    pub flight_id: Uuid,
    pub kind: SeatEventKind,
    pub seat_numbers: Vec<String>,
    pub occurred_at: i64,
}

impl SeatInventoryEvent {
    pub fn new(flight_id: Uuid, kind: SeatEventKind, seat_numbers: Vec<String>, occurred_at: i64) -> Self {
        Self { flight_id, kind, seat_numbers, occurred_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let flight_id = Uuid::new_v4();
        let event = SeatInventoryEvent::new(flight_id, SeatEventKind::Held, vec!["12A".to_string()], 1_700_000_000);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "held");
        assert_eq!(json["seat_numbers"][0], "12A");
        assert!(json.get("token").is_none());
        assert_eq!(SeatEventKind::Cancelled.topic(), "seats.cancelled");
    }
}
