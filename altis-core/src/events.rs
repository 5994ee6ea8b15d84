use altis_shared::SeatInventoryEvent;
use async_trait::async_trait;

/// Outbound notifications of seat-map changes. Delivery is best-effort:
/// implementations log failures instead of returning them.
#[async_trait]
pub trait SeatEventSink: Send + Sync {
    async fn publish(&self, event: SeatInventoryEvent);
}
