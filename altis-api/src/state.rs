use std::sync::Arc;
use std::time::Duration;

use altis_seating::{ExpiryReaper, FlightPublisher, LockManager, ReservationService, SeatMapView, SeatingContext};
use altis_shared::SeatInventoryEvent;
use tokio::sync::broadcast;

use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub locks: Arc<LockManager>,
    pub reservations: Arc<ReservationService>,
    pub view: Arc<SeatMapView>,
    pub flights: Arc<FlightPublisher>,
    pub reaper: Arc<ExpiryReaper>,
    pub sse_tx: broadcast::Sender<SeatInventoryEvent>,
    pub auth: AuthConfig,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    /// `sse_tx` must be the channel the context's event sink feeds.
    pub fn new(
        ctx: SeatingContext,
        reaper_interval: Duration,
        sse_tx: broadcast::Sender<SeatInventoryEvent>,
        auth: AuthConfig,
        metrics: Arc<ApiMetrics>,
    ) -> Self {
        Self {
            locks: Arc::new(LockManager::new(ctx.clone())),
            reservations: Arc::new(ReservationService::new(ctx.clone())),
            view: Arc::new(SeatMapView::new(&ctx)),
            flights: Arc::new(FlightPublisher::new(ctx.clone())),
            reaper: Arc::new(ExpiryReaper::new(ctx, reaper_interval)),
            sse_tx,
            auth,
            metrics,
        }
    }
}
