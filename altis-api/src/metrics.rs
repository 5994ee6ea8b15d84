use altis_core::{CoreError, CoreResult};
use altis_seating::ReaperStats;
use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, IntCounterVec, IntGauge, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

pub struct ApiMetrics {
    registry: Registry,
    /// Labels: `operation` (lock, extend, release, book, cancel), `outcome`
    seat_operations: IntCounterVec,
    reaper_sweeps: IntGauge,
    reaper_reclaimed: IntGauge,
    reaper_lost_races: IntGauge,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let seat_operations = IntCounterVec::new(
            opts!("seat_operations_total", "Seat operations by outcome"),
            &["operation", "outcome"],
        )?;
        let reaper_sweeps = IntGauge::new("reaper_sweeps", "Expiry sweeps completed")?;
        let reaper_reclaimed = IntGauge::new("reaper_reclaimed_seats", "Seats reclaimed from lapsed holds")?;
        let reaper_lost_races = IntGauge::new("reaper_lost_races", "Reclaims skipped because the seat changed")?;

        registry.register(Box::new(seat_operations.clone()))?;
        registry.register(Box::new(reaper_sweeps.clone()))?;
        registry.register(Box::new(reaper_reclaimed.clone()))?;
        registry.register(Box::new(reaper_lost_races.clone()))?;

        Ok(Self {
            registry,
            seat_operations,
            reaper_sweeps,
            reaper_reclaimed,
            reaper_lost_races,
        })
    }

    pub fn observe<T>(&self, operation: &str, result: &CoreResult<T>) {
        self.seat_operations
            .with_label_values(&[operation, outcome(result)])
            .inc();
    }

    pub fn export(&self, stats: &ReaperStats) -> Result<String, prometheus::Error> {
        self.reaper_sweeps.set(stats.sweeps() as i64);
        self.reaper_reclaimed.set(stats.reclaimed() as i64);
        self.reaper_lost_races.set(stats.lost_races() as i64);

        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn outcome<T>(result: &CoreResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CoreError::Conflict(_)) | Err(CoreError::VersionConflict { .. }) => "conflict",
        Err(CoreError::NotFound(_)) => "not_found",
        Err(CoreError::ExpiredToken(_)) => "expired",
        Err(CoreError::ValidationError(_)) => "invalid",
        Err(CoreError::StorageError(_)) => "error",
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export(state.reaper.stats())
        .map_err(|e| AppError::InternalServerError(format!("Metrics encoding failed: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
