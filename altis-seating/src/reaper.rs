use altis_core::{CoreError, CoreResult, SeatMutation, SeatNumber};
use altis_shared::SeatEventKind;
use chrono::Duration as ChronoDuration;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{seat_list, SeatingContext};

/// Running totals across sweeps.
#[derive(Debug, Default)]
pub struct ReaperStats {
    sweeps: AtomicU64,
    reclaimed: AtomicU64,
    lost_races: AtomicU64,
    purged_holds: AtomicU64,
}

impl ReaperStats {
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    pub fn lost_races(&self) -> u64 {
        self.lost_races.load(Ordering::Relaxed)
    }

    pub fn purged_holds(&self) -> u64 {
        self.purged_holds.load(Ordering::Relaxed)
    }

    fn record(&self, report: &SweepReport) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.reclaimed.fetch_add(report.reclaimed as u64, Ordering::Relaxed);
        self.lost_races.fetch_add(report.lost_races as u64, Ordering::Relaxed);
        self.purged_holds.fetch_add(report.purged_holds, Ordering::Relaxed);
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Another sweep was still running.
    pub skipped: bool,
    pub scanned: usize,
    pub reclaimed: usize,
    pub lost_races: usize,
    pub failures: usize,
    pub purged_holds: u64,
}

/// Returns lapsed holds to AVAILABLE in the background.
///
/// Reads stay correct without it because expiry is evaluated lazily; the
/// reaper only makes the stored state catch up.
pub struct ExpiryReaper {
    ctx: SeatingContext,
    interval: Duration,
    running: Mutex<()>,
    stats: ReaperStats,
}

impl ExpiryReaper {
    pub fn new(ctx: SeatingContext, interval: Duration) -> Self {
        Self {
            ctx,
            interval,
            running: Mutex::new(()),
            stats: ReaperStats::default(),
        }
    }

    pub fn stats(&self) -> &ReaperStats {
        &self.stats
    }

    /// A seat that changed after the snapshot was taken loses its CAS and is
    /// left alone.
    pub async fn sweep(&self) -> CoreResult<SweepReport> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Expiry sweep already in progress, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..Default::default()
            });
        };

        let now = self.ctx.clock.now();
        let snapshot = self.ctx.seats.expired_holds(now).await?;
        let mut report = SweepReport {
            scanned: snapshot.len(),
            ..Default::default()
        };

        let mut reclaimed: BTreeMap<Uuid, Vec<SeatNumber>> = BTreeMap::new();
        for record in snapshot {
            match self
                .ctx
                .seats
                .compare_and_set(record.flight_id, &record.seat_number, record.version, &SeatMutation::Release)
                .await
            {
                Ok(_) => {
                    report.reclaimed += 1;
                    reclaimed.entry(record.flight_id).or_default().push(record.seat_number);
                }
                Err(CoreError::VersionConflict { .. }) => {
                    report.lost_races += 1;
                    debug!("Seat {} on flight {} changed since snapshot", record.seat_number, record.flight_id);
                }
                Err(err) => {
                    report.failures += 1;
                    warn!("Could not reclaim seat {} on flight {}: {}", record.seat_number, record.flight_id, err);
                }
            }
        }

        let cutoff = now - ChronoDuration::seconds(self.ctx.policy.receipt_retention_seconds as i64);
        match self.ctx.holds.purge_holds(cutoff).await {
            Ok(purged) => report.purged_holds = purged,
            Err(err) => {
                report.failures += 1;
                warn!("Could not purge stale holds: {}", err);
            }
        }

        for (flight_id, seats) in &reclaimed {
            info!("Reclaimed expired seats {} on flight {}", seat_list(seats), flight_id);
            self.ctx.emit(*flight_id, SeatEventKind::Expired, seats).await;
        }

        self.stats.record(&report);
        if report.reclaimed > 0 || report.purged_holds > 0 {
            info!(
                "Expiry sweep reclaimed {} seat(s), lost {} race(s), purged {} hold(s)",
                report.reclaimed, report.lost_races, report.purged_holds
            );
        } else {
            debug!("Expiry sweep found nothing to reclaim");
        }

        Ok(report)
    }

    /// Sweeps on a fixed interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Expiry reaper started, sweeping every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        error!("Expiry sweep failed: {}", err);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Expiry reaper stopped");
    }
}
