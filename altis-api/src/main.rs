use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use altis_api::{app, metrics::ApiMetrics, stream::FanoutSink, AppState, AuthConfig};
use altis_core::{HoldStore, InventoryProvider, SeatMapStore, SystemClock};
use altis_seating::{SeatingContext, SeatingPolicy};
use altis_store::app_config::{Config, StoreBackend};
use altis_store::{
    DbClient, EventProducer, InMemoryHoldStore, InMemoryInventory, InMemorySeatStore, PostgresHoldStore,
    PostgresSeatStore, RedisClient,
};
use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "altis_api=debug,altis_seating=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Altis seat inventory on port {}", config.server.port);

    // Seat map and hold metadata
    let mut seating = config.seating.clone();
    let (seats, holds): (Arc<dyn SeatMapStore>, Arc<dyn HoldStore>) = match config.store.backend {
        StoreBackend::Postgres => {
            let url = config
                .database
                .as_ref()
                .map(|db| db.url.as_str())
                .context("database.url is required for the postgres backend")?;
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            seating = db
                .fetch_seating_rules(seating)
                .await
                .context("Failed to read business rules")?;
            (
                Arc::new(PostgresSeatStore::new(db.pool.clone())),
                Arc::new(PostgresHoldStore::new(db.pool)),
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory seat store; state is lost on restart");
            (Arc::new(InMemorySeatStore::new()), Arc::new(InMemoryHoldStore::new()))
        }
    };

    // Availability counters
    let inventory: Arc<dyn InventoryProvider> = match &config.redis {
        Some(redis) => Arc::new(
            RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => Arc::new(InMemoryInventory::new()),
    };

    // Kafka Connection
    let kafka = match &config.kafka {
        Some(kafka) => Some(Arc::new(
            EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?,
        )),
        None => None,
    };

    // SSE Broadcast Channel
    let (sse_tx, _) = tokio::sync::broadcast::channel(100);

    let ctx = SeatingContext {
        seats,
        holds,
        inventory,
        events: Arc::new(FanoutSink::new(kafka, sse_tx.clone())),
        clock: Arc::new(SystemClock),
        policy: SeatingPolicy {
            default_hold_seconds: seating.default_hold_seconds,
            max_hold_seconds: seating.max_hold_seconds,
            cas_max_retries: seating.cas_max_retries,
            receipt_retention_seconds: seating.receipt_retention_seconds,
        },
    };

    let metrics = Arc::new(ApiMetrics::new().context("Failed to register metrics")?);
    let app_state = AppState::new(
        ctx,
        Duration::from_secs(seating.reaper_interval_seconds.max(1)),
        sse_tx,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        metrics,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = tokio::spawn(app_state.reaper.clone().run(shutdown_rx));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    reaper.await.context("Expiry reaper panicked")?;
    Ok(())
}
