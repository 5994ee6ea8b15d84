use std::convert::Infallible;
use std::sync::Arc;

use altis_core::SeatEventSink;
use altis_shared::SeatInventoryEvent;
use altis_store::EventProducer;
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::{middleware::auth::Caller, state::AppState};

/// Sends seat events to Kafka when configured and to the in-process SSE channel.
pub struct FanoutSink {
    kafka: Option<Arc<EventProducer>>,
    sse_tx: broadcast::Sender<SeatInventoryEvent>,
}

impl FanoutSink {
    pub fn new(kafka: Option<Arc<EventProducer>>, sse_tx: broadcast::Sender<SeatInventoryEvent>) -> Self {
        Self { kafka, sse_tx }
    }
}

#[async_trait]
impl SeatEventSink for FanoutSink {
    async fn publish(&self, event: SeatInventoryEvent) {
        if let Some(kafka) = &self.kafka {
            SeatEventSink::publish(kafka.as_ref(), event.clone()).await;
        }
        // Err only means nobody is subscribed.
        let _ = self.sse_tx.send(event);
    }
}

pub async fn seat_stream(
    Path(flight_id): Path<Uuid>,
    _caller: Caller,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.flight_id == flight_id => Event::default()
            .event(event.kind.as_str())
            .json_data(&event)
            .ok()
            .map(Ok),
        Ok(_) => None,
        Err(err) => {
            warn!("Seat stream for flight {} fell behind: {}", flight_id, err);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
