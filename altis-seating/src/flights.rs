use altis_core::{CabinCapacities, CabinClass, CoreResult, Flight};
use tracing::{info, warn};
use uuid::Uuid;

use crate::SeatingContext;

/// Publishes flights into the seat map and retires them.
pub struct FlightPublisher {
    ctx: SeatingContext,
}

impl FlightPublisher {
    pub fn new(ctx: SeatingContext) -> Self {
        Self { ctx }
    }

    /// Lays out every seat as AVAILABLE and seeds the per-cabin counters.
    pub async fn publish(&self, flight_number: &str, capacities: CabinCapacities) -> CoreResult<Flight> {
        let flight = Flight::new(flight_number, capacities, self.ctx.clock.now())?;
        let seats = flight.seat_layout()?;
        self.ctx.seats.create_flight(&flight, &seats).await?;

        for cabin in CabinClass::ALL {
            let count = i64::from(capacities.get(cabin));
            if let Err(err) = self.ctx.inventory.seed_availability(flight.id, cabin, count).await {
                warn!("Could not seed {} counter for flight {}: {}", cabin, flight.id, err);
            }
        }

        info!("Published flight {} ({}) with {} seats", flight.flight_number, flight.id, seats.len());
        Ok(flight)
    }

    /// Counter value per cabin; `None` where no counter is seeded or it could not be read.
    pub async fn availability(&self, flight_id: Uuid) -> Vec<(CabinClass, Option<i64>)> {
        let mut counters = Vec::with_capacity(CabinClass::ALL.len());
        for cabin in CabinClass::ALL {
            let value = match self.ctx.inventory.availability(flight_id, cabin).await {
                Ok(value) => value,
                Err(err) => {
                    warn!("Could not read {} counter for flight {}: {}", cabin, flight_id, err);
                    None
                }
            };
            counters.push((cabin, value));
        }
        counters
    }

    pub async fn retire(&self, flight_id: Uuid) -> CoreResult<()> {
        self.ctx.seats.remove_flight(flight_id).await?;
        let holds = self.ctx.holds.delete_flight_holds(flight_id).await?;
        if let Err(err) = self.ctx.inventory.clear_availability(flight_id).await {
            warn!("Could not clear counters for flight {}: {}", flight_id, err);
        }
        info!("Retired flight {} and {} hold(s)", flight_id, holds);
        Ok(())
    }
}
