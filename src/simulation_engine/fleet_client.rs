use std::sync::Arc;

use log::info;
use rand::Rng;
use tokio::time::{sleep, Duration};

use crate::dispatch_engine::location::Coordinate;
use crate::dispatch_engine::vehicles::VehicleId;
use crate::server::Dispatcher;

/// Uniform random point on a `grid_size` x `grid_size` grid.
pub fn random_location<R: Rng>(rng: &mut R, grid_size: i64) -> Coordinate {
    let grid_size = grid_size.max(1);
    Coordinate::new(rng.random_range(0..grid_size), rng.random_range(0..grid_size))
}

/// Registers a fleet of vehicles at random locations, one at a time.
pub struct FleetClient {
    dispatcher: Arc<Dispatcher>,
    fleet_size: usize,
    interval: Duration,
    grid_size: i64,
}

impl FleetClient {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        fleet_size: usize,
        interval: Duration,
        grid_size: i64,
    ) -> Self {
        Self {
            dispatcher,
            fleet_size,
            interval,
            grid_size,
        }
    }

    /// Registers every vehicle, pausing `interval` between registrations.
    pub async fn run<R: Rng>(self, mut rng: R) -> Vec<VehicleId> {
        info!("Fleet client registering {} vehicles", self.fleet_size);
        let mut ids = Vec::with_capacity(self.fleet_size);
        for i in 0..self.fleet_size {
            let location = random_location(&mut rng, self.grid_size);
            ids.push(self.dispatcher.register_vehicle(location));

            if i + 1 < self.fleet_size {
                sleep(self.interval).await;
            }
        }
        info!("Fleet client done, {} vehicles registered", ids.len());
        ids
    }
}
