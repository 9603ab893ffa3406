use std::sync::Arc;

use log::{info, warn};
use rand::Rng;
use tokio::time::{sleep, Duration};

use crate::server::Dispatcher;
use crate::simulation_engine::fleet_client::random_location;

/// Outcome of a rider client run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiderReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Submits ride requests with random pickups and dropoffs.
///
/// Requester IDs run from 1 to `ride_count`.
pub struct RiderClient {
    dispatcher: Arc<Dispatcher>,
    ride_count: usize,
    interval: Duration,
    grid_size: i64,
}

impl RiderClient {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        ride_count: usize,
        interval: Duration,
        grid_size: i64,
    ) -> Self {
        Self {
            dispatcher,
            ride_count,
            interval,
            grid_size,
        }
    }

    pub async fn run<R: Rng>(self, mut rng: R) -> RiderReport {
        info!("Rider client submitting {} ride requests", self.ride_count);
        let mut report = RiderReport::default();
        for i in 0..self.ride_count {
            let requester_id = i as u64 + 1;
            let pickup = random_location(&mut rng, self.grid_size);
            let dropoff = random_location(&mut rng, self.grid_size);

            if self.dispatcher.submit_ride(requester_id, pickup, dropoff) {
                report.accepted += 1;
            } else {
                warn!("Ride request from requester #{} was rejected", requester_id);
                report.rejected += 1;
            }

            if i + 1 < self.ride_count {
                sleep(self.interval).await;
            }
        }
        info!(
            "Rider client done: {} accepted, {} rejected",
            report.accepted, report.rejected
        );
        report
    }
}
