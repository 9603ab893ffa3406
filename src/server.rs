use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::communication::messages::DispatchEvent;
use crate::config::DispatchConfig;
use crate::dispatch_engine::location::Coordinate;
use crate::dispatch_engine::rides::RideRequest;
use crate::dispatch_engine::scheduler::{CompletionTracker, RideScheduler};
use crate::dispatch_engine::vehicles::{Vehicle, VehicleId, VehicleRegistry};
use crate::error::DispatchError;
use crate::shared_data::{DispatchStats, StatsSnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point for every producer: vehicle registration, ride submission,
/// fleet queries and shutdown.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Dispatcher {
    registry: Arc<VehicleRegistry>,
    // `None` once shut down. Dropping the sender closes the admission queue.
    intake: Mutex<Option<mpsc::Sender<RideRequest>>>,
    events: broadcast::Sender<DispatchEvent>,
    stats: Arc<DispatchStats>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    completions: Arc<CompletionTracker>,
}

impl Dispatcher {
    /// Builds the registry and admission queue and spawns the scheduler loop.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(config: &DispatchConfig) -> Self {
        let registry = Arc::new(VehicleRegistry::new());
        let (intake, requests) = mpsc::channel(config.queue_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let stats = Arc::new(DispatchStats::default());
        let completions = Arc::new(CompletionTracker::new());

        let scheduler = RideScheduler::new(
            requests,
            Arc::clone(&registry),
            config,
            events.clone(),
            Arc::clone(&stats),
            Arc::clone(&completions),
        );
        let handle = tokio::spawn(scheduler.run());

        info!(
            "Dispatcher started (queue capacity {}, admission interval {:?})",
            config.queue_capacity,
            config.admission_interval()
        );
        Self {
            registry,
            intake: Mutex::new(Some(intake)),
            events,
            stats,
            scheduler: Mutex::new(Some(handle)),
            completions,
        }
    }

    pub fn register_vehicle(&self, location: Coordinate) -> VehicleId {
        let id = self.registry.register(location);
        info!("Registered vehicle #{} at {}", id, location);
        id
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<Vehicle> {
        self.registry.get(id)
    }

    /// Moves an idle vehicle. Returns `VehicleNotFound` for unknown IDs and
    /// `VehicleBusy` while the vehicle is on a ride.
    pub fn update_vehicle_location(
        &self,
        id: VehicleId,
        location: Coordinate,
    ) -> Result<(), DispatchError> {
        match self.registry.relocate_available(id, location) {
            None => return Err(DispatchError::VehicleNotFound(id)),
            Some(false) => return Err(DispatchError::VehicleBusy(id)),
            Some(true) => {}
        }
        info!("Vehicle #{} moved to {}", id, location);
        Ok(())
    }

    /// Queues a ride request. Returns false if the request was refused.
    pub fn submit_ride(&self, requester_id: u64, pickup: Coordinate, dropoff: Coordinate) -> bool {
        self.try_submit(RideRequest {
            requester_id,
            pickup,
            dropoff,
        })
        .is_ok()
    }

    /// Queues a ride request without waiting.
    ///
    /// Fails with `ShutDown` after [`Dispatcher::shutdown`] and with
    /// `QueueFull` when the admission queue has no room.
    pub fn try_submit(&self, request: RideRequest) -> Result<(), DispatchError> {
        let intake = lock(&self.intake);
        let Some(sender) = intake.as_ref() else {
            self.stats.record_rejected();
            warn!(
                "Rejecting ride request from requester #{}, dispatcher is shutting down",
                request.requester_id
            );
            return Err(DispatchError::ShutDown);
        };

        let requester_id = request.requester_id;
        let (pickup, dropoff) = (request.pickup, request.dropoff);
        match sender.try_send(request) {
            Ok(()) => {
                self.stats.record_submitted();
                info!(
                    "Received ride request from requester #{}: {} -> {}",
                    requester_id, pickup, dropoff
                );
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.record_rejected();
                warn!(
                    "Rejecting ride request from requester #{}, admission queue is full",
                    requester_id
                );
                Err(DispatchError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.record_rejected();
                warn!(
                    "Rejecting ride request from requester #{}, scheduler has stopped",
                    requester_id
                );
                Err(DispatchError::ShutDown)
            }
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.registry.count()
    }

    pub fn available_vehicle_count(&self) -> usize {
        self.registry.available_count()
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.intake).is_none()
    }

    /// Stops accepting ride requests. Already queued requests are still
    /// processed. Calling it again has no further effect.
    pub fn shutdown(&self) {
        if lock(&self.intake).take().is_some() {
            info!("Shutdown initiated, draining admission queue");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Waits for the scheduler to drain the queue and for every in-flight ride
    /// to complete.
    ///
    /// Only returns once [`Dispatcher::shutdown`] has been called. The first
    /// consistency fault reported by a completion task is returned as the error.
    /// Dropping the returned future does not cancel any ride.
    pub async fn join(&self) -> Result<StatsSnapshot, DispatchError> {
        if !self.is_shut_down() {
            warn!("join called before shutdown, it will not return until shutdown is called");
        }

        let scheduler = lock(&self.scheduler).take();
        let scheduler_result = match scheduler {
            Some(handle) => handle.await.map_err(DispatchError::from),
            None => Ok(()),
        };
        // Covers the scheduler loop too, even if an earlier join took its handle.
        self.completions.wait_idle().await;
        scheduler_result?;

        if let Some(fault) = self.completions.take_fault() {
            return Err(fault);
        }
        let stats = self.stats();
        info!(
            "Dispatcher stopped: {} admitted, {} finished, {} abandoned",
            stats.admitted, stats.finished, stats.abandoned
        );
        Ok(stats)
    }
}
