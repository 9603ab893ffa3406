use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{error, info};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::{sleep, Duration};

use crate::communication::messages::DispatchEvent;
use crate::config::DispatchConfig;
use crate::dispatch_engine::admission::AdmissionGate;
use crate::dispatch_engine::assigner::{ride_duration, VehicleAssigner};
use crate::dispatch_engine::location::distance;
use crate::dispatch_engine::rides::{Ride, RideId, RideRequest};
use crate::dispatch_engine::vehicles::{VehicleId, VehicleRegistry};
use crate::error::DispatchError;
use crate::shared_data::DispatchStats;

/// Counts the scheduler loop and its outstanding completion tasks, and keeps
/// the first fault a completion reported.
///
/// Completions are spawned detached: dropping the tracker, the dispatcher or a
/// pending [`CompletionTracker::wait_idle`] never cancels a ride in flight.
/// Finished tasks leave nothing behind.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    outstanding: AtomicUsize,
    idle: Notify,
    first_fault: Mutex<Option<DispatchError>>,
}

/// Held for as long as a tracked task runs. Released on drop, so a panicking
/// task is still accounted for.
struct TaskGuard(Arc<CompletionTracker>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(self: &Arc<Self>) -> TaskGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        TaskGuard(Arc::clone(self))
    }

    /// Spawns `task` onto the runtime without keeping its handle.
    pub fn spawn<F>(self: &Arc<Self>, task: F)
    where
        F: Future<Output = Result<(), DispatchError>> + Send + 'static,
    {
        let guard = self.track();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                guard.0.record_fault(e);
            }
            drop(guard);
        });
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Resolves once nothing tracked is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Takes the first fault reported since the last call.
    pub fn take_fault(&self) -> Option<DispatchError> {
        self.faults().take()
    }

    fn record_fault(&self, fault: DispatchError) {
        let mut first = self.faults();
        if first.is_none() {
            *first = Some(fault);
        }
    }

    fn faults(&self) -> MutexGuard<'_, Option<DispatchError>> {
        self.first_fault.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single consumer of the admission queue.
///
/// Being the only caller of [`VehicleAssigner::assign`] is what makes the
/// registry's snapshot-then-reserve sequence safe.
pub struct RideScheduler {
    requests: mpsc::Receiver<RideRequest>,
    assigner: VehicleAssigner,
    registry: Arc<VehicleRegistry>,
    gate: AdmissionGate,
    unit_duration: Duration,
    next_ride_id: RideId,
    events: broadcast::Sender<DispatchEvent>,
    stats: Arc<DispatchStats>,
    completions: Arc<CompletionTracker>,
}

impl RideScheduler {
    /// Must be called from inside a tokio runtime; the pacing clock starts here.
    pub fn new(
        requests: mpsc::Receiver<RideRequest>,
        registry: Arc<VehicleRegistry>,
        config: &DispatchConfig,
        events: broadcast::Sender<DispatchEvent>,
        stats: Arc<DispatchStats>,
        completions: Arc<CompletionTracker>,
    ) -> Self {
        Self {
            requests,
            assigner: VehicleAssigner::new(Arc::clone(&registry)),
            registry,
            gate: AdmissionGate::new(config.admission_interval()),
            unit_duration: config.unit_duration(),
            next_ride_id: 1,
            events,
            stats,
            completions,
        }
    }

    /// Admits queued requests one per interval until the queue is closed and empty.
    ///
    /// Completion tasks spawned here are not awaited. The loop counts as
    /// outstanding work on the tracker until it returns.
    pub async fn run(mut self) {
        let _running = self.completions.track();
        info!(
            "Ride scheduler started, admitting one request every {:?}",
            self.gate.period()
        );
        while let Some(request) = self.requests.recv().await {
            self.gate.ready().await;
            self.process_request(request);
        }
        info!("Admission queue closed and drained, ride scheduler stopping");
    }

    fn process_request(&mut self, request: RideRequest) -> Arc<Ride> {
        let ride = Arc::new(Ride::new(self.next_ride_id, request));
        self.next_ride_id += 1;
        self.stats.record_admitted();

        info!(
            "Created ride #{} for requester #{}: {} -> {}",
            ride.id, ride.requester_id, ride.pickup, ride.dropoff
        );
        self.publish(DispatchEvent::RideCreated {
            ride_id: ride.id,
            requester_id: ride.requester_id,
            pickup: ride.pickup,
            dropoff: ride.dropoff,
        });

        let Some(vehicle) = self.assigner.assign(&ride) else {
            info!("Ride #{} abandoned, no vehicle available", ride.id);
            self.stats.record_abandoned();
            self.publish(DispatchEvent::RideAbandoned { ride_id: ride.id });
            return ride;
        };
        self.stats.record_assigned();
        self.publish(DispatchEvent::RideAssigned {
            ride_id: ride.id,
            vehicle_id: vehicle.id,
            pickup_distance: distance(vehicle.location, ride.pickup),
        });

        let duration = ride_duration(&vehicle, &ride);
        if let Err(e) = ride.start() {
            error!("Could not start ride #{}: {}", ride.id, e);
            self.stats.record_fault();
            self.registry.set_availability(vehicle.id, true);
            return ride;
        }
        info!(
            "Ride #{} in progress with vehicle #{}, duration: {} units",
            ride.id, vehicle.id, duration
        );
        self.publish(DispatchEvent::RideStarted {
            ride_id: ride.id,
            vehicle_id: vehicle.id,
            duration_units: duration,
        });

        let delay = travel_delay(self.unit_duration, duration);
        let completion = {
            let ride = Arc::clone(&ride);
            let registry = Arc::clone(&self.registry);
            let events = self.events.clone();
            let stats = Arc::clone(&self.stats);
            async move {
                sleep(delay).await;
                complete_ride(&ride, &registry, &events, &stats)
            }
        };
        self.completions.spawn(completion);

        ride
    }

    fn publish(&self, event: DispatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Wall-clock delay for `units` of travel, saturating instead of overflowing.
pub fn travel_delay(unit_duration: Duration, units: u64) -> Duration {
    let units = u32::try_from(units).unwrap_or(u32::MAX);
    unit_duration.saturating_mul(units)
}

/// Finishes an in-progress ride and hands its vehicle back to the registry at
/// the dropoff point.
///
/// Any failure here means ride and registry bookkeeping have diverged; it is
/// logged, counted, and returned rather than swallowed.
pub fn complete_ride(
    ride: &Ride,
    registry: &VehicleRegistry,
    events: &broadcast::Sender<DispatchEvent>,
    stats: &DispatchStats,
) -> Result<(), DispatchError> {
    let result = release_vehicle(ride, registry);
    match &result {
        Ok(vehicle_id) => {
            stats.record_finished();
            info!(
                "Ride #{} finished, vehicle #{} now at {} and available",
                ride.id, vehicle_id, ride.dropoff
            );
            let _ = events.send(DispatchEvent::RideFinished {
                ride_id: ride.id,
                vehicle_id: *vehicle_id,
                location: ride.dropoff,
            });
        }
        Err(e) => {
            stats.record_fault();
            error!("Completion of ride #{} failed: {}", ride.id, e);
        }
    }
    result.map(|_| ())
}

fn release_vehicle(ride: &Ride, registry: &VehicleRegistry) -> Result<VehicleId, DispatchError> {
    ride.finish()?;
    let vehicle_id = ride
        .assigned_vehicle()
        .ok_or(DispatchError::ConsistencyFault {
            ride_id: ride.id,
            vehicle_id: 0,
            operation: "find the assigned",
        })?;
    if !registry.relocate(vehicle_id, ride.dropoff) {
        return Err(DispatchError::ConsistencyFault {
            ride_id: ride.id,
            vehicle_id,
            operation: "relocate",
        });
    }
    if !registry.set_availability(vehicle_id, true) {
        return Err(DispatchError::ConsistencyFault {
            ride_id: ride.id,
            vehicle_id,
            operation: "release",
        });
    }
    Ok(vehicle_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch_engine::location::Coordinate;
    use crate::dispatch_engine::rides::RideStatus;

    struct Harness {
        scheduler: RideScheduler,
        registry: Arc<VehicleRegistry>,
        stats: Arc<DispatchStats>,
        completions: Arc<CompletionTracker>,
        events: broadcast::Receiver<DispatchEvent>,
        _intake: mpsc::Sender<RideRequest>,
    }

    fn harness(unit_duration_ms: u64) -> Harness {
        let config = DispatchConfig {
            admission_interval_ms: 10,
            unit_duration_ms,
            ..DispatchConfig::default()
        };
        let (intake, requests) = mpsc::channel(8);
        let (events, receiver) = broadcast::channel(64);
        let registry = Arc::new(VehicleRegistry::new());
        let stats = Arc::new(DispatchStats::default());
        let completions = Arc::new(CompletionTracker::new());
        let scheduler = RideScheduler::new(
            requests,
            Arc::clone(&registry),
            &config,
            events,
            Arc::clone(&stats),
            Arc::clone(&completions),
        );
        Harness {
            scheduler,
            registry,
            stats,
            completions,
            events: receiver,
            _intake: intake,
        }
    }

    fn request(requester_id: u64, pickup: (i64, i64), dropoff: (i64, i64)) -> RideRequest {
        RideRequest {
            requester_id,
            pickup: Coordinate::new(pickup.0, pickup.1),
            dropoff: Coordinate::new(dropoff.0, dropoff.1),
        }
    }

    async fn drain(completions: &CompletionTracker) -> Option<DispatchError> {
        completions.wait_idle().await;
        completions.take_fault()
    }

    #[tokio::test(start_paused = true)]
    async fn assigned_ride_completes_and_frees_vehicle() {
        let mut h = harness(100);
        let vehicle_id = h.registry.register(Coordinate::new(0, 0));

        let ride = h.scheduler.process_request(request(9, (0, 0), (5, 0)));
        assert_eq!(ride.id, 1);
        assert_eq!(ride.status(), RideStatus::InProgress);
        assert_eq!(ride.assigned_vehicle(), Some(vehicle_id));
        assert!(!h.registry.get(vehicle_id).unwrap().available);

        assert_eq!(h.completions.outstanding(), 1);
        assert!(drain(&h.completions).await.is_none());
        assert_eq!(h.completions.outstanding(), 0);

        assert_eq!(ride.status(), RideStatus::Finished);
        let vehicle = h.registry.get(vehicle_id).unwrap();
        assert_eq!(vehicle.location, Coordinate::new(5, 0));
        assert!(vehicle.available);
        assert_eq!(h.stats.snapshot().finished, 1);

        let kinds: Vec<_> = std::iter::from_fn(|| h.events.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["created", "assigned", "started", "finished"]);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_waits_for_scaled_duration() {
        let mut h = harness(100);
        h.registry.register(Coordinate::new(0, 0));

        let start = tokio::time::Instant::now();
        let ride = h.scheduler.process_request(request(1, (0, 3), (0, 5)));
        drain(&h.completions).await;

        // 3 units to pickup plus 2 units of trip.
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(ride.status(), RideStatus::Finished);
    }

    #[tokio::test]
    async fn ride_without_vehicle_is_abandoned() {
        let mut h = harness(1);
        let ride = h.scheduler.process_request(request(1, (0, 0), (1, 1)));

        assert_eq!(ride.status(), RideStatus::Created);
        assert_eq!(h.completions.outstanding(), 0);
        assert!(drain(&h.completions).await.is_none());
        assert_eq!(h.stats.snapshot().abandoned, 1);
        assert_eq!(h.events.try_recv().unwrap().kind(), "created");
        assert_eq!(
            h.events.try_recv().unwrap(),
            DispatchEvent::RideAbandoned { ride_id: 1 }
        );
    }

    #[tokio::test]
    async fn ride_ids_increase_in_admission_order() {
        let mut h = harness(1);
        let ids: Vec<_> = (0..4)
            .map(|i| h.scheduler.process_request(request(i, (0, 0), (1, 1))).id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn completion_with_unknown_vehicle_is_a_fault() {
        let registry = VehicleRegistry::new();
        let stats = DispatchStats::default();
        let (events, _rx) = broadcast::channel(4);

        let ride = Ride::new(3, request(1, (0, 0), (2, 2)));
        ride.mark_assigned(77).unwrap();
        ride.start().unwrap();

        let err = complete_ride(&ride, &registry, &events, &stats).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ConsistencyFault {
                ride_id: 3,
                vehicle_id: 77,
                operation: "relocate",
            }
        ));
        assert_eq!(stats.snapshot().faults, 1);
        assert_eq!(stats.snapshot().finished, 0);
    }

    #[test]
    fn travel_delay_scales_and_saturates() {
        let unit = Duration::from_millis(100);
        assert_eq!(travel_delay(unit, 5), Duration::from_millis(500));
        assert_eq!(travel_delay(unit, 0), Duration::ZERO);
        assert_eq!(travel_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn extreme_coordinates_do_not_stop_the_scheduler() {
        let mut h = harness(100);
        let far = h.registry.register(Coordinate::new(i64::MIN, 0));

        let ride = h
            .scheduler
            .process_request(request(1, (i64::MAX, 0), (i64::MAX, 5)));
        assert_eq!(ride.status(), RideStatus::InProgress);
        assert_eq!(ride.assigned_vehicle(), Some(far));

        let published: Vec<_> = std::iter::from_fn(|| h.events.try_recv().ok()).collect();
        assert_eq!(
            published[2],
            DispatchEvent::RideStarted {
                ride_id: 1,
                vehicle_id: far,
                duration_units: u64::MAX,
            }
        );

        // The loop keeps admitting; the only vehicle is still on its ride.
        let next = h.scheduler.process_request(request(2, (0, 0), (1, 0)));
        assert_eq!(next.id, 2);
        assert_eq!(next.status(), RideStatus::Created);
        assert_eq!(h.stats.snapshot().admitted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_tracker_does_not_cancel_completions() {
        let mut h = harness(100);
        let vehicle_id = h.registry.register(Coordinate::new(0, 0));

        let ride = h.scheduler.process_request(request(1, (0, 0), (50, 0)));
        let registry = Arc::clone(&h.registry);
        drop(h);

        sleep(Duration::from_secs(6)).await;
        assert_eq!(ride.status(), RideStatus::Finished);
        let vehicle = registry.get(vehicle_id).unwrap();
        assert!(vehicle.available);
        assert_eq!(vehicle.location, Coordinate::new(50, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_leaves_completions_running() {
        let mut h = harness(100);
        h.registry.register(Coordinate::new(0, 0));
        let ride = h.scheduler.process_request(request(1, (0, 0), (50, 0)));

        let waited = tokio::time::timeout(Duration::from_millis(100), h.completions.wait_idle()).await;
        assert!(waited.is_err());
        assert_eq!(h.completions.outstanding(), 1);

        h.completions.wait_idle().await;
        assert_eq!(ride.status(), RideStatus::Finished);
        assert_eq!(h.stats.snapshot().finished, 1);
    }

    #[tokio::test]
    async fn tracker_keeps_the_first_fault() {
        let tracker = Arc::new(CompletionTracker::new());
        for vehicle_id in [7, 8] {
            tracker.spawn(async move {
                Err(DispatchError::ConsistencyFault {
                    ride_id: vehicle_id,
                    vehicle_id,
                    operation: "release",
                })
            });
            tracker.wait_idle().await;
        }
        tracker.spawn(async { Ok(()) });
        tracker.wait_idle().await;

        assert!(matches!(
            tracker.take_fault(),
            Some(DispatchError::ConsistencyFault { vehicle_id: 7, .. })
        ));
        assert!(tracker.take_fault().is_none());
        assert_eq!(tracker.outstanding(), 0);
    }
}
