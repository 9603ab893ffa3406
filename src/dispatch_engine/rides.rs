use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::dispatch_engine::location::Coordinate;
use crate::dispatch_engine::vehicles::VehicleId;
use crate::error::DispatchError;

pub type RideId = u64;

/// Lifecycle of a ride. Variants are ordered; a ride only ever moves forward.
///
/// A ride that found no vehicle stays `Created` and is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RideStatus {
    Created,
    Assigned,
    InProgress,
    Finished,
}

impl RideStatus {
    fn next(self) -> Option<RideStatus> {
        match self {
            RideStatus::Created => Some(RideStatus::Assigned),
            RideStatus::Assigned => Some(RideStatus::InProgress),
            RideStatus::InProgress => Some(RideStatus::Finished),
            RideStatus::Finished => None,
        }
    }
}

/// A request waiting in the admission queue. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideRequest {
    pub requester_id: u64,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
}

#[derive(Debug)]
struct RideState {
    status: RideStatus,
    vehicle_id: Option<VehicleId>,
}

/// A ride admitted by the scheduler.
///
/// The scheduler and the ride's completion task both touch `status` and the
/// assigned vehicle, so those live behind a per-ride mutex. Everything else
/// is fixed at creation.
#[derive(Debug)]
pub struct Ride {
    pub id: RideId,
    pub requester_id: u64,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    state: Mutex<RideState>,
}

impl Ride {
    pub fn new(id: RideId, request: RideRequest) -> Self {
        Self {
            id,
            requester_id: request.requester_id,
            pickup: request.pickup,
            dropoff: request.dropoff,
            state: Mutex::new(RideState {
                status: RideStatus::Created,
                vehicle_id: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RideState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RideStatus {
        self.lock().status
    }

    pub fn assigned_vehicle(&self) -> Option<VehicleId> {
        self.lock().vehicle_id
    }

    /// Records the reserved vehicle and moves `Created -> Assigned`.
    pub fn mark_assigned(&self, vehicle_id: VehicleId) -> Result<(), DispatchError> {
        let mut state = self.lock();
        self.advance(&mut state, RideStatus::Assigned)?;
        state.vehicle_id = Some(vehicle_id);
        Ok(())
    }

    /// `Assigned -> InProgress`.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut state = self.lock();
        self.advance(&mut state, RideStatus::InProgress)
    }

    /// `InProgress -> Finished`.
    pub fn finish(&self) -> Result<(), DispatchError> {
        let mut state = self.lock();
        self.advance(&mut state, RideStatus::Finished)
    }

    fn advance(&self, state: &mut RideState, to: RideStatus) -> Result<(), DispatchError> {
        if state.status.next() != Some(to) {
            return Err(DispatchError::InvalidTransition {
                ride_id: self.id,
                from: state.status,
                to,
            });
        }
        state.status = to;
        Ok(())
    }
}
