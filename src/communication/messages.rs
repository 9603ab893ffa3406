use crate::dispatch_engine::location::Coordinate;
use crate::dispatch_engine::rides::RideId;
use crate::dispatch_engine::vehicles::VehicleId;
use serde::{Deserialize, Serialize};

/// Lifecycle notifications published by the scheduler and completion tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEvent {
    RideCreated {
        ride_id: RideId,
        requester_id: u64,
        pickup: Coordinate,
        dropoff: Coordinate,
    },
    RideAssigned {
        ride_id: RideId,
        vehicle_id: VehicleId,
        pickup_distance: u64,
    },
    /// No vehicle was free; the ride is dropped without retry.
    RideAbandoned { ride_id: RideId },
    RideStarted {
        ride_id: RideId,
        vehicle_id: VehicleId,
        duration_units: u64,
    },
    RideFinished {
        ride_id: RideId,
        vehicle_id: VehicleId,
        location: Coordinate,
    },
}

impl DispatchEvent {
    pub fn ride_id(&self) -> RideId {
        match self {
            DispatchEvent::RideCreated { ride_id, .. }
            | DispatchEvent::RideAssigned { ride_id, .. }
            | DispatchEvent::RideAbandoned { ride_id }
            | DispatchEvent::RideStarted { ride_id, .. }
            | DispatchEvent::RideFinished { ride_id, .. } => *ride_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatchEvent::RideCreated { .. } => "created",
            DispatchEvent::RideAssigned { .. } => "assigned",
            DispatchEvent::RideAbandoned { .. } => "abandoned",
            DispatchEvent::RideStarted { .. } => "started",
            DispatchEvent::RideFinished { .. } => "finished",
        }
    }
}
