use std::path::PathBuf;

use thiserror::Error;

use crate::dispatch_engine::rides::{RideId, RideStatus};
use crate::dispatch_engine::vehicles::VehicleId;

/// Errors surfaced by the dispatcher.
///
/// "No vehicle available" is not in here: it is an expected outcome and is
/// reported as `None` by the assigner.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("vehicle #{0} not found")]
    VehicleNotFound(VehicleId),

    #[error("vehicle #{0} is on a ride")]
    VehicleBusy(VehicleId),

    #[error("admission queue is full")]
    QueueFull,

    #[error("dispatcher is shut down")]
    ShutDown,

    #[error("ride #{ride_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        ride_id: RideId,
        from: RideStatus,
        to: RideStatus,
    },

    /// Registry and ride bookkeeping disagree. Never expected while invariants hold.
    #[error("consistency fault: could not {operation} vehicle #{vehicle_id} after ride #{ride_id}")]
    ConsistencyFault {
        ride_id: RideId,
        vehicle_id: VehicleId,
        operation: &'static str,
    },

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ride log error: {0}")]
    RideLog(#[from] csv::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
