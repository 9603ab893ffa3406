//! Nearest-vehicle ride dispatch over a simulated fleet.
//!
//! Ride requests enter an admission queue, a single scheduler loop admits one
//! per interval and reserves the closest free vehicle, and a completion task
//! per ride hands the vehicle back at the dropoff point.

pub mod communication;
pub mod config;
pub mod dispatch_engine;
pub mod error;
pub mod global_variables;
pub mod monitoring;
pub mod server;
pub mod shared_data;
pub mod simulation_engine;

pub use config::{Config, DispatchConfig, SimulationConfig};
pub use dispatch_engine::location::{distance, Coordinate};
pub use error::DispatchError;
pub use server::Dispatcher;
