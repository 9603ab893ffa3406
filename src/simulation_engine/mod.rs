// simulation_engine/mod.rs
pub mod fleet_client;
pub mod rider_client;
