// dispatch_engine/mod.rs
pub mod admission;
pub mod assigner;
pub mod location;
pub mod rides;
pub mod scheduler;
pub mod vehicles;
