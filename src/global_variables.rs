// Scheduler pacing
pub const ADMISSION_INTERVAL_MS: u64 = 3_000;
pub const ADMISSION_QUEUE_CAPACITY: usize = 150;

// One distance unit of travel maps to this much wall-clock time.
pub const UNIT_DURATION_MS: u64 = 100;

pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

// Simulated producers
pub const FLEET_SIZE: usize = 15;
pub const VEHICLE_REGISTRATION_INTERVAL_MS: u64 = 5_000;
pub const RIDE_REQUEST_COUNT: usize = 100;
pub const RIDE_REQUEST_INTERVAL_MS: u64 = 5_000;
pub const GRID_SIZE: i64 = 100;
pub const RIDER_WARMUP_MS: u64 = 10_000;
