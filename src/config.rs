use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::global_variables::{
    ADMISSION_INTERVAL_MS, ADMISSION_QUEUE_CAPACITY, EVENT_CHANNEL_CAPACITY, FLEET_SIZE,
    GRID_SIZE, RIDER_WARMUP_MS, RIDE_REQUEST_COUNT, RIDE_REQUEST_INTERVAL_MS, UNIT_DURATION_MS,
    VEHICLE_REGISTRATION_INTERVAL_MS,
};

/// Top-level configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| DispatchError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

/// Settings for the dispatcher core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum time between two admitted ride requests.
    pub admission_interval_ms: u64,
    pub queue_capacity: usize,
    /// Wall-clock time for one unit of travel distance.
    pub unit_duration_ms: u64,
    pub event_capacity: usize,
}

impl DispatchConfig {
    pub fn admission_interval(&self) -> Duration {
        Duration::from_millis(self.admission_interval_ms)
    }

    pub fn unit_duration(&self) -> Duration {
        Duration::from_millis(self.unit_duration_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            admission_interval_ms: ADMISSION_INTERVAL_MS,
            queue_capacity: ADMISSION_QUEUE_CAPACITY,
            unit_duration_ms: UNIT_DURATION_MS,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Settings for the simulated vehicle and rider producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub fleet_size: usize,
    pub registration_interval_ms: u64,
    pub ride_count: usize,
    pub request_interval_ms: u64,
    /// Coordinates are drawn from `0..grid_size` on both axes.
    pub grid_size: i64,
    pub rider_warmup_ms: u64,
}

impl SimulationConfig {
    pub fn registration_interval(&self) -> Duration {
        Duration::from_millis(self.registration_interval_ms)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn rider_warmup(&self) -> Duration {
        Duration::from_millis(self.rider_warmup_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fleet_size: FLEET_SIZE,
            registration_interval_ms: VEHICLE_REGISTRATION_INTERVAL_MS,
            ride_count: RIDE_REQUEST_COUNT,
            request_interval_ms: RIDE_REQUEST_INTERVAL_MS,
            grid_size: GRID_SIZE,
            rider_warmup_ms: RIDER_WARMUP_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.dispatch.admission_interval(),
            Duration::from_secs(3)
        );
        assert_eq!(config.simulation.fleet_size, 15);
    }

    #[test]
    fn partial_sections_override_only_given_fields() {
        let config = Config::from_json_str(
            r#"{ "dispatch": { "unit_duration_ms": 5 }, "simulation": { "ride_count": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.dispatch.unit_duration(), Duration::from_millis(5));
        assert_eq!(config.dispatch.queue_capacity, ADMISSION_QUEUE_CAPACITY);
        assert_eq!(config.simulation.ride_count, 3);
        assert_eq!(config.simulation.grid_size, GRID_SIZE);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Config::from_json_str("{ dispatch: ").unwrap_err();
        assert!(matches!(err, DispatchError::Json(_)));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "dispatch": {{ "queue_capacity": 8 }} }}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.dispatch.queue_capacity, 8);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::from_file("/definitely/not/here.json").unwrap_err();
        match err {
            DispatchError::ConfigIo { path, .. } => {
                assert_eq!(path, Path::new("/definitely/not/here.json"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
