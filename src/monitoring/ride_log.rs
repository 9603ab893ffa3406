use std::fs::{File, OpenOptions};
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::communication::messages::DispatchEvent;
use crate::error::DispatchError;
use crate::shared_data::current_timestamp;

/// One CSV row per dispatch event. Columns that do not apply are left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideLogRecord {
    pub timestamp: u64,
    pub event: String,
    pub ride_id: u64,
    pub requester_id: Option<u64>,
    pub vehicle_id: Option<u64>,
    pub x: Option<i64>,
    pub y: Option<i64>,
    /// Pickup distance for assignments, total travel units for starts.
    pub units: Option<u64>,
}

impl RideLogRecord {
    pub fn from_event(event: &DispatchEvent, timestamp: u64) -> Self {
        let mut record = RideLogRecord {
            timestamp,
            event: event.kind().to_string(),
            ride_id: event.ride_id(),
            requester_id: None,
            vehicle_id: None,
            x: None,
            y: None,
            units: None,
        };
        match event {
            DispatchEvent::RideCreated {
                requester_id,
                pickup,
                ..
            } => {
                record.requester_id = Some(*requester_id);
                record.x = Some(pickup.x);
                record.y = Some(pickup.y);
            }
            DispatchEvent::RideAssigned {
                vehicle_id,
                pickup_distance,
                ..
            } => {
                record.vehicle_id = Some(*vehicle_id);
                record.units = Some(*pickup_distance);
            }
            DispatchEvent::RideAbandoned { .. } => {}
            DispatchEvent::RideStarted {
                vehicle_id,
                duration_units,
                ..
            } => {
                record.vehicle_id = Some(*vehicle_id);
                record.units = Some(*duration_units);
            }
            DispatchEvent::RideFinished {
                vehicle_id,
                location,
                ..
            } => {
                record.vehicle_id = Some(*vehicle_id);
                record.x = Some(location.x);
                record.y = Some(location.y);
            }
        }
        record
    }
}

/// Appends every event from `events` to the CSV file at `path` until the
/// channel closes. Returns the number of rows written.
///
/// Headers are only written when the file is new or empty.
pub async fn run_ride_log(
    mut events: broadcast::Receiver<DispatchEvent>,
    path: impl AsRef<Path>,
) -> Result<usize, DispatchError> {
    let path = path.as_ref();
    let has_rows = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(csv::Error::from)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(!has_rows)
        .from_writer(file);

    let mut written = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                writer.serialize(RideLogRecord::from_event(&event, current_timestamp()))?;
                writer.flush().map_err(csv::Error::from)?;
                written += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Ride log fell behind, {} events were dropped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("Ride log closed after {} records ({})", written, path.display());
    Ok(written)
}

/// Reads back a ride log written by [`run_ride_log`].
pub fn read_ride_log(path: impl AsRef<Path>) -> Result<Vec<RideLogRecord>, DispatchError> {
    let file = File::open(path).map_err(csv::Error::from)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for record in reader.deserialize::<RideLogRecord>() {
        records.push(record?);
    }
    Ok(records)
}
