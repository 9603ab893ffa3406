use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::dispatch_engine::location::Coordinate;

pub type VehicleId = u64;

/// A dispatchable vehicle. Owned by the [`VehicleRegistry`]; callers only see copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub location: Coordinate,
    /// False while the vehicle is reserved by an assigned or in-progress ride.
    pub available: bool,
}

struct RegistryState {
    vehicles: HashMap<VehicleId, Vehicle>,
    next_id: VehicleId,
}

/// Concurrency-safe store of every vehicle in the fleet.
///
/// Reads take the shared lock, mutations the exclusive one. No guard ever
/// escapes a method, so callers cannot hold the lock across an `.await`.
pub struct VehicleRegistry {
    state: RwLock<RegistryState>,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                vehicles: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    // Each operation writes at most one field of one vehicle, so a panic in
    // another holder cannot leave the map half-updated.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an available vehicle at `location` and returns its new ID.
    pub fn register(&self, location: Coordinate) -> VehicleId {
        let mut state = self.write();
        let id = state.next_id;
        state.next_id += 1;
        state.vehicles.insert(
            id,
            Vehicle {
                id,
                location,
                available: true,
            },
        );
        id
    }

    pub fn get(&self, id: VehicleId) -> Option<Vehicle> {
        self.read().vehicles.get(&id).cloned()
    }

    /// Snapshot of every available vehicle, ordered by ID.
    ///
    /// The snapshot may be stale as soon as the lock is released.
    pub fn list_available(&self) -> Vec<Vehicle> {
        let mut available: Vec<Vehicle> = self
            .read()
            .vehicles
            .values()
            .filter(|v| v.available)
            .cloned()
            .collect();
        available.sort_by_key(|v| v.id);
        available
    }

    /// Returns false if the vehicle is unknown.
    pub fn set_availability(&self, id: VehicleId, available: bool) -> bool {
        match self.write().vehicles.get_mut(&id) {
            Some(vehicle) => {
                vehicle.available = available;
                true
            }
            None => false,
        }
    }

    /// Returns false if the vehicle is unknown.
    pub fn relocate(&self, id: VehicleId, location: Coordinate) -> bool {
        match self.write().vehicles.get_mut(&id) {
            Some(vehicle) => {
                vehicle.location = location;
                true
            }
            None => false,
        }
    }

    /// Moves a vehicle only while it is available. `None` if the vehicle is
    /// unknown, `Some(false)` if it is reserved.
    pub fn relocate_available(&self, id: VehicleId, location: Coordinate) -> Option<bool> {
        let mut state = self.write();
        let vehicle = state.vehicles.get_mut(&id)?;
        if !vehicle.available {
            return Some(false);
        }
        vehicle.location = location;
        Some(true)
    }

    pub fn count(&self) -> usize {
        self.read().vehicles.len()
    }

    pub fn available_count(&self) -> usize {
        self.read().vehicles.values().filter(|v| v.available).count()
    }
}

impl Default for VehicleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
