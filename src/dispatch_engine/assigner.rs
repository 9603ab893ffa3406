use std::sync::Arc;

use log::{error, info};

use crate::dispatch_engine::location::{distance, Coordinate};
use crate::dispatch_engine::rides::Ride;
use crate::dispatch_engine::vehicles::{Vehicle, VehicleRegistry};

/// Picks the closest vehicle to `pickup` from a snapshot.
///
/// On equal distances the vehicle seen first in `vehicles` wins. The registry
/// hands out snapshots in ID order, but callers must not rely on ties being
/// resolved toward any particular vehicle.
pub fn closest_vehicle(vehicles: &[Vehicle], pickup: Coordinate) -> Option<(&Vehicle, u64)> {
    let mut best: Option<(&Vehicle, u64)> = None;
    for vehicle in vehicles {
        let d = distance(vehicle.location, pickup);
        match best {
            Some((_, best_distance)) if best_distance <= d => {}
            _ => best = Some((vehicle, d)),
        }
    }
    best
}

/// Travel units for a ride: vehicle to pickup, then pickup to dropoff.
/// Saturates at `u64::MAX`.
pub fn ride_duration(vehicle: &Vehicle, ride: &Ride) -> u64 {
    distance(vehicle.location, ride.pickup).saturating_add(distance(ride.pickup, ride.dropoff))
}

/// Reserves the nearest available vehicle for a ride.
///
/// Snapshot-then-reserve is only race free with a single caller; the
/// scheduler loop is that caller.
pub struct VehicleAssigner {
    registry: Arc<VehicleRegistry>,
}

impl VehicleAssigner {
    pub fn new(registry: Arc<VehicleRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the reserved vehicle (as it was at reservation time, now
    /// unavailable), or `None` if nothing could be reserved. On success the ride
    /// is `Assigned` to that vehicle; otherwise it is left untouched.
    pub fn assign(&self, ride: &Ride) -> Option<Vehicle> {
        let available = self.registry.list_available();
        let Some((candidate, pickup_distance)) = closest_vehicle(&available, ride.pickup) else {
            info!("No vehicles available for ride #{}", ride.id);
            return None;
        };

        if !self.registry.set_availability(candidate.id, false) {
            error!(
                "Vehicle #{} vanished before it could be reserved for ride #{}",
                candidate.id, ride.id
            );
            return None;
        }

        if let Err(e) = ride.mark_assigned(candidate.id) {
            error!("Releasing vehicle #{}: {}", candidate.id, e);
            self.registry.set_availability(candidate.id, true);
            return None;
        }

        info!(
            "Assigned vehicle #{} to ride #{} (distance: {})",
            candidate.id, ride.id, pickup_distance
        );
        Some(Vehicle {
            available: false,
            ..candidate.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch_engine::rides::{RideRequest, RideStatus};

    fn ride(id: u64, pickup: Coordinate, dropoff: Coordinate) -> Ride {
        Ride::new(
            id,
            RideRequest {
                requester_id: id,
                pickup,
                dropoff,
            },
        )
    }

    #[test]
    fn picks_the_nearest_vehicle() {
        let registry = Arc::new(VehicleRegistry::new());
        let near = registry.register(Coordinate::new(0, 0));
        let far = registry.register(Coordinate::new(10, 10));
        let assigner = VehicleAssigner::new(Arc::clone(&registry));

        let ride = ride(1, Coordinate::new(1, 1), Coordinate::new(2, 2));
        let vehicle = assigner.assign(&ride).unwrap();

        assert_eq!(vehicle.id, near);
        assert!(!vehicle.available);
        assert_eq!(ride.status(), RideStatus::Assigned);
        assert_eq!(ride.assigned_vehicle(), Some(near));
        assert!(!registry.get(near).unwrap().available);
        assert!(registry.get(far).unwrap().available);
    }

    #[test]
    fn no_vehicles_leaves_ride_created() {
        let registry = Arc::new(VehicleRegistry::new());
        let assigner = VehicleAssigner::new(Arc::clone(&registry));
        let ride = ride(1, Coordinate::new(0, 0), Coordinate::new(1, 0));

        assert!(assigner.assign(&ride).is_none());
        assert_eq!(ride.status(), RideStatus::Created);
        assert_eq!(ride.assigned_vehicle(), None);
    }

    #[test]
    fn reserved_vehicle_is_not_offered_twice() {
        let registry = Arc::new(VehicleRegistry::new());
        let only = registry.register(Coordinate::new(5, 5));
        let assigner = VehicleAssigner::new(Arc::clone(&registry));

        let first = ride(1, Coordinate::new(5, 5), Coordinate::new(6, 6));
        let second = ride(2, Coordinate::new(5, 5), Coordinate::new(6, 6));

        assert_eq!(assigner.assign(&first).map(|v| v.id), Some(only));
        assert!(assigner.assign(&second).is_none());
        assert_eq!(second.status(), RideStatus::Created);
        assert_eq!(registry.available_count(), 0);
    }

    #[test]
    fn refused_ride_releases_the_reservation() {
        let registry = Arc::new(VehicleRegistry::new());
        let id = registry.register(Coordinate::new(0, 0));
        let assigner = VehicleAssigner::new(Arc::clone(&registry));

        let ride = ride(1, Coordinate::new(0, 0), Coordinate::new(1, 0));
        ride.mark_assigned(99).unwrap();

        assert!(assigner.assign(&ride).is_none());
        assert!(registry.get(id).unwrap().available);
        assert_eq!(ride.assigned_vehicle(), Some(99));
    }

    #[test]
    fn closest_vehicle_keeps_first_on_ties() {
        let vehicles = vec![
            Vehicle {
                id: 4,
                location: Coordinate::new(2, 0),
                available: true,
            },
            Vehicle {
                id: 9,
                location: Coordinate::new(0, 2),
                available: true,
            },
        ];
        let (vehicle, d) = closest_vehicle(&vehicles, Coordinate::new(0, 0)).unwrap();
        assert_eq!((vehicle.id, d), (4, 2));
        assert!(closest_vehicle(&[], Coordinate::new(0, 0)).is_none());
    }

    #[test]
    fn duration_covers_approach_and_trip() {
        let vehicle = Vehicle {
            id: 1,
            location: Coordinate::new(0, 0),
            available: true,
        };
        let trip = ride(1, Coordinate::new(0, 0), Coordinate::new(5, 0));
        assert_eq!(ride_duration(&vehicle, &trip), 5);

        let trip = ride(2, Coordinate::new(3, 4), Coordinate::new(3, 0));
        assert_eq!(ride_duration(&vehicle, &trip), 11);
    }

    #[test]
    fn duration_saturates_on_extreme_coordinates() {
        let vehicle = Vehicle {
            id: 1,
            location: Coordinate::new(i64::MIN, 0),
            available: true,
        };
        let trip = ride(1, Coordinate::new(i64::MAX, 0), Coordinate::new(i64::MAX, 5));
        assert_eq!(ride_duration(&vehicle, &trip), u64::MAX);
    }
}
