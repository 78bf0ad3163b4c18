//! Type-2 reconciliation of the three conformed dimensions.
//!
//! Every run compares the extract's entity snapshot against the current
//! dimension versions. A changed tracked attribute closes the current
//! version and opens a new one; the closed row keeps its surrogate key so
//! history written against it stays valid. Entities absent from the
//! snapshot are left current.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleetmetrics_utils::FleetResult;

use super::store::{
    Dimension, DimDriverVersion, DimRouteVersion, DimVehicleVersion, WarehouseStore,
};
use crate::domain::{Driver, Route, Vehicle};
use crate::sources::Extract;

/// Natural key to current surrogate key, per dimension, as of one run.
#[derive(Debug, Default)]
pub struct DimensionKeys {
    pub vehicles: HashMap<i64, i64>,
    pub drivers: HashMap<i64, i64>,
    pub routes: HashMap<i64, i64>,
}

/// Reconcile all three dimensions against the snapshot. `effective_at` is
/// the run's window end: replaying the same window sees the same attribute
/// values and opens nothing new.
pub fn reconcile_dimensions(
    store: &WarehouseStore,
    extract: &Extract,
    effective_at: DateTime<Utc>,
) -> FleetResult<DimensionKeys> {
    let mut keys = DimensionKeys::default();
    let mut opened = 0usize;
    let mut closed = 0usize;

    for vehicle in extract.vehicles() {
        let key = match store.current_vehicle_version(vehicle.id)? {
            None => {
                opened += 1;
                store.insert_vehicle_version(vehicle, effective_at)?
            }
            Some(current) if vehicle_changed(&current, vehicle) => {
                store.close_dimension_version(Dimension::Vehicle, current.vehicle_key, effective_at)?;
                closed += 1;
                opened += 1;
                store.insert_vehicle_version(vehicle, effective_at)?
            }
            Some(current) => current.vehicle_key,
        };
        keys.vehicles.insert(vehicle.id, key);
    }

    for driver in extract.drivers() {
        let key = match store.current_driver_version(driver.id)? {
            None => {
                opened += 1;
                store.insert_driver_version(driver, effective_at)?
            }
            Some(current) if driver_changed(&current, driver) => {
                store.close_dimension_version(Dimension::Driver, current.driver_key, effective_at)?;
                closed += 1;
                opened += 1;
                store.insert_driver_version(driver, effective_at)?
            }
            Some(current) => current.driver_key,
        };
        keys.drivers.insert(driver.id, key);
    }

    for route in extract.routes() {
        let key = match store.current_route_version(route.id)? {
            None => {
                opened += 1;
                store.insert_route_version(route, effective_at)?
            }
            Some(current) if route_changed(&current, route) => {
                store.close_dimension_version(Dimension::Route, current.route_key, effective_at)?;
                closed += 1;
                opened += 1;
                store.insert_route_version(route, effective_at)?
            }
            Some(current) => current.route_key,
        };
        keys.routes.insert(route.id, key);
    }

    tracing::debug!(opened, closed, "dimension reconciliation complete");
    Ok(keys)
}

fn vehicle_changed(current: &DimVehicleVersion, vehicle: &Vehicle) -> bool {
    current.plate != vehicle.plate
        || current.vehicle_type != vehicle.vehicle_type
        || current.status != vehicle.status
}

fn driver_changed(current: &DimDriverVersion, driver: &Driver) -> bool {
    current.name != driver.name
        || current.license_number != driver.license_number
        || current.license_expiry != driver.license_expiry
        || current.status != driver.status
}

fn route_changed(current: &DimRouteVersion, route: &Route) -> bool {
    current.code != route.code
        || current.origin_city != route.origin_city
        || current.destination_city != route.destination_city
        || current.distance_km != route.distance_km
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DriverStatus, VehicleStatus};
    use crate::kpi::fixtures::*;

    #[test]
    fn first_run_opens_a_version_per_entity() {
        let store = WarehouseStore::in_memory().unwrap();
        let extract = ExtractBuilder::new()
            .vehicle(1, "AAA-111", "van", VehicleStatus::Active)
            .vehicle(2, "BBB-222", "large_truck", VehicleStatus::Active)
            .driver(1, "Ana", "L1", date(2027, 1, 1), DriverStatus::Active)
            .route(1, "R1", "Bogota", "Cali", 460.0)
            .build();

        let keys = reconcile_dimensions(&store, &extract, ts(2026, 4, 1, 0, 0)).unwrap();
        assert_eq!(keys.vehicles.len(), 2);
        assert_eq!(keys.drivers.len(), 1);
        assert_eq!(keys.routes.len(), 1);

        let version = store.current_vehicle_version(1).unwrap().unwrap();
        assert_eq!(version.vehicle_key, keys.vehicles[&1]);
        assert!(version.is_current);
        assert_eq!(version.valid_to, None);
    }

    #[test]
    fn unchanged_snapshot_reuses_keys() {
        let store = WarehouseStore::in_memory().unwrap();
        let extract = ExtractBuilder::new()
            .vehicle(1, "AAA-111", "van", VehicleStatus::Active)
            .build();

        let first = reconcile_dimensions(&store, &extract, ts(2026, 4, 1, 0, 0)).unwrap();
        let second = reconcile_dimensions(&store, &extract, ts(2026, 4, 2, 0, 0)).unwrap();

        assert_eq!(first.vehicles[&1], second.vehicles[&1]);
        assert_eq!(store.vehicle_history(1).unwrap().len(), 1);
    }

    #[test]
    fn changed_attribute_versions_the_dimension() {
        let store = WarehouseStore::in_memory().unwrap();
        let effective_first = ts(2026, 4, 1, 0, 0);
        let effective_second = ts(2026, 4, 2, 0, 0);

        let before = ExtractBuilder::new()
            .vehicle(1, "AAA-111", "van", VehicleStatus::Active)
            .build();
        let first = reconcile_dimensions(&store, &before, effective_first).unwrap();

        let after = ExtractBuilder::new()
            .vehicle(1, "AAA-111", "van", VehicleStatus::InMaintenance)
            .build();
        let second = reconcile_dimensions(&store, &after, effective_second).unwrap();

        assert_ne!(first.vehicles[&1], second.vehicles[&1]);

        let history = store.vehicle_history(1).unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_current);
        assert_eq!(history[0].valid_to, Some(effective_second));
        assert_eq!(history[0].status, VehicleStatus::Active);
        assert!(history[1].is_current);
        assert_eq!(history[1].valid_from, effective_second);
        assert_eq!(history[1].status, VehicleStatus::InMaintenance);
    }

    #[test]
    fn driver_status_change_closes_the_prior_version() {
        let store = WarehouseStore::in_memory().unwrap();
        let effective_second = ts(2026, 4, 2, 0, 0);

        let before = ExtractBuilder::new()
            .driver(1, "Ana", "L1", date(2027, 1, 1), DriverStatus::Active)
            .build();
        let first = reconcile_dimensions(&store, &before, ts(2026, 4, 1, 0, 0)).unwrap();

        let after = ExtractBuilder::new()
            .driver(1, "Ana", "L1", date(2027, 1, 1), DriverStatus::Inactive)
            .build();
        let second = reconcile_dimensions(&store, &after, effective_second).unwrap();

        assert_ne!(first.drivers[&1], second.drivers[&1]);

        let history = store.driver_history(1).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].valid_to, Some(effective_second));
        assert!(!history[0].is_current);
        assert_eq!(history[1].status, DriverStatus::Inactive);
        assert!(history[1].is_current);
    }

    #[test]
    fn vanished_entity_stays_current() {
        let store = WarehouseStore::in_memory().unwrap();
        let both = ExtractBuilder::new()
            .driver(1, "Ana", "L1", date(2027, 1, 1), DriverStatus::Active)
            .driver(2, "Beto", "L2", date(2027, 1, 1), DriverStatus::Active)
            .build();
        reconcile_dimensions(&store, &both, ts(2026, 4, 1, 0, 0)).unwrap();

        let only_ana = ExtractBuilder::new()
            .driver(1, "Ana", "L1", date(2027, 1, 1), DriverStatus::Active)
            .build();
        let keys = reconcile_dimensions(&store, &only_ana, ts(2026, 4, 2, 0, 0)).unwrap();

        assert!(!keys.drivers.contains_key(&2));
        let beto = store.current_driver_version(2).unwrap().unwrap();
        assert!(beto.is_current);
        assert_eq!(beto.valid_to, None);
    }

    #[test]
    fn route_distance_change_is_tracked() {
        let store = WarehouseStore::in_memory().unwrap();
        let before = ExtractBuilder::new()
            .route(1, "R1", "Bogota", "Cali", 460.0)
            .build();
        let first = reconcile_dimensions(&store, &before, ts(2026, 4, 1, 0, 0)).unwrap();

        let after = ExtractBuilder::new()
            .route(1, "R1", "Bogota", "Cali", 455.0)
            .build();
        let second = reconcile_dimensions(&store, &after, ts(2026, 4, 2, 0, 0)).unwrap();

        assert_ne!(first.routes[&1], second.routes[&1]);
        assert_eq!(store.route_history(1).unwrap().len(), 2);
    }
}
