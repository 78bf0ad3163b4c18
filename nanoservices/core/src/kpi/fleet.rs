//! Vehicle and driver upkeep measures.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::{desc_nulls_last, division_guard, round2};
use crate::domain::{Route, TripStatus};
use crate::sources::Extract;

/// Latest recorded maintenance per vehicle; `None` when the vehicle has
/// never been serviced inside the extract.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VehicleMaintenanceRecency {
    pub vehicle_id: i64,
    pub plate: String,
    pub last_maintenance: Option<NaiveDate>,
}

pub fn vehicle_maintenance_recency(extract: &Extract) -> Vec<VehicleMaintenanceRecency> {
    let mut latest: HashMap<i64, NaiveDate> = HashMap::new();
    for record in extract.maintenance() {
        latest
            .entry(record.vehicle_id)
            .and_modify(|day| {
                if record.maintenance_date > *day {
                    *day = record.maintenance_date;
                }
            })
            .or_insert(record.maintenance_date);
    }

    let mut rows: Vec<VehicleMaintenanceRecency> = extract
        .vehicles()
        .iter()
        .map(|vehicle| VehicleMaintenanceRecency {
            vehicle_id: vehicle.id,
            plate: vehicle.plate.clone(),
            last_maintenance: latest.get(&vehicle.id).copied(),
        })
        .collect();

    // Most recently serviced first; never-serviced vehicles close the list.
    rows.sort_by(|a, b| {
        b.last_maintenance
            .cmp(&a.last_maintenance)
            .then(a.vehicle_id.cmp(&b.vehicle_id))
    });
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpiringLicense {
    pub driver_id: i64,
    pub name: String,
    pub license_number: String,
    pub license_expiry: NaiveDate,
    pub days_remaining: i64,
}

/// Drivers whose license expires within `horizon_days` of the reference
/// date, soonest first. Already-expired licenses are someone else's
/// problem and are excluded.
pub fn expiring_licenses(extract: &Extract, horizon_days: u32) -> Vec<ExpiringLicense> {
    let today = extract.reference_ts().date_naive();
    let cutoff = today + chrono::Duration::days(i64::from(horizon_days));

    let mut rows: Vec<ExpiringLicense> = extract
        .drivers()
        .iter()
        .filter(|driver| driver.license_expiry >= today && driver.license_expiry <= cutoff)
        .map(|driver| ExpiringLicense {
            driver_id: driver.id,
            name: driver.name.clone(),
            license_number: driver.license_number.clone(),
            license_expiry: driver.license_expiry,
            days_remaining: (driver.license_expiry - today).num_days(),
        })
        .collect();

    rows.sort_by(|a, b| {
        a.license_expiry
            .cmp(&b.license_expiry)
            .then(a.driver_id.cmp(&b.driver_id))
    });
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FuelByVehicleType {
    pub vehicle_type: String,
    pub completed_trips: u64,
    pub avg_l_per_100km: f64,
}

/// Average fuel burn per 100 km by vehicle type, over completed trips with
/// a positive route distance.
pub fn fuel_by_vehicle_type(extract: &Extract) -> Vec<FuelByVehicleType> {
    let type_of: HashMap<i64, &str> = extract
        .vehicles()
        .iter()
        .map(|v| (v.id, v.vehicle_type.as_str()))
        .collect();
    let routes = route_index(extract);

    let mut samples: HashMap<&str, (u64, f64)> = HashMap::new();
    for trip in extract.trips() {
        if trip.status != TripStatus::Completed {
            continue;
        }
        let (Some(kind), Some(route)) = (
            type_of.get(&trip.vehicle_id).copied(),
            routes.get(&trip.route_id).copied(),
        ) else {
            continue;
        };
        if route.distance_km <= 0.0 {
            division_guard("fuel_by_vehicle_type", &format!("route {}", route.id));
            continue;
        }
        let per_100km = trip.fuel_consumed_l / route.distance_km * 100.0;
        let entry = samples.entry(kind).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += per_100km;
    }

    let mut rows: Vec<FuelByVehicleType> = samples
        .into_iter()
        .map(|(kind, (trips, total))| FuelByVehicleType {
            vehicle_type: kind.to_string(),
            completed_trips: trips,
            avg_l_per_100km: round2(total / trips as f64),
        })
        .collect();
    rows.sort_by(|a, b| a.vehicle_type.cmp(&b.vehicle_type));
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VehicleMaintenanceCost {
    pub vehicle_id: i64,
    pub plate: String,
    pub traveled_km: f64,
    pub maintenance_cost: f64,
    pub cost_per_1000km: Option<f64>,
}

/// Maintenance spend per 1000 km traveled. A vehicle with spend but no
/// completed distance keeps a null ratio rather than dividing by zero.
pub fn maintenance_cost_per_km(extract: &Extract) -> Vec<VehicleMaintenanceCost> {
    let routes = route_index(extract);

    let mut traveled: HashMap<i64, f64> = HashMap::new();
    for trip in extract.trips() {
        if trip.status != TripStatus::Completed {
            continue;
        }
        if let Some(route) = routes.get(&trip.route_id) {
            *traveled.entry(trip.vehicle_id).or_insert(0.0) += route.distance_km;
        }
    }

    let mut spend: HashMap<i64, f64> = HashMap::new();
    for record in extract.maintenance() {
        *spend.entry(record.vehicle_id).or_insert(0.0) += record.cost;
    }

    let mut rows: Vec<VehicleMaintenanceCost> = extract
        .vehicles()
        .iter()
        .map(|vehicle| {
            let km = traveled.get(&vehicle.id).copied().unwrap_or(0.0);
            let cost = spend.get(&vehicle.id).copied().unwrap_or(0.0);
            let ratio = if km > 0.0 {
                Some(round2(cost / (km / 1000.0)))
            } else {
                if cost > 0.0 {
                    division_guard("maintenance_cost_per_km", &format!("vehicle {}", vehicle.id));
                }
                None
            };
            VehicleMaintenanceCost {
                vehicle_id: vehicle.id,
                plate: vehicle.plate.clone(),
                traveled_km: round2(km),
                maintenance_cost: round2(cost),
                cost_per_1000km: ratio,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        desc_nulls_last(a.cost_per_1000km, b.cost_per_1000km)
            .then(a.vehicle_id.cmp(&b.vehicle_id))
    });
    rows
}

fn route_index(extract: &Extract) -> HashMap<i64, &Route> {
    extract.routes().iter().map(|r| (r.id, r)).collect()
}
