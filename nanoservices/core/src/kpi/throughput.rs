//! Volume, throughput, and ranked efficiency measures.

use std::collections::{HashMap, HashSet};

use chrono::Months;
use serde::Serialize;

use super::{assign_dense_ranks, division_guard, round2, MIN_TRIP_HOURS};
use crate::domain::{Route, Trip, TripStatus};
use crate::sources::Extract;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteDeliveryAverage {
    pub route_id: i64,
    pub code: String,
    pub trips: u64,
    pub avg_deliveries_per_trip: f64,
}

/// Average deliveries carried per trip, for every route with at least one
/// trip in the window. Trips without deliveries pull the average down.
pub fn route_delivery_averages(extract: &Extract) -> Vec<RouteDeliveryAverage> {
    let routes = route_index(extract);
    let per_trip = deliveries_per_trip(extract);

    let mut grouped: HashMap<i64, (u64, u64)> = HashMap::new();
    for trip in extract.trips() {
        let entry = grouped.entry(trip.route_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += per_trip.get(&trip.id).copied().unwrap_or(0);
    }

    let mut rows: Vec<RouteDeliveryAverage> = grouped
        .into_iter()
        .filter_map(|(route_id, (trips, deliveries))| {
            routes.get(&route_id).map(|route| RouteDeliveryAverage {
                route_id,
                code: route.code.clone(),
                trips,
                avg_deliveries_per_trip: round2(deliveries as f64 / trips as f64),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.avg_deliveries_per_trip
            .total_cmp(&a.avg_deliveries_per_trip)
            .then(a.route_id.cmp(&b.route_id))
    });
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverDeliveryAverage {
    pub driver_id: i64,
    pub name: String,
    pub trips: u64,
    pub avg_deliveries_per_trip: f64,
}

/// Average deliveries per trip over the trailing six months, for every
/// driver in the snapshot. Drivers without a qualifying trip report 0.
pub fn driver_delivery_averages(extract: &Extract) -> Vec<DriverDeliveryAverage> {
    let reference = extract.reference_ts();
    let floor = reference
        .checked_sub_months(Months::new(6))
        .unwrap_or(reference);
    let per_trip = deliveries_per_trip(extract);

    let mut grouped: HashMap<i64, (u64, u64)> = HashMap::new();
    for trip in extract.trips() {
        if trip.departure_ts < floor || trip.departure_ts >= reference {
            continue;
        }
        let entry = grouped.entry(trip.driver_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += per_trip.get(&trip.id).copied().unwrap_or(0);
    }

    let mut rows: Vec<DriverDeliveryAverage> = extract
        .drivers()
        .iter()
        .map(|driver| {
            let (trips, deliveries) = grouped.get(&driver.id).copied().unwrap_or((0, 0));
            let avg = if trips == 0 { 0.0 } else { round2(deliveries as f64 / trips as f64) };
            DriverDeliveryAverage {
                driver_id: driver.id,
                name: driver.name.clone(),
                trips,
                avg_deliveries_per_trip: avg,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.avg_deliveries_per_trip
            .total_cmp(&a.avg_deliveries_per_trip)
            .then(a.driver_id.cmp(&b.driver_id))
    });
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteThroughput {
    pub route_id: i64,
    pub code: String,
    pub deliveries: u64,
    pub hours: f64,
    pub deliveries_per_hour: f64,
}

/// The ten best routes by deliveries per operated hour, over completed
/// trips. Ties on the rounded rate resolve by route id.
pub fn top_routes_by_throughput(extract: &Extract) -> Vec<RouteThroughput> {
    let routes = route_index(extract);
    let per_trip = deliveries_per_trip(extract);

    let mut grouped: HashMap<i64, (u64, f64)> = HashMap::new();
    for trip in extract.trips() {
        if trip.status != TripStatus::Completed {
            continue;
        }
        let entry = grouped.entry(trip.route_id).or_insert((0, 0.0));
        entry.0 += per_trip.get(&trip.id).copied().unwrap_or(0);
        entry.1 += floored_hours(trip);
    }

    let mut rows: Vec<RouteThroughput> = grouped
        .into_iter()
        .filter_map(|(route_id, (deliveries, hours))| {
            routes.get(&route_id).map(|route| RouteThroughput {
                route_id,
                code: route.code.clone(),
                deliveries,
                hours: round2(hours),
                deliveries_per_hour: round2(deliveries as f64 / hours),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.deliveries_per_hour
            .total_cmp(&a.deliveries_per_hour)
            .then(a.route_id.cmp(&b.route_id))
    });
    rows.truncate(10);
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverEfficiency {
    pub driver_id: i64,
    pub name: String,
    pub punctuality_pct: Option<f64>,
    pub relative_fuel_pct: Option<f64>,
    pub score: f64,
    pub rank: u32,
}

/// Top fifteen drivers by composite efficiency.
///
/// Score is on-time percentage minus fuel burn relative to the fleet
/// (100 = fleet average). A missing component contributes zero to the
/// score but stays null in the row.
pub fn driver_efficiency(extract: &Extract) -> Vec<DriverEfficiency> {
    let routes = route_index(extract);
    let trips = trip_index(extract);
    let names: HashMap<i64, &str> =
        extract.drivers().iter().map(|d| (d.id, d.name.as_str())).collect();

    let mut active: HashSet<i64> = HashSet::new();
    let mut fuel_km: HashMap<i64, (f64, f64)> = HashMap::new();
    let mut fleet_fuel = 0.0;
    let mut fleet_km = 0.0;
    for trip in extract.trips() {
        active.insert(trip.driver_id);
        if trip.status != TripStatus::Completed {
            continue;
        }
        let Some(route) = routes.get(&trip.route_id) else { continue };
        if route.distance_km <= 0.0 {
            division_guard("driver_fuel_per_km", &format!("route {}", route.id));
            continue;
        }
        let entry = fuel_km.entry(trip.driver_id).or_insert((0.0, 0.0));
        entry.0 += trip.fuel_consumed_l;
        entry.1 += route.distance_km;
        fleet_fuel += trip.fuel_consumed_l;
        fleet_km += route.distance_km;
    }
    let fleet_fuel_per_km = if fleet_km > 0.0 { Some(fleet_fuel / fleet_km) } else { None };

    let mut punctuality: HashMap<i64, (u64, u64)> = HashMap::new();
    for delivery in extract.deliveries() {
        let Some(on_time) = delivery.is_on_time() else { continue };
        let Some(trip) = trips.get(&delivery.trip_id) else { continue };
        let entry = punctuality.entry(trip.driver_id).or_insert((0, 0));
        entry.0 += 1;
        if on_time {
            entry.1 += 1;
        }
    }

    let mut rows: Vec<DriverEfficiency> = active
        .into_iter()
        .map(|driver_id| {
            let punctuality_pct = punctuality.get(&driver_id).and_then(|&(delivered, on_time)| {
                (delivered > 0).then(|| on_time as f64 / delivered as f64 * 100.0)
            });
            let relative_fuel_pct = fuel_km.get(&driver_id).and_then(|&(fuel, km)| {
                match fleet_fuel_per_km {
                    Some(fleet) if fleet > 0.0 && km > 0.0 => Some(fuel / km / fleet * 100.0),
                    Some(_) => {
                        division_guard("relative_fuel", &format!("driver {driver_id}"));
                        None
                    }
                    None => None,
                }
            });
            let score =
                round2(punctuality_pct.unwrap_or(0.0) - relative_fuel_pct.unwrap_or(0.0));
            DriverEfficiency {
                driver_id,
                name: names.get(&driver_id).copied().unwrap_or("").to_string(),
                punctuality_pct: punctuality_pct.map(round2),
                relative_fuel_pct: relative_fuel_pct.map(round2),
                score,
                rank: 0,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.driver_id.cmp(&b.driver_id)));
    assign_dense_ranks(&mut rows, |r| r.score, |r, rank| r.rank = rank);
    rows.truncate(15);
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CityPerformance {
    pub destination_city: String,
    pub punctuality_pct: Option<f64>,
    pub deliveries_per_hour: Option<f64>,
    pub fuel_per_km: Option<f64>,
    pub score: f64,
    pub rank: u32,
}

/// Destination-city scoreboard across punctuality, throughput, and fuel
/// burn: `punctuality + 2*deliveries_per_hour - 100*fuel_per_km`. Every
/// destination with a trip in the window appears, ranked densely.
pub fn city_performance(extract: &Extract) -> Vec<CityPerformance> {
    let routes = route_index(extract);
    let trips = trip_index(extract);

    #[derive(Default)]
    struct CityAccum {
        delivered: u64,
        on_time: u64,
        completed_trips: u64,
        completed_deliveries: u64,
        hours: f64,
        fuel: f64,
        km: f64,
    }

    let mut cities: HashMap<&str, CityAccum> = HashMap::new();
    for trip in extract.trips() {
        let Some(route) = routes.get(&trip.route_id) else { continue };
        let entry = cities.entry(route.destination_city.as_str()).or_default();
        if trip.status == TripStatus::Completed {
            entry.completed_trips += 1;
            entry.hours += floored_hours(trip);
            if route.distance_km > 0.0 {
                entry.fuel += trip.fuel_consumed_l;
                entry.km += route.distance_km;
            }
        }
    }

    for delivery in extract.deliveries() {
        let Some(trip) = trips.get(&delivery.trip_id) else { continue };
        let Some(route) = routes.get(&trip.route_id) else { continue };
        let Some(entry) = cities.get_mut(route.destination_city.as_str()) else { continue };
        if let Some(on_time) = delivery.is_on_time() {
            entry.delivered += 1;
            if on_time {
                entry.on_time += 1;
            }
        }
        if trip.status == TripStatus::Completed {
            entry.completed_deliveries += 1;
        }
    }

    let mut rows: Vec<CityPerformance> = cities
        .into_iter()
        .map(|(city, acc)| {
            let punctuality_pct = (acc.delivered > 0)
                .then(|| acc.on_time as f64 / acc.delivered as f64 * 100.0);
            let deliveries_per_hour = (acc.completed_deliveries > 0 && acc.hours > 0.0)
                .then(|| acc.completed_deliveries as f64 / acc.hours);
            let fuel_per_km = if acc.km > 0.0 {
                Some(acc.fuel / acc.km)
            } else {
                if acc.completed_trips > 0 {
                    division_guard("city_fuel_per_km", city);
                }
                None
            };
            let score = round2(
                punctuality_pct.unwrap_or(0.0) + 2.0 * deliveries_per_hour.unwrap_or(0.0)
                    - 100.0 * fuel_per_km.unwrap_or(0.0),
            );
            CityPerformance {
                destination_city: city.to_string(),
                punctuality_pct: punctuality_pct.map(round2),
                deliveries_per_hour: deliveries_per_hour.map(round2),
                fuel_per_km: fuel_per_km.map(round2),
                score,
                rank: 0,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.destination_city.cmp(&b.destination_city))
    });
    assign_dense_ranks(&mut rows, |r| r.score, |r, rank| r.rank = rank);
    rows
}

/// Trip hours with the published floor applied.
fn floored_hours(trip: &Trip) -> f64 {
    trip.duration_hours()
        .map(|h| h.max(MIN_TRIP_HOURS))
        .unwrap_or(MIN_TRIP_HOURS)
}

fn route_index(extract: &Extract) -> HashMap<i64, &Route> {
    extract.routes().iter().map(|r| (r.id, r)).collect()
}

fn trip_index(extract: &Extract) -> HashMap<i64, &Trip> {
    extract.trips().iter().map(|t| (t.id, t)).collect()
}

fn deliveries_per_trip(extract: &Extract) -> HashMap<i64, u64> {
    let mut counts: HashMap<i64, u64> = HashMap::new();
    for delivery in extract.deliveries() {
        *counts.entry(delivery.trip_id).or_insert(0) += 1;
    }
    counts
}
