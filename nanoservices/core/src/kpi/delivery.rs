//! Delivery-grain fact derivation.
//!
//! Each windowed delivery joins its trip for the operational context the
//! fact table carries. Natural keys stay natural here; the loader swaps
//! them for dimension surrogates at write time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{division_guard, round2};
use crate::domain::DeliveryStatus;
use crate::sources::Extract;

/// Tariff placeholder: flat base plus a weight component, in COP.
pub const BASE_REVENUE_COP: f64 = 20_000.0;
pub const REVENUE_PER_KG_COP: f64 = 500.0;

/// One warehouse fact row before surrogate-key resolution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FactRowDraft {
    pub delivery_id: i64,
    pub trip_id: i64,
    pub vehicle_id: i64,
    pub driver_id: i64,
    pub route_id: i64,
    pub scheduled_ts: DateTime<Utc>,
    pub delivered_ts: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub on_time: Option<bool>,
    pub transit_hours: Option<f64>,
    pub fuel_per_km: Option<f64>,
    pub weight_kg: f64,
    pub revenue: f64,
}

/// A delivery that could not be tied to its trip. Reported, never loaded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrphanedDelivery {
    pub delivery_id: i64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct DeliveryTransform {
    pub rows: Vec<FactRowDraft>,
    pub orphans: Vec<OrphanedDelivery>,
}

pub fn derive_fact_rows(extract: &Extract) -> DeliveryTransform {
    let trips: HashMap<i64, _> = extract.trips().iter().map(|t| (t.id, t)).collect();
    let routes: HashMap<i64, _> = extract.routes().iter().map(|r| (r.id, r)).collect();

    let mut transform = DeliveryTransform::default();
    for delivery in extract.deliveries() {
        let Some(trip) = trips.get(&delivery.trip_id) else {
            transform.orphans.push(OrphanedDelivery {
                delivery_id: delivery.id,
                reason: format!("trip {} not in extract", delivery.trip_id),
            });
            continue;
        };

        // A missing route only costs the fuel ratio; surrogate resolution
        // will report the row if the dimension is genuinely absent.
        let fuel_per_km = match routes.get(&trip.route_id) {
            Some(route) if route.distance_km > 0.0 => {
                Some(round2(trip.fuel_consumed_l / route.distance_km))
            }
            Some(route) => {
                division_guard("delivery_fuel_per_km", &format!("route {}", route.id));
                None
            }
            None => None,
        };

        let transit_hours = delivery
            .delivered_ts
            .map(|ts| round2((ts - trip.departure_ts).num_seconds() as f64 / 3600.0));

        transform.rows.push(FactRowDraft {
            delivery_id: delivery.id,
            trip_id: trip.id,
            vehicle_id: trip.vehicle_id,
            driver_id: trip.driver_id,
            route_id: trip.route_id,
            scheduled_ts: delivery.scheduled_ts,
            delivered_ts: delivery.delivered_ts,
            status: delivery.status,
            on_time: delivery.is_on_time(),
            transit_hours,
            fuel_per_km,
            weight_kg: delivery.package_weight_kg,
            revenue: round2(BASE_REVENUE_COP + REVENUE_PER_KG_COP * delivery.package_weight_kg),
        });
    }
    transform
}
