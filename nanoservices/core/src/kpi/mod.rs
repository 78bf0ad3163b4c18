//! The twelve operational measures derived from one extract.
//!
//! Every measure is a pure function of the [`Extract`]; they touch no
//! database and can run in any order, so the report fans them out as
//! separate tasks and joins the results.

pub mod delivery;
pub mod fleet;
pub mod service;
pub mod throughput;

use std::cmp::Ordering;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::sources::Extract;

/// Published floor for trip duration; keeps throughput ratios finite for
/// instantaneous or clock-skewed trips.
pub const MIN_TRIP_HOURS: f64 = 0.1;

/// Knobs the measures take from configuration.
#[derive(Clone, Copy, Debug)]
pub struct KpiSettings {
    pub license_horizon_days: u32,
}

impl Default for KpiSettings {
    fn default() -> Self {
        KpiSettings { license_horizon_days: 30 }
    }
}

/// One run's full derivation output, in fixed measure order.
#[derive(Clone, Debug, Serialize)]
pub struct KpiReport {
    pub vehicle_maintenance: Vec<fleet::VehicleMaintenanceRecency>,
    pub expiring_licenses: Vec<fleet::ExpiringLicense>,
    pub delivery_status_mix: Vec<service::StatusShare>,
    pub route_delivery_averages: Vec<throughput::RouteDeliveryAverage>,
    pub driver_delivery_averages: Vec<throughput::DriverDeliveryAverage>,
    pub fuel_by_vehicle_type: Vec<fleet::FuelByVehicleType>,
    pub top_routes_by_throughput: Vec<throughput::RouteThroughput>,
    pub monthly_punctuality: Vec<service::MonthlyPunctuality>,
    pub maintenance_cost_per_km: Vec<fleet::VehicleMaintenanceCost>,
    pub driver_efficiency: Vec<throughput::DriverEfficiency>,
    pub delivery_hour_histogram: Vec<service::HourBucket>,
    pub city_performance: Vec<throughput::CityPerformance>,
}

impl KpiReport {
    /// Derive all twelve measures concurrently over a shared extract.
    pub async fn compute(extract: &Extract, settings: KpiSettings) -> KpiReport {
        let horizon = settings.license_horizon_days;

        let vehicle_maintenance = spawn_measure(extract, fleet::vehicle_maintenance_recency);
        let expiring_licenses =
            spawn_measure(extract, move |ex| fleet::expiring_licenses(ex, horizon));
        let delivery_status_mix = spawn_measure(extract, service::delivery_status_mix);
        let route_delivery_averages = spawn_measure(extract, throughput::route_delivery_averages);
        let driver_delivery_averages = spawn_measure(extract, throughput::driver_delivery_averages);
        let fuel_by_vehicle_type = spawn_measure(extract, fleet::fuel_by_vehicle_type);
        let top_routes_by_throughput = spawn_measure(extract, throughput::top_routes_by_throughput);
        let monthly_punctuality = spawn_measure(extract, service::monthly_punctuality);
        let maintenance_cost_per_km = spawn_measure(extract, fleet::maintenance_cost_per_km);
        let driver_efficiency = spawn_measure(extract, throughput::driver_efficiency);
        let delivery_hour_histogram = spawn_measure(extract, service::delivery_hour_histogram);
        let city_performance = spawn_measure(extract, throughput::city_performance);

        KpiReport {
            vehicle_maintenance: finish(vehicle_maintenance).await,
            expiring_licenses: finish(expiring_licenses).await,
            delivery_status_mix: finish(delivery_status_mix).await,
            route_delivery_averages: finish(route_delivery_averages).await,
            driver_delivery_averages: finish(driver_delivery_averages).await,
            fuel_by_vehicle_type: finish(fuel_by_vehicle_type).await,
            top_routes_by_throughput: finish(top_routes_by_throughput).await,
            monthly_punctuality: finish(monthly_punctuality).await,
            maintenance_cost_per_km: finish(maintenance_cost_per_km).await,
            driver_efficiency: finish(driver_efficiency).await,
            delivery_hour_histogram: finish(delivery_hour_histogram).await,
            city_performance: finish(city_performance).await,
        }
    }
}

fn spawn_measure<T, F>(extract: &Extract, measure: F) -> JoinHandle<T>
where
    F: FnOnce(&Extract) -> T + Send + 'static,
    T: Send + 'static,
{
    let extract = extract.clone();
    tokio::spawn(async move { measure(&extract) })
}

async fn finish<T>(handle: JoinHandle<T>) -> T {
    handle.await.expect("derivation task panicked")
}

/// Half-up rounding to two decimals; the contract for every published
/// percentage, ratio, and score.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn share_pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

/// Descending order with missing values sorted to the end.
pub(crate) fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Dense competition ranking over rows already sorted by descending score:
/// equal (rounded) scores share a rank and no rank is skipped after a tie.
pub(crate) fn assign_dense_ranks<T>(
    rows: &mut [T],
    score_of: impl Fn(&T) -> f64,
    mut set_rank: impl FnMut(&mut T, u32),
) {
    let mut rank = 0u32;
    let mut previous: Option<f64> = None;
    for row in rows.iter_mut() {
        let score = score_of(row);
        if previous != Some(score) {
            rank += 1;
            previous = Some(score);
        }
        set_rank(row, rank);
    }
}

/// A ratio was skipped because its divisor is zero. Informational only;
/// the affected output stays null.
pub(crate) fn division_guard(measure: &'static str, detail: &str) {
    crate::metrics::inc_division_guard(measure);
    tracing::debug!(measure, detail, "zero divisor, ratio omitted");
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use fleetmetrics_utils::Window;

    use crate::domain::*;
    use crate::sources::{Extract, RowSet};

    pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    pub fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    /// March 2026 window; reference instant is April 1st.
    pub fn march_window() -> Window {
        Window::new(ts(2026, 3, 1, 0, 0), ts(2026, 4, 1, 0, 0)).unwrap()
    }

    pub struct ExtractBuilder {
        window: Window,
        rows: RowSet,
    }

    impl ExtractBuilder {
        pub fn new() -> Self {
            ExtractBuilder { window: march_window(), rows: RowSet::default() }
        }

        pub fn window(mut self, window: Window) -> Self {
            self.window = window;
            self
        }

        pub fn vehicle(mut self, id: i64, plate: &str, vtype: &str, status: VehicleStatus) -> Self {
            self.rows.vehicles.push(Vehicle {
                id,
                plate: plate.into(),
                vehicle_type: vtype.into(),
                status,
            });
            self
        }

        pub fn driver(
            mut self,
            id: i64,
            name: &str,
            license: &str,
            expiry: NaiveDate,
            status: DriverStatus,
        ) -> Self {
            self.rows.drivers.push(Driver {
                id,
                name: name.into(),
                license_number: license.into(),
                license_expiry: expiry,
                status,
            });
            self
        }

        pub fn route(mut self, id: i64, code: &str, origin: &str, dest: &str, km: f64) -> Self {
            self.rows.routes.push(Route {
                id,
                code: code.into(),
                origin_city: origin.into(),
                destination_city: dest.into(),
                distance_km: km,
            });
            self
        }

        #[allow(clippy::too_many_arguments)]
        pub fn trip(
            mut self,
            id: i64,
            vehicle_id: i64,
            driver_id: i64,
            route_id: i64,
            departure: DateTime<Utc>,
            arrival: Option<DateTime<Utc>>,
            fuel_l: f64,
            status: TripStatus,
        ) -> Self {
            self.rows.trips.push(Trip {
                id,
                vehicle_id,
                driver_id,
                route_id,
                departure_ts: departure,
                arrival_ts: arrival,
                fuel_consumed_l: fuel_l,
                status,
            });
            self
        }

        pub fn delivery(
            mut self,
            id: i64,
            trip_id: i64,
            scheduled: DateTime<Utc>,
            delivered: Option<DateTime<Utc>>,
            kg: f64,
            status: DeliveryStatus,
        ) -> Self {
            self.rows.deliveries.push(Delivery {
                id,
                trip_id,
                scheduled_ts: scheduled,
                delivered_ts: delivered,
                package_weight_kg: kg,
                status,
            });
            self
        }

        pub fn maintenance(mut self, id: i64, vehicle_id: i64, day: NaiveDate, cost: f64) -> Self {
            self.rows.maintenance.push(Maintenance {
                id,
                vehicle_id,
                maintenance_date: day,
                cost,
            });
            self
        }

        pub fn build(self) -> Extract {
            Extract::new(self.window, self.rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::domain::*;

    #[test]
    fn rounding_is_half_up_at_two_decimals() {
        assert_eq!(round2(66.666666), 66.67);
        assert_eq!(round2(2.345), 2.35);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn share_of_zero_whole_is_zero_not_nan() {
        assert_eq!(share_pct(0, 0), 0.0);
        assert_eq!(share_pct(2, 3), 66.67);
    }

    #[test]
    fn dense_ranks_share_on_ties_and_never_skip() {
        let mut rows = vec![(1i64, 90.0, 0u32), (2, 85.5, 0), (3, 85.5, 0), (4, 70.0, 0)];
        assign_dense_ranks(&mut rows, |r| r.1, |r, rank| r.2 = rank);
        let ranks: Vec<u32> = rows.iter().map(|r| r.2).collect();
        assert_eq!(ranks, vec![1, 2, 2, 3]);
    }

    #[test]
    fn nulls_sort_after_values() {
        let mut values = vec![None, Some(1.0), Some(3.0), None, Some(2.0)];
        values.sort_by(|a, b| desc_nulls_last(*a, *b));
        assert_eq!(values, vec![Some(3.0), Some(2.0), Some(1.0), None, None]);
    }

    #[tokio::test]
    async fn report_covers_all_measures() {
        let extract = ExtractBuilder::new()
            .vehicle(1, "ABC-123", "van", VehicleStatus::Active)
            .driver(1, "Ana Torres", "LIC-001", date(2026, 4, 20), DriverStatus::Active)
            .route(1, "BOG-MED", "Bogota", "Medellin", 415.0)
            .trip(
                10,
                1,
                1,
                1,
                ts(2026, 3, 10, 8, 0),
                Some(ts(2026, 3, 10, 14, 0)),
                80.0,
                TripStatus::Completed,
            )
            .delivery(
                100,
                10,
                ts(2026, 3, 10, 12, 0),
                Some(ts(2026, 3, 10, 11, 30)),
                20.0,
                DeliveryStatus::Delivered,
            )
            .maintenance(1000, 1, date(2026, 3, 5), 250000.0)
            .build();

        let report = KpiReport::compute(&extract, KpiSettings::default()).await;

        assert_eq!(report.vehicle_maintenance.len(), 1);
        assert_eq!(report.expiring_licenses.len(), 1);
        assert_eq!(report.delivery_status_mix.len(), 1);
        assert_eq!(report.route_delivery_averages.len(), 1);
        assert_eq!(report.driver_delivery_averages.len(), 1);
        assert_eq!(report.fuel_by_vehicle_type.len(), 1);
        assert_eq!(report.top_routes_by_throughput.len(), 1);
        assert_eq!(report.monthly_punctuality.len(), 12);
        assert_eq!(report.maintenance_cost_per_km.len(), 1);
        assert_eq!(report.driver_efficiency.len(), 1);
        assert_eq!(report.delivery_hour_histogram.len(), 12);
        assert_eq!(report.city_performance.len(), 1);
    }
}
