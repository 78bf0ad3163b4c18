//! Idempotent delivery-grain fact loading.
//!
//! The loader works row by row: a delivery that cannot be resolved or
//! written is recorded and skipped, never aborting the rest of the batch.
//! Terminal facts (delivered, failed) are immutable once stored.

use chrono::{DateTime, Utc};
use fleetmetrics_utils::FleetResult;
use serde::Serialize;
use tokio::sync::Mutex;

use super::dimensions::DimensionKeys;
use super::store::{FactRecord, WarehouseStore};
use crate::kpi::delivery::{DeliveryTransform, FactRowDraft};

/// Rows written per store lock; the gaps between batches are the points
/// where a load timeout can cancel the phase.
const LOAD_BATCH: usize = 200;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedRow {
    pub delivery_id: i64,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct LoadReport {
    pub attempted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_terminal: usize,
    pub failed: Vec<FailedRow>,
}

impl LoadReport {
    pub fn rows_written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn failed_pct(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.failed.len() as f64 / self.attempted as f64 * 100.0
        }
    }
}

pub async fn load_facts(
    store: &Mutex<WarehouseStore>,
    transform: &DeliveryTransform,
    keys: &DimensionKeys,
    run_id: &str,
    loaded_at: DateTime<Utc>,
) -> FleetResult<LoadReport> {
    let mut report = LoadReport {
        attempted: transform.rows.len() + transform.orphans.len(),
        ..LoadReport::default()
    };

    // Transform-stage orphans already failed; carry them into the report.
    for orphan in &transform.orphans {
        report.failed.push(FailedRow {
            delivery_id: orphan.delivery_id,
            reason: orphan.reason.clone(),
        });
    }

    for chunk in transform.rows.chunks(LOAD_BATCH) {
        {
            let store = store.lock().await;
            for draft in chunk {
                load_one(&store, draft, keys, run_id, loaded_at, &mut report);
            }
        }
        // Let the surrounding timeout observe progress between batches.
        tokio::task::yield_now().await;
    }

    tracing::debug!(
        run = run_id,
        attempted = report.attempted,
        inserted = report.inserted,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped_terminal = report.skipped_terminal,
        failed = report.failed.len(),
        "fact load complete"
    );
    Ok(report)
}

fn load_one(
    store: &WarehouseStore,
    draft: &FactRowDraft,
    keys: &DimensionKeys,
    run_id: &str,
    loaded_at: DateTime<Utc>,
    report: &mut LoadReport,
) {
    let fail = |reason: String, report: &mut LoadReport| {
        report.failed.push(FailedRow { delivery_id: draft.delivery_id, reason });
    };

    let Some(vehicle_key) = keys.vehicles.get(&draft.vehicle_id).copied() else {
        return fail(format!("no dimension version for vehicle {}", draft.vehicle_id), report);
    };
    let Some(driver_key) = keys.drivers.get(&draft.driver_id).copied() else {
        return fail(format!("no dimension version for driver {}", draft.driver_id), report);
    };
    let Some(route_key) = keys.routes.get(&draft.route_id).copied() else {
        return fail(format!("no dimension version for route {}", draft.route_id), report);
    };

    let incoming = FactRecord {
        delivery_id: draft.delivery_id,
        trip_id: draft.trip_id,
        vehicle_key,
        driver_key,
        route_key,
        scheduled_ts: draft.scheduled_ts,
        delivered_ts: draft.delivered_ts,
        status: draft.status,
        on_time: draft.on_time,
        transit_hours: draft.transit_hours,
        fuel_per_km: draft.fuel_per_km,
        weight_kg: draft.weight_kg,
        revenue: draft.revenue,
    };

    let existing = match store.fact_record(draft.delivery_id) {
        Ok(existing) => existing,
        Err(e) => return fail(e.to_string(), report),
    };

    match existing {
        None => match store.insert_fact(&incoming, run_id, loaded_at) {
            Ok(()) => report.inserted += 1,
            Err(e) => fail(e.to_string(), report),
        },
        Some(current) if current.status.is_terminal() => {
            report.skipped_terminal += 1;
        }
        Some(current) if current == incoming => {
            report.unchanged += 1;
        }
        Some(_) => match store.update_fact(&incoming, run_id, loaded_at) {
            Ok(()) => report.updated += 1,
            Err(e) => fail(e.to_string(), report),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryStatus, DriverStatus, TripStatus, VehicleStatus};
    use crate::kpi::delivery::derive_fact_rows;
    use crate::kpi::fixtures::*;
    use crate::warehouse::dimensions::reconcile_dimensions;

    fn base_builder() -> ExtractBuilder {
        ExtractBuilder::new()
            .vehicle(1, "AAA-111", "van", VehicleStatus::Active)
            .driver(1, "Ana", "L1", date(2027, 1, 1), DriverStatus::Active)
            .route(1, "R1", "Bogota", "Cali", 460.0)
            .trip(10, 1, 1, 1, ts(2026, 3, 5, 8, 0), Some(ts(2026, 3, 5, 18, 0)), 90.0, TripStatus::Completed)
    }

    async fn run_load(
        store: &Mutex<WarehouseStore>,
        extract: &crate::sources::Extract,
        run_id: &str,
    ) -> LoadReport {
        let transform = derive_fact_rows(extract);
        let keys = {
            let guard = store.lock().await;
            reconcile_dimensions(&guard, extract, extract.window().end).unwrap()
        };
        load_facts(store, &transform, &keys, run_id, extract.window().end)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn loads_resolved_rows_and_reports_counts() {
        let store = Mutex::new(WarehouseStore::in_memory().unwrap());
        let extract = base_builder()
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), Some(ts(2026, 3, 5, 11, 0)), 10.0, DeliveryStatus::Delivered)
            .delivery(101, 10, ts(2026, 3, 5, 13, 0), None, 4.0, DeliveryStatus::Pending)
            .build();

        let report = run_load(&store, &extract, "run-1").await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.inserted, 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.failed_pct(), 0.0);

        let guard = store.lock().await;
        let rows = guard.fact_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].delivery_id, 100);
        assert_eq!(rows[0].on_time, Some(true));
    }

    #[tokio::test]
    async fn replaying_a_window_changes_nothing() {
        let store = Mutex::new(WarehouseStore::in_memory().unwrap());
        let extract = base_builder()
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), Some(ts(2026, 3, 5, 11, 0)), 10.0, DeliveryStatus::Delivered)
            .delivery(101, 10, ts(2026, 3, 5, 13, 0), None, 4.0, DeliveryStatus::Pending)
            .build();

        let first = run_load(&store, &extract, "run-1").await;
        assert_eq!(first.inserted, 2);
        let before = store.lock().await.fact_rows().unwrap();

        let second = run_load(&store, &extract, "run-2").await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        // delivery 100 is terminal, delivery 101 is byte-for-byte identical
        assert_eq!(second.skipped_terminal, 1);
        assert_eq!(second.unchanged, 1);

        let after = store.lock().await.fact_rows().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn open_rows_update_and_terminal_rows_freeze() {
        let store = Mutex::new(WarehouseStore::in_memory().unwrap());
        let pending = base_builder()
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), None, 10.0, DeliveryStatus::InTransit)
            .build();
        run_load(&store, &pending, "run-1").await;

        // the delivery completes in a later window
        let delivered = base_builder()
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), Some(ts(2026, 3, 5, 11, 30)), 10.0, DeliveryStatus::Delivered)
            .build();
        let second = run_load(&store, &delivered, "run-2").await;
        assert_eq!(second.updated, 1);

        // a contradictory later restatement bounces off the terminal row
        let restated = base_builder()
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), Some(ts(2026, 3, 5, 23, 0)), 10.0, DeliveryStatus::Delivered)
            .build();
        let third = run_load(&store, &restated, "run-3").await;
        assert_eq!(third.skipped_terminal, 1);
        assert_eq!(third.updated, 0);

        let guard = store.lock().await;
        let row = guard.fact_record(100).unwrap().unwrap();
        assert_eq!(row.delivered_ts, Some(ts(2026, 3, 5, 11, 30)));
        assert_eq!(row.on_time, Some(true));
    }

    #[tokio::test]
    async fn unresolved_dimension_fails_the_row_not_the_run() {
        let store = Mutex::new(WarehouseStore::in_memory().unwrap());
        // trip 11 references vehicle 99, which is not in the snapshot
        let extract = base_builder()
            .trip(11, 99, 1, 1, ts(2026, 3, 6, 8, 0), Some(ts(2026, 3, 6, 18, 0)), 90.0, TripStatus::Completed)
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), None, 10.0, DeliveryStatus::Pending)
            .delivery(101, 11, ts(2026, 3, 6, 12, 0), None, 5.0, DeliveryStatus::Pending)
            .build();

        let report = run_load(&store, &extract, "run-1").await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].delivery_id, 101);
        assert!(report.failed[0].reason.contains("vehicle 99"));
        assert_eq!(report.failed_pct(), 50.0);
    }

    #[tokio::test]
    async fn transform_orphans_count_as_failures() {
        let store = Mutex::new(WarehouseStore::in_memory().unwrap());
        let extract = base_builder()
            .delivery(100, 10, ts(2026, 3, 5, 12, 0), None, 10.0, DeliveryStatus::Pending)
            // trip 999 was never extracted
            .delivery(101, 999, ts(2026, 3, 6, 12, 0), None, 5.0, DeliveryStatus::Pending)
            .build();

        let report = run_load(&store, &extract, "run-1").await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("trip 999"));
    }
}
