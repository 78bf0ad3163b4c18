//! Shared fixtures for the end-to-end tests: a transactional SQLite file
//! the tests mutate between runs, and a config pointing the engine at it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use fleetmetrics_core::config::{EtlConfig, ExtractionConfig, KpiConfig, LoadConfig};

pub const SOURCE_DDL: &str = "
    CREATE TABLE vehicles (
        vehicle_id INTEGER PRIMARY KEY,
        plate TEXT NOT NULL,
        vehicle_type TEXT NOT NULL,
        status TEXT NOT NULL
    );
    CREATE TABLE drivers (
        driver_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        license_number TEXT NOT NULL,
        license_expiry TEXT NOT NULL,
        status TEXT NOT NULL
    );
    CREATE TABLE routes (
        route_id INTEGER PRIMARY KEY,
        code TEXT NOT NULL,
        origin_city TEXT NOT NULL,
        destination_city TEXT NOT NULL,
        distance_km REAL NOT NULL
    );
    CREATE TABLE trips (
        trip_id INTEGER PRIMARY KEY,
        vehicle_id INTEGER NOT NULL,
        driver_id INTEGER NOT NULL,
        route_id INTEGER NOT NULL,
        departure_ts TEXT NOT NULL,
        arrival_ts TEXT,
        fuel_consumed_l REAL NOT NULL,
        status TEXT NOT NULL
    );
    CREATE TABLE deliveries (
        delivery_id INTEGER PRIMARY KEY,
        trip_id INTEGER NOT NULL,
        scheduled_ts TEXT NOT NULL,
        delivered_ts TEXT,
        package_weight_kg REAL NOT NULL,
        status TEXT NOT NULL
    );
    CREATE TABLE maintenance (
        maintenance_id INTEGER PRIMARY KEY,
        vehicle_id INTEGER NOT NULL,
        maintenance_date TEXT NOT NULL,
        cost REAL NOT NULL
    );
";

pub fn ts(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

/// Handle on the operational database. Each statement opens a fresh
/// connection so the engine's read-only connections never see a stale
/// handle.
pub struct SourceDb {
    pub path: PathBuf,
}

impl SourceDb {
    pub fn create(dir: &Path) -> Self {
        let path = dir.join("fleetlogix.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SOURCE_DDL).unwrap();
        SourceDb { path }
    }

    pub fn execute(&self, sql: &str) {
        let conn = Connection::open(&self.path).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    /// Two vehicles, one driver, one route, three March trips carrying
    /// three deliveries, two maintenance visits. Everything predates
    /// 2026-03-16, so a window ending there captures the whole seed.
    pub fn seed_march_fleet(&self) {
        self.execute(
            "INSERT INTO vehicles VALUES (1, 'FLT-100', 'large_truck', 'active');
             INSERT INTO vehicles VALUES (2, 'FLT-200', 'van', 'active');
             INSERT INTO drivers VALUES (1, 'Ana Torres', 'LIC-001', '2027-01-15', 'active');
             INSERT INTO routes VALUES (1, 'BOG-MED', 'Bogota', 'Medellin', 415.0);
             INSERT INTO trips VALUES (10, 1, 1, 1, '2026-03-15T08:00:00+00:00', '2026-03-15T14:00:00+00:00', 80.0, 'completed');
             INSERT INTO trips VALUES (11, 2, 1, 1, '2026-03-14T20:00:00+00:00', '2026-03-15T02:00:00+00:00', 60.0, 'completed');
             INSERT INTO trips VALUES (12, 1, 1, 1, '2026-03-10T08:00:00+00:00', NULL, 10.0, 'in_progress');
             INSERT INTO deliveries VALUES (100, 10, '2026-03-15T12:00:00+00:00', '2026-03-15T11:30:00+00:00', 20.0, 'delivered');
             INSERT INTO deliveries VALUES (101, 11, '2026-03-15T01:00:00+00:00', '2026-03-15T00:45:00+00:00', 5.0, 'delivered');
             INSERT INTO deliveries VALUES (102, 12, '2026-03-10T09:00:00+00:00', NULL, 9.0, 'pending');
             INSERT INTO maintenance VALUES (1000, 1, '2026-03-15', 350000.0);
             INSERT INTO maintenance VALUES (1001, 1, '2026-03-10', 120000.0);",
        );
    }
}

/// Config with a pinned initial watermark so the first window is
/// deterministic, and no extraction retries so failures surface at once.
pub fn engine_config(source: &SourceDb, warehouse: &Path) -> EtlConfig {
    EtlConfig {
        source_db: source.path.display().to_string(),
        warehouse_db: Some(warehouse.display().to_string()),
        interval_secs: 3600,
        initial_watermark: Some(ts(2026, 3, 1, 0, 0)),
        extraction: ExtractionConfig { retries: 0, retry_delay_secs: 0 },
        load: LoadConfig::default(),
        kpi: KpiConfig::default(),
    }
}
