use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::domain::{DeliveryStatus, Driver, DriverStatus, Route, Vehicle, VehicleStatus};

/// SQLite-backed warehouse: the run ledger, the three type-2 dimensions,
/// and the delivery fact table.
pub struct WarehouseStore {
    conn: Connection,
}

impl WarehouseStore {
    /// Open or create the warehouse database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory warehouse (for testing).
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // AUTOINCREMENT keeps surrogate keys monotonic and never reused,
        // even after deletes.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS etl_runs (
                run_id TEXT PRIMARY KEY,
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                status TEXT NOT NULL,
                rows_extracted INTEGER NOT NULL DEFAULT 0,
                rows_loaded INTEGER NOT NULL DEFAULT 0,
                error_detail TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_etl_runs_status ON etl_runs(status);
            CREATE INDEX IF NOT EXISTS idx_etl_runs_window_end ON etl_runs(window_end);

            CREATE TABLE IF NOT EXISTS dim_vehicle (
                vehicle_key INTEGER PRIMARY KEY AUTOINCREMENT,
                vehicle_id INTEGER NOT NULL,
                plate TEXT NOT NULL,
                vehicle_type TEXT NOT NULL,
                status TEXT NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT,
                is_current INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_dim_vehicle_natural ON dim_vehicle(vehicle_id, is_current);

            CREATE TABLE IF NOT EXISTS dim_driver (
                driver_key INTEGER PRIMARY KEY AUTOINCREMENT,
                driver_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                license_number TEXT NOT NULL,
                license_expiry TEXT NOT NULL,
                status TEXT NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT,
                is_current INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_dim_driver_natural ON dim_driver(driver_id, is_current);

            CREATE TABLE IF NOT EXISTS dim_route (
                route_key INTEGER PRIMARY KEY AUTOINCREMENT,
                route_id INTEGER NOT NULL,
                code TEXT NOT NULL,
                origin_city TEXT NOT NULL,
                destination_city TEXT NOT NULL,
                distance_km REAL NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT,
                is_current INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_dim_route_natural ON dim_route(route_id, is_current);

            CREATE TABLE IF NOT EXISTS fact_deliveries (
                delivery_id INTEGER PRIMARY KEY,
                trip_id INTEGER NOT NULL,
                vehicle_key INTEGER NOT NULL REFERENCES dim_vehicle(vehicle_key),
                driver_key INTEGER NOT NULL REFERENCES dim_driver(driver_key),
                route_key INTEGER NOT NULL REFERENCES dim_route(route_key),
                scheduled_ts TEXT NOT NULL,
                delivered_ts TEXT,
                status TEXT NOT NULL,
                on_time INTEGER,
                transit_hours REAL,
                fuel_per_km REAL,
                weight_kg REAL NOT NULL,
                revenue REAL NOT NULL,
                loaded_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by_run TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fact_deliveries_route ON fact_deliveries(route_key);",
        )?;
        Ok(())
    }

    // ---- run ledger ----

    /// Admit a new run in the pending state.
    pub fn insert_run(
        &self,
        run_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO etl_runs (run_id, window_start, window_end, status, started_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![run_id, window_start, window_end, started_at],
        )?;
        Ok(())
    }

    /// Record a phase advance so operators can see where a run is.
    pub fn set_run_phase(&self, run_id: &str, phase: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE etl_runs SET status = ?2 WHERE run_id = ?1",
            params![run_id, phase],
        )?;
        Ok(())
    }

    pub fn record_rows_extracted(&self, run_id: &str, rows: i64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE etl_runs SET rows_extracted = ?2 WHERE run_id = ?1",
            params![run_id, rows],
        )?;
        Ok(())
    }

    /// Close a run. Only a 'committed' status here advances the watermark.
    pub fn finalize_run(
        &self,
        run_id: &str,
        status: &str,
        rows_loaded: i64,
        error_detail: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE etl_runs SET status = ?2, rows_loaded = ?3, error_detail = ?4, finished_at = ?5
             WHERE run_id = ?1",
            params![run_id, status, rows_loaded, error_detail, finished_at],
        )?;
        Ok(())
    }

    /// Fail every run left in a non-terminal state by a previous process.
    pub fn mark_stale_runs_failed(&self, finished_at: DateTime<Utc>) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "UPDATE etl_runs
             SET status = 'failed', error_detail = 'interrupted by restart', finished_at = ?1
             WHERE status NOT IN ('committed', 'failed')",
            params![finished_at],
        )
    }

    /// Window end of the most recent committed run, if any.
    pub fn last_watermark(&self) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
        self.conn.query_row(
            "SELECT MAX(window_end) FROM etl_runs WHERE status = 'committed'",
            [],
            |row| row.get(0),
        )
    }

    pub fn run_record(&self, run_id: &str) -> Result<Option<RunRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT run_id, window_start, window_end, status, rows_extracted, rows_loaded,
                        error_detail, started_at, finished_at
                 FROM etl_runs WHERE run_id = ?1",
                params![run_id],
                map_run_record,
            )
            .optional()
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, window_start, window_end, status, rows_extracted, rows_loaded,
                    error_detail, started_at, finished_at
             FROM etl_runs ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], map_run_record)?;
        rows.collect()
    }

    // ---- dimensions ----

    pub fn current_vehicle_version(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<DimVehicleVersion>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT vehicle_key, vehicle_id, plate, vehicle_type, status, valid_from, valid_to, is_current
                 FROM dim_vehicle WHERE vehicle_id = ?1 AND is_current = 1",
                params![vehicle_id],
                map_vehicle_version,
            )
            .optional()
    }

    pub fn insert_vehicle_version(
        &self,
        vehicle: &Vehicle,
        valid_from: DateTime<Utc>,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO dim_vehicle (vehicle_id, plate, vehicle_type, status, valid_from, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![vehicle.id, vehicle.plate, vehicle.vehicle_type, vehicle.status, valid_from],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn current_driver_version(
        &self,
        driver_id: i64,
    ) -> Result<Option<DimDriverVersion>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT driver_key, driver_id, name, license_number, license_expiry, status,
                        valid_from, valid_to, is_current
                 FROM dim_driver WHERE driver_id = ?1 AND is_current = 1",
                params![driver_id],
                map_driver_version,
            )
            .optional()
    }

    pub fn insert_driver_version(
        &self,
        driver: &Driver,
        valid_from: DateTime<Utc>,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO dim_driver (driver_id, name, license_number, license_expiry, status, valid_from, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                driver.id,
                driver.name,
                driver.license_number,
                driver.license_expiry,
                driver.status,
                valid_from
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn current_route_version(
        &self,
        route_id: i64,
    ) -> Result<Option<DimRouteVersion>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT route_key, route_id, code, origin_city, destination_city, distance_km,
                        valid_from, valid_to, is_current
                 FROM dim_route WHERE route_id = ?1 AND is_current = 1",
                params![route_id],
                map_route_version,
            )
            .optional()
    }

    pub fn insert_route_version(
        &self,
        route: &Route,
        valid_from: DateTime<Utc>,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO dim_route (route_id, code, origin_city, destination_city, distance_km, valid_from, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                route.id,
                route.code,
                route.origin_city,
                route.destination_city,
                route.distance_km,
                valid_from
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Close a current dimension version; the row stays for history.
    pub fn close_dimension_version(
        &self,
        table: Dimension,
        surrogate_key: i64,
        valid_to: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!(
                "UPDATE {table} SET valid_to = ?2, is_current = 0 WHERE {key} = ?1",
                table = table.table(),
                key = table.key_column(),
            ),
            params![surrogate_key, valid_to],
        )?;
        Ok(())
    }

    pub fn vehicle_history(&self, vehicle_id: i64) -> Result<Vec<DimVehicleVersion>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT vehicle_key, vehicle_id, plate, vehicle_type, status, valid_from, valid_to, is_current
             FROM dim_vehicle WHERE vehicle_id = ?1 ORDER BY vehicle_key",
        )?;
        let rows = stmt.query_map(params![vehicle_id], map_vehicle_version)?;
        rows.collect()
    }

    pub fn driver_history(&self, driver_id: i64) -> Result<Vec<DimDriverVersion>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT driver_key, driver_id, name, license_number, license_expiry, status,
                    valid_from, valid_to, is_current
             FROM dim_driver WHERE driver_id = ?1 ORDER BY driver_key",
        )?;
        let rows = stmt.query_map(params![driver_id], map_driver_version)?;
        rows.collect()
    }

    pub fn route_history(&self, route_id: i64) -> Result<Vec<DimRouteVersion>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT route_key, route_id, code, origin_city, destination_city, distance_km,
                    valid_from, valid_to, is_current
             FROM dim_route WHERE route_id = ?1 ORDER BY route_key",
        )?;
        let rows = stmt.query_map(params![route_id], map_route_version)?;
        rows.collect()
    }

    // ---- facts ----

    pub fn fact_record(&self, delivery_id: i64) -> Result<Option<FactRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT delivery_id, trip_id, vehicle_key, driver_key, route_key, scheduled_ts,
                        delivered_ts, status, on_time, transit_hours, fuel_per_km, weight_kg, revenue
                 FROM fact_deliveries WHERE delivery_id = ?1",
                params![delivery_id],
                map_fact_record,
            )
            .optional()
    }

    pub fn insert_fact(
        &self,
        fact: &FactRecord,
        run_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO fact_deliveries (delivery_id, trip_id, vehicle_key, driver_key, route_key,
                    scheduled_ts, delivered_ts, status, on_time, transit_hours, fuel_per_km,
                    weight_kg, revenue, loaded_at, updated_at, updated_by_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, ?15)",
            params![
                fact.delivery_id,
                fact.trip_id,
                fact.vehicle_key,
                fact.driver_key,
                fact.route_key,
                fact.scheduled_ts,
                fact.delivered_ts,
                fact.status,
                fact.on_time,
                fact.transit_hours,
                fact.fuel_per_km,
                fact.weight_kg,
                fact.revenue,
                now,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn update_fact(
        &self,
        fact: &FactRecord,
        run_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE fact_deliveries
             SET trip_id = ?2, vehicle_key = ?3, driver_key = ?4, route_key = ?5, scheduled_ts = ?6,
                 delivered_ts = ?7, status = ?8, on_time = ?9, transit_hours = ?10,
                 fuel_per_km = ?11, weight_kg = ?12, revenue = ?13, updated_at = ?14,
                 updated_by_run = ?15
             WHERE delivery_id = ?1",
            params![
                fact.delivery_id,
                fact.trip_id,
                fact.vehicle_key,
                fact.driver_key,
                fact.route_key,
                fact.scheduled_ts,
                fact.delivered_ts,
                fact.status,
                fact.on_time,
                fact.transit_hours,
                fact.fuel_per_km,
                fact.weight_kg,
                fact.revenue,
                now,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn fact_rows(&self) -> Result<Vec<FactRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT delivery_id, trip_id, vehicle_key, driver_key, route_key, scheduled_ts,
                    delivered_ts, status, on_time, transit_hours, fuel_per_km, weight_kg, revenue
             FROM fact_deliveries ORDER BY delivery_id",
        )?;
        let rows = stmt.query_map([], map_fact_record)?;
        rows.collect()
    }

    pub fn fact_count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM fact_deliveries", [], |row| row.get(0))
    }
}

/// The three conformed dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    Vehicle,
    Driver,
    Route,
}

impl Dimension {
    fn table(&self) -> &'static str {
        match self {
            Dimension::Vehicle => "dim_vehicle",
            Dimension::Driver => "dim_driver",
            Dimension::Route => "dim_route",
        }
    }

    fn key_column(&self) -> &'static str {
        match self {
            Dimension::Vehicle => "vehicle_key",
            Dimension::Driver => "driver_key",
            Dimension::Route => "route_key",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: String,
    pub rows_extracted: i64,
    pub rows_loaded: i64,
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimVehicleVersion {
    pub vehicle_key: i64,
    pub vehicle_id: i64,
    pub plate: String,
    pub vehicle_type: String,
    pub status: VehicleStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimDriverVersion {
    pub driver_key: i64,
    pub driver_id: i64,
    pub name: String,
    pub license_number: String,
    pub license_expiry: NaiveDate,
    pub status: DriverStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimRouteVersion {
    pub route_key: i64,
    pub route_id: i64,
    pub code: String,
    pub origin_city: String,
    pub destination_city: String,
    pub distance_km: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactRecord {
    pub delivery_id: i64,
    pub trip_id: i64,
    pub vehicle_key: i64,
    pub driver_key: i64,
    pub route_key: i64,
    pub scheduled_ts: DateTime<Utc>,
    pub delivered_ts: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub on_time: Option<bool>,
    pub transit_hours: Option<f64>,
    pub fuel_per_km: Option<f64>,
    pub weight_kg: f64,
    pub revenue: f64,
}

fn map_run_record(row: &rusqlite::Row<'_>) -> Result<RunRecord, rusqlite::Error> {
    Ok(RunRecord {
        run_id: row.get(0)?,
        window_start: row.get(1)?,
        window_end: row.get(2)?,
        status: row.get(3)?,
        rows_extracted: row.get(4)?,
        rows_loaded: row.get(5)?,
        error_detail: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
    })
}

fn map_vehicle_version(row: &rusqlite::Row<'_>) -> Result<DimVehicleVersion, rusqlite::Error> {
    Ok(DimVehicleVersion {
        vehicle_key: row.get(0)?,
        vehicle_id: row.get(1)?,
        plate: row.get(2)?,
        vehicle_type: row.get(3)?,
        status: row.get(4)?,
        valid_from: row.get(5)?,
        valid_to: row.get(6)?,
        is_current: row.get(7)?,
    })
}

fn map_driver_version(row: &rusqlite::Row<'_>) -> Result<DimDriverVersion, rusqlite::Error> {
    Ok(DimDriverVersion {
        driver_key: row.get(0)?,
        driver_id: row.get(1)?,
        name: row.get(2)?,
        license_number: row.get(3)?,
        license_expiry: row.get(4)?,
        status: row.get(5)?,
        valid_from: row.get(6)?,
        valid_to: row.get(7)?,
        is_current: row.get(8)?,
    })
}

fn map_route_version(row: &rusqlite::Row<'_>) -> Result<DimRouteVersion, rusqlite::Error> {
    Ok(DimRouteVersion {
        route_key: row.get(0)?,
        route_id: row.get(1)?,
        code: row.get(2)?,
        origin_city: row.get(3)?,
        destination_city: row.get(4)?,
        distance_km: row.get(5)?,
        valid_from: row.get(6)?,
        valid_to: row.get(7)?,
        is_current: row.get(8)?,
    })
}

fn map_fact_record(row: &rusqlite::Row<'_>) -> Result<FactRecord, rusqlite::Error> {
    Ok(FactRecord {
        delivery_id: row.get(0)?,
        trip_id: row.get(1)?,
        vehicle_key: row.get(2)?,
        driver_key: row.get(3)?,
        route_key: row.get(4)?,
        scheduled_ts: row.get(5)?,
        delivered_ts: row.get(6)?,
        status: row.get(7)?,
        on_time: row.get(8)?,
        transit_hours: row.get(9)?,
        fuel_per_km: row.get(10)?,
        weight_kg: row.get(11)?,
        revenue: row.get(12)?,
    })
}
