use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fleetmetrics_utils::{error::EtlError, FleetResult, Window};
use rusqlite::{params, Connection, OpenFlags};

use super::extract::{Extract, RowSet};
use super::traits::SourceReader;
use crate::domain::{Delivery, Driver, Maintenance, Route, Trip, Vehicle};

/// Tables and columns every extraction depends on. Anything missing here
/// fails the run with a schema mismatch before a single row is read.
const REQUIRED_TABLES: &[(&str, &[&str])] = &[
    ("vehicles", &["vehicle_id", "plate", "vehicle_type", "status"]),
    ("drivers", &["driver_id", "name", "license_number", "license_expiry", "status"]),
    ("routes", &["route_id", "code", "origin_city", "destination_city", "distance_km"]),
    (
        "trips",
        &["trip_id", "vehicle_id", "driver_id", "route_id", "departure_ts", "arrival_ts", "fuel_consumed_l", "status"],
    ),
    (
        "deliveries",
        &["delivery_id", "trip_id", "scheduled_ts", "delivered_ts", "package_weight_kg", "status"],
    ),
    ("maintenance", &["maintenance_id", "vehicle_id", "maintenance_date", "cost"]),
];

/// Reader over the operational SQLite database.
///
/// The connection is opened read-only per extraction, so a source that was
/// briefly locked or absent can be retried without restarting the service.
pub struct SqliteSourceReader {
    path: PathBuf,
    name: String,
}

impl SqliteSourceReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("sqlite:{}", path.display());
        SqliteSourceReader { path, name }
    }

    fn connect(&self) -> FleetResult<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        Connection::open_with_flags(&self.path, flags)
            .map_err(|e| EtlError::SourceUnavailable(format!("{}: {e}", self.path.display())))
    }

    fn verify_schema(conn: &Connection) -> FleetResult<()> {
        let mut missing = Vec::new();
        for (table, columns) in REQUIRED_TABLES {
            let found = table_columns(conn, table).map_err(read_error)?;
            if found.is_empty() {
                missing.push(format!("table {table}"));
                continue;
            }
            for column in *columns {
                if !found.iter().any(|c| c == column) {
                    missing.push(format!("{table}.{column}"));
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::SchemaMismatch(missing.join(", ")))
        }
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

/// Conversion failures mean the source holds values we cannot interpret,
/// which is a contract problem, not an availability problem.
fn read_error(e: rusqlite::Error) -> EtlError {
    match e {
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            EtlError::SchemaMismatch(e.to_string())
        }
        other => EtlError::SourceUnavailable(other.to_string()),
    }
}

fn read_vehicles(conn: &Connection) -> Result<Vec<Vehicle>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT vehicle_id, plate, vehicle_type, status FROM vehicles ORDER BY vehicle_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Vehicle {
            id: row.get(0)?,
            plate: row.get(1)?,
            vehicle_type: row.get(2)?,
            status: row.get(3)?,
        })
    })?;
    rows.collect()
}

fn read_drivers(conn: &Connection) -> Result<Vec<Driver>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT driver_id, name, license_number, license_expiry, status FROM drivers ORDER BY driver_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Driver {
            id: row.get(0)?,
            name: row.get(1)?,
            license_number: row.get(2)?,
            license_expiry: row.get(3)?,
            status: row.get(4)?,
        })
    })?;
    rows.collect()
}

fn read_routes(conn: &Connection) -> Result<Vec<Route>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT route_id, code, origin_city, destination_city, distance_km FROM routes ORDER BY route_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Route {
            id: row.get(0)?,
            code: row.get(1)?,
            origin_city: row.get(2)?,
            destination_city: row.get(3)?,
            distance_km: row.get(4)?,
        })
    })?;
    rows.collect()
}

fn read_trips(conn: &Connection, window: Window) -> Result<Vec<Trip>, rusqlite::Error> {
    // Timestamp columns are normalized through datetime() so the window
    // bounds compare correctly whatever text form the source writes.
    // Parent trips of windowed deliveries come along even when their
    // departure predates the window, so delivery joins always resolve.
    let mut stmt = conn.prepare(
        "SELECT trip_id, vehicle_id, driver_id, route_id, departure_ts, arrival_ts, fuel_consumed_l, status
         FROM trips
         WHERE (datetime(departure_ts) >= datetime(?1) AND datetime(departure_ts) < datetime(?2))
            OR trip_id IN (
                 SELECT trip_id FROM deliveries
                 WHERE (datetime(scheduled_ts) >= datetime(?1) AND datetime(scheduled_ts) < datetime(?2))
                    OR (delivered_ts IS NOT NULL
                        AND datetime(delivered_ts) >= datetime(?1) AND datetime(delivered_ts) < datetime(?2)))
         ORDER BY trip_id",
    )?;
    let rows = stmt.query_map(params![window.start, window.end], |row| {
        Ok(Trip {
            id: row.get(0)?,
            vehicle_id: row.get(1)?,
            driver_id: row.get(2)?,
            route_id: row.get(3)?,
            departure_ts: row.get(4)?,
            arrival_ts: row.get(5)?,
            fuel_consumed_l: row.get(6)?,
            status: row.get(7)?,
        })
    })?;
    rows.collect()
}

fn read_deliveries(conn: &Connection, window: Window) -> Result<Vec<Delivery>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT delivery_id, trip_id, scheduled_ts, delivered_ts, package_weight_kg, status
         FROM deliveries
         WHERE (datetime(scheduled_ts) >= datetime(?1) AND datetime(scheduled_ts) < datetime(?2))
            OR (delivered_ts IS NOT NULL
                AND datetime(delivered_ts) >= datetime(?1) AND datetime(delivered_ts) < datetime(?2))
         ORDER BY delivery_id",
    )?;
    let rows = stmt.query_map(params![window.start, window.end], |row| {
        Ok(Delivery {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            scheduled_ts: row.get(2)?,
            delivered_ts: row.get(3)?,
            package_weight_kg: row.get(4)?,
            status: row.get(5)?,
        })
    })?;
    rows.collect()
}

fn read_maintenance(conn: &Connection, window: Window) -> Result<Vec<Maintenance>, rusqlite::Error> {
    // Maintenance carries a calendar date, not an instant. The window is
    // applied half-open on dates; a row dated on the boundary day belongs
    // to the run whose window starts that day.
    let mut stmt = conn.prepare(
        "SELECT maintenance_id, vehicle_id, maintenance_date, cost
         FROM maintenance
         WHERE maintenance_date >= ?1 AND maintenance_date < ?2
         ORDER BY maintenance_id",
    )?;
    let rows = stmt.query_map(
        params![window.start.date_naive(), window.end.date_naive()],
        |row| {
            Ok(Maintenance {
                id: row.get(0)?,
                vehicle_id: row.get(1)?,
                maintenance_date: row.get(2)?,
                cost: row.get(3)?,
            })
        },
    )?;
    rows.collect()
}

#[async_trait]
impl SourceReader for SqliteSourceReader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, window: Window) -> FleetResult<Extract> {
        let conn = self.connect()?;
        Self::verify_schema(&conn)?;

        let rows = RowSet {
            vehicles: read_vehicles(&conn).map_err(read_error)?,
            drivers: read_drivers(&conn).map_err(read_error)?,
            routes: read_routes(&conn).map_err(read_error)?,
            trips: read_trips(&conn, window).map_err(read_error)?,
            deliveries: read_deliveries(&conn, window).map_err(read_error)?,
            maintenance: read_maintenance(&conn, window).map_err(read_error)?,
        };

        tracing::debug!(
            source = %self.name,
            vehicles = rows.vehicles.len(),
            drivers = rows.drivers.len(),
            routes = rows.routes.len(),
            trips = rows.trips.len(),
            deliveries = rows.deliveries.len(),
            maintenance = rows.maintenance.len(),
            "extraction complete"
        );

        Ok(Extract::new(window, rows))
    }
}
