use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleetmetrics_utils::Window;

use crate::domain::{Delivery, Driver, Maintenance, Route, Trip, Vehicle};

/// Everything one extraction pulled from the source.
///
/// Entity tables are full snapshots; trips, deliveries, and maintenance are
/// limited to the run's window (plus the parent trips of windowed
/// deliveries, so joins inside the extract always resolve).
#[derive(Debug, Default)]
pub struct RowSet {
    pub vehicles: Vec<Vehicle>,
    pub drivers: Vec<Driver>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub deliveries: Vec<Delivery>,
    pub maintenance: Vec<Maintenance>,
}

/// Immutable handle over one run's rows. Clones share the same allocation,
/// so every derivation task can hold its own copy for free.
#[derive(Clone, Debug)]
pub struct Extract {
    window: Window,
    rows: Arc<RowSet>,
}

impl Extract {
    pub fn new(window: Window, rows: RowSet) -> Self {
        Extract { window, rows: Arc::new(rows) }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// The instant all "as of now" measures are anchored to.
    pub fn reference_ts(&self) -> DateTime<Utc> {
        self.window.end
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.rows.vehicles
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.rows.drivers
    }

    pub fn routes(&self) -> &[Route] {
        &self.rows.routes
    }

    pub fn trips(&self) -> &[Trip] {
        &self.rows.trips
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.rows.deliveries
    }

    pub fn maintenance(&self) -> &[Maintenance] {
        &self.rows.maintenance
    }

    pub fn total_rows(&self) -> usize {
        self.rows.vehicles.len()
            + self.rows.drivers.len()
            + self.rows.routes.len()
            + self.rows.trips.len()
            + self.rows.deliveries.len()
            + self.rows.maintenance.len()
    }
}
