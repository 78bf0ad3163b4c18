//! fleetmetrics_core — KPI derivation and incremental warehouse loading
//!
//! This crate turns a fleet-logistics transactional store (vehicles,
//! drivers, routes, trips, deliveries, maintenance) into an analytical star
//! schema: each run extracts one half-open window of source rows, derives
//! twelve operational measures plus delivery-level fact rows, reconciles
//! type-2 dimensions, and loads facts idempotently. A run ledger tracks the
//! watermark, so failed runs replay their window on the next attempt.
//!
//! Basic usage:
//!
//! ```no_run
//! use fleetmetrics_core::config;
//! use fleetmetrics_core::engine::FleetMetrics;
//!
//! let config = config::parse_config("source_db: fleetlogix.db").unwrap();
//! let engine = FleetMetrics::from_config(config).unwrap();
//! // call `engine.run().await` from a tokio runtime to run on the schedule
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod kpi;
pub mod run;
pub mod sources;
pub mod warehouse;

pub mod logging;

pub mod metrics;
