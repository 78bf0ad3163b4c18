use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use fleetmetrics_utils::{EtlError, FleetResult};

use crate::config::EtlConfig;
use crate::events::bus::EventBus;
use crate::events::interval::spawn_interval_trigger;
use crate::run::runner::{PipelineRunner, RunOutcome, RunSettings};
use crate::sources::SqliteSourceReader;
use crate::warehouse::store::WarehouseStore;

/// Top-level daemon: owns the wiring between the source reader, the
/// warehouse, and the runner, and drives runs from trigger events until
/// shutdown.
pub struct FleetMetrics {
    runner: Arc<PipelineRunner>,
    interval: Duration,
}

impl FleetMetrics {
    /// Wire an engine from configuration: open (or create) the warehouse,
    /// sweep runs stranded by a previous process, and point the reader at
    /// the transactional store.
    pub fn from_config(config: EtlConfig) -> FleetResult<Self> {
        let warehouse = match &config.warehouse_db {
            Some(path) => WarehouseStore::open(path)?,
            None => WarehouseStore::in_memory()?,
        };

        // Stranded runs can never commit; failing them here reopens their
        // windows for replay.
        let stale = warehouse.mark_stale_runs_failed(Utc::now())?;
        if stale > 0 {
            tracing::warn!(count = stale, "failed stale runs left by a previous session");
        }

        let reader = Arc::new(SqliteSourceReader::new(&config.source_db));
        let settings = RunSettings::from_config(&config);
        let runner = Arc::new(PipelineRunner::new(
            reader,
            Arc::new(Mutex::new(warehouse)),
            settings,
        ));
        Ok(Self::new(runner, Duration::from_secs(config.interval_secs)))
    }

    pub fn new(runner: Arc<PipelineRunner>, interval: Duration) -> Self {
        FleetMetrics { runner, interval }
    }

    /// Run one cycle immediately, outside the schedule. A committed run
    /// yields its outcome, including the full KPI report.
    pub async fn trigger_once(&self, window_end: Option<DateTime<Utc>>) -> FleetResult<RunOutcome> {
        self.runner.run_once(window_end).await
    }

    /// Run the scheduled loop until Ctrl-C.
    pub async fn run(self) -> FleetResult<()> {
        let shutdown = tokio::signal::ctrl_c();
        self.run_with_shutdown(async {
            let _ = shutdown.await;
        })
        .await
    }

    /// Run with a custom shutdown signal (useful for testing).
    pub async fn run_with_shutdown<F: std::future::Future>(self, shutdown: F) -> FleetResult<()> {
        let bus = EventBus::new(256);
        let (event_tx, mut event_rx) = bus.split();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let trigger_handle = spawn_interval_trigger(self.interval, event_tx.clone());
        drop(event_tx);

        let runner = self.runner.clone();
        let loop_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = event_rx.recv() => {
                        let runner = runner.clone();
                        tokio::spawn(async move {
                            match runner.run_once(event.window_end()).await {
                                Ok(outcome) => log_report(&outcome),
                                Err(EtlError::RunAlreadyInProgress) => {
                                    tracing::warn!(
                                        trigger = event.kind(),
                                        "run skipped, previous run still active"
                                    );
                                }
                                Err(EtlError::EmptyWindow { .. }) => {
                                    tracing::warn!(
                                        trigger = event.kind(),
                                        "run skipped, extraction window is empty"
                                    );
                                }
                                // failed runs are logged when they are finalized
                                Err(_) => {}
                            }
                        });
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("engine loop shutting down");
                        break;
                    }
                }
            }
        });

        shutdown.await;

        let _ = shutdown_tx.send(true);
        trigger_handle.abort();
        let _ = loop_handle.await;

        tracing::info!("fleetmetrics shutdown complete");
        Ok(())
    }
}

fn log_report(outcome: &RunOutcome) {
    match serde_json::to_string(&outcome.kpis) {
        Ok(report) => tracing::debug!(run = %outcome.run_id, %report, "kpi report"),
        Err(error) => {
            tracing::error!(run = %outcome.run_id, error = %error, "could not serialize kpi report")
        }
    }
}
