use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use fleetmetrics_utils::{EtlError, FleetResult, Window};

use crate::config::EtlConfig;
use crate::kpi::delivery::derive_fact_rows;
use crate::kpi::{KpiReport, KpiSettings};
use crate::run::state::{RunPhase, RunProgress};
use crate::sources::{Extract, SourceReader};
use crate::warehouse::dimensions::reconcile_dimensions;
use crate::warehouse::facts::{load_facts, FailedRow, LoadReport};
use crate::warehouse::store::WarehouseStore;

/// Knobs for a single run, resolved from configuration once at startup.
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub extraction_retries: u32,
    pub retry_delay: Duration,
    pub load_timeout: Duration,
    pub max_failed_row_pct: f64,
    pub kpi: KpiSettings,
    pub initial_watermark: Option<DateTime<Utc>>,
}

impl RunSettings {
    pub fn from_config(config: &EtlConfig) -> Self {
        RunSettings {
            extraction_retries: config.extraction.retries,
            retry_delay: Duration::from_secs(config.extraction.retry_delay_secs),
            load_timeout: Duration::from_secs(config.load.timeout_secs),
            max_failed_row_pct: config.load.max_failed_row_pct,
            kpi: KpiSettings {
                license_horizon_days: config.kpi.license_expiry_horizon_days,
            },
            initial_watermark: config.initial_watermark,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            extraction_retries: 2,
            retry_delay: Duration::from_secs(5),
            load_timeout: Duration::from_secs(300),
            max_failed_row_pct: 5.0,
            kpi: KpiSettings::default(),
            initial_watermark: None,
        }
    }
}

/// What a committed run produced. Failed runs yield the error instead;
/// their partial effects are safe to replay.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub window: Window,
    pub rows_extracted: usize,
    pub load: LoadReport,
    pub kpis: KpiReport,
}

/// Orchestrates one extract-derive-load cycle against the warehouse.
///
/// A runner admits at most one run at a time: the guard is taken with
/// `try_lock`, so a second invocation fails fast instead of queueing.
pub struct PipelineRunner {
    reader: Arc<dyn SourceReader>,
    warehouse: Arc<Mutex<WarehouseStore>>,
    settings: RunSettings,
    run_guard: Mutex<()>,
}

impl PipelineRunner {
    pub fn new(
        reader: Arc<dyn SourceReader>,
        warehouse: Arc<Mutex<WarehouseStore>>,
        settings: RunSettings,
    ) -> Self {
        PipelineRunner { reader, warehouse, settings, run_guard: Mutex::new(()) }
    }

    /// Execute one incremental run. `window_end` overrides the window's
    /// upper bound for backfills; it defaults to the current instant.
    pub async fn run_once(&self, window_end: Option<DateTime<Utc>>) -> FleetResult<RunOutcome> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            crate::metrics::inc_run("rejected");
            return Err(EtlError::RunAlreadyInProgress);
        };

        let window = match self.next_window(window_end).await {
            Ok(window) => window,
            Err(error) => {
                let outcome = if matches!(error, EtlError::EmptyWindow { .. }) {
                    "rejected"
                } else {
                    "failed"
                };
                crate::metrics::inc_run(outcome);
                return Err(error);
            }
        };

        let run_id = Uuid::new_v4().to_string();
        let mut progress = RunProgress::new(run_id.clone());
        {
            let store = self.warehouse.lock().await;
            store.insert_run(&run_id, window.start, window.end, Utc::now())?;
        }
        tracing::info!(run = %run_id, source = self.reader.name(), window = %window, "run admitted");

        match self.execute(&mut progress, window).await {
            Ok((rows_extracted, load, kpis)) => {
                if load.failed_pct() > self.settings.max_failed_row_pct {
                    let error = EtlError::LoadPartialFailure {
                        attempted: load.attempted,
                        failed: load.failed.len(),
                        failed_pct: load.failed_pct(),
                        threshold_pct: self.settings.max_failed_row_pct,
                    };
                    self.finalize_failed(&mut progress, &load, &error).await;
                    return Err(error);
                }

                let detail = if load.failed.is_empty() {
                    None
                } else {
                    Some(serde_json::json!({ "failed_rows": load.failed }).to_string())
                };
                {
                    let phase = progress.advance(RunPhase::Committed);
                    let store = self.warehouse.lock().await;
                    store.finalize_run(
                        &progress.run_id,
                        phase.as_str(),
                        load.rows_written() as i64,
                        detail.as_deref(),
                        Utc::now(),
                    )?;
                }
                crate::metrics::inc_run("committed");
                crate::metrics::observe_run_duration(progress.elapsed_secs());
                tracing::info!(
                    run = %progress.run_id,
                    window = %window,
                    rows_extracted,
                    rows_loaded = load.rows_written(),
                    failed_rows = load.failed.len(),
                    duration_ms = progress.started_at.elapsed().as_millis() as u64,
                    "run committed"
                );

                Ok(RunOutcome { run_id, window, rows_extracted, load, kpis })
            }
            Err(error) => {
                self.finalize_failed(&mut progress, &LoadReport::default(), &error).await;
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        progress: &mut RunProgress,
        window: Window,
    ) -> FleetResult<(usize, LoadReport, KpiReport)> {
        self.enter_phase(progress, RunPhase::Extracting).await?;
        let extract = self.extract_with_retry(window).await?;
        let rows_extracted = extract.total_rows();
        {
            let store = self.warehouse.lock().await;
            store.record_rows_extracted(&progress.run_id, rows_extracted as i64)?;
        }
        crate::metrics::add_rows_extracted(rows_extracted as u64);

        self.enter_phase(progress, RunPhase::Transforming).await?;
        let kpis = KpiReport::compute(&extract, self.settings.kpi).await;
        let transform = derive_fact_rows(&extract);

        self.enter_phase(progress, RunPhase::Loading).await?;
        let keys = {
            let store = self.warehouse.lock().await;
            reconcile_dimensions(&store, &extract, window.end)?
        };
        let load = tokio::time::timeout(
            self.settings.load_timeout,
            load_facts(&self.warehouse, &transform, &keys, &progress.run_id, Utc::now()),
        )
        .await
        .map_err(|_| EtlError::LoadTimeout { limit_secs: self.settings.load_timeout.as_secs() })??;
        crate::metrics::add_rows_loaded(load.rows_written() as u64);

        Ok((rows_extracted, load, kpis))
    }

    /// Window start is the committed watermark, falling back to the
    /// configured initial watermark, falling back to the epoch (full
    /// backfill on a fresh warehouse).
    async fn next_window(&self, end_override: Option<DateTime<Utc>>) -> FleetResult<Window> {
        let committed = {
            let store = self.warehouse.lock().await;
            store.last_watermark()?
        };
        let start = committed
            .or(self.settings.initial_watermark)
            .unwrap_or(DateTime::UNIX_EPOCH);
        let end = end_override.unwrap_or_else(Utc::now);
        Window::new(start, end)
    }

    async fn extract_with_retry(&self, window: Window) -> FleetResult<Extract> {
        let mut attempt = 0u32;
        loop {
            match self.reader.extract(window).await {
                Ok(extract) => return Ok(extract),
                Err(error @ EtlError::SourceUnavailable(_))
                    if attempt < self.settings.extraction_retries =>
                {
                    attempt += 1;
                    tracing::warn!(
                        source = self.reader.name(),
                        attempt,
                        retries = self.settings.extraction_retries,
                        error = %error,
                        "extraction failed, retrying"
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn enter_phase(&self, progress: &mut RunProgress, next: RunPhase) -> FleetResult<()> {
        let phase = progress.advance(next);
        let store = self.warehouse.lock().await;
        store.set_run_phase(&progress.run_id, phase.as_str())?;
        tracing::debug!(run = %progress.run_id, phase = phase.as_str(), "phase advanced");
        Ok(())
    }

    /// Record a failed run. The watermark stays put; a ledger write failure
    /// here is logged rather than masking the run error.
    async fn finalize_failed(&self, progress: &mut RunProgress, load: &LoadReport, error: &EtlError) {
        let phase = progress.advance(RunPhase::Failed);
        let detail = failure_detail(error, &load.failed);
        {
            let store = self.warehouse.lock().await;
            if let Err(ledger_error) = store.finalize_run(
                &progress.run_id,
                phase.as_str(),
                load.rows_written() as i64,
                Some(&detail),
                Utc::now(),
            ) {
                tracing::error!(run = %progress.run_id, error = %ledger_error, "could not finalize failed run");
            }
        }
        crate::metrics::inc_run("failed");
        crate::metrics::observe_run_duration(progress.elapsed_secs());
        tracing::error!(
            run = %progress.run_id,
            kind = error.kind(),
            error = %error,
            "run failed"
        );
    }
}

fn failure_detail(error: &EtlError, failed: &[FailedRow]) -> String {
    let mut detail = serde_json::json!({
        "kind": error.kind(),
        "message": error.to_string(),
    });
    if !failed.is_empty() {
        detail["failed_rows"] = serde_json::json!(failed);
    }
    detail.to_string()
}
