use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Engine configuration, one YAML document per deployment.
#[derive(Debug, Deserialize)]
pub struct EtlConfig {
    /// SQLite file holding the transactional tables.
    pub source_db: String,
    /// Warehouse SQLite file. Absent means an in-memory warehouse that
    /// lives and dies with the process.
    pub warehouse_db: Option<String>,
    /// Seconds between scheduled runs.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Lower bound of the very first window on a fresh warehouse. Without
    /// it the first run backfills from the epoch.
    pub initial_watermark: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub kpi: KpiConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extra attempts after a transient source failure.
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig { retries: 2, retry_delay_secs: 5 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Wall-clock budget for the load phase before the run is failed.
    pub timeout_secs: u64,
    /// Failed-row percentage above which a run fails instead of committing.
    pub max_failed_row_pct: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig { timeout_secs: 300, max_failed_row_pct: 5.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    pub license_expiry_horizon_days: u32,
}

impl Default for KpiConfig {
    fn default() -> Self {
        KpiConfig { license_expiry_horizon_days: 30 }
    }
}

fn default_interval_secs() -> u64 {
    3600
}
