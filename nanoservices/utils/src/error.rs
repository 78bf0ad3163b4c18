use thiserror::Error;
use tokio::io::Error as TokioIoError;

/// Failure taxonomy for a pipeline run. Variants map one-to-one onto the
/// terminal `error_detail` recorded in the run ledger.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("transactional source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("source schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("another run is already in progress")]
    RunAlreadyInProgress,

    #[error("extraction window is empty: start {start} is not before end {end}")]
    EmptyWindow { start: String, end: String },

    #[error("load failed for {failed} of {attempted} fact rows ({failed_pct:.2}% > {threshold_pct:.2}% allowed)")]
    LoadPartialFailure {
        attempted: usize,
        failed: usize,
        failed_pct: f64,
        threshold_pct: f64,
    },

    #[error("load phase exceeded the {limit_secs}s timeout and was cancelled")]
    LoadTimeout { limit_secs: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] TokioIoError),
}

impl EtlError {
    /// Short stable tag used for ledger rows and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::SourceUnavailable(_) => "source_unavailable",
            EtlError::SchemaMismatch(_) => "schema_mismatch",
            EtlError::RunAlreadyInProgress => "run_already_in_progress",
            EtlError::EmptyWindow { .. } => "empty_window",
            EtlError::LoadPartialFailure { .. } => "load_partial_failure",
            EtlError::LoadTimeout { .. } => "load_timeout",
            EtlError::Config(_) => "config",
            EtlError::Warehouse(_) => "warehouse",
            EtlError::Serialization(_) => "serialization",
            EtlError::Io(_) => "io",
        }
    }

    /// True when retrying the same window later could succeed without
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EtlError::SourceUnavailable(_)
                | EtlError::RunAlreadyInProgress
                | EtlError::LoadTimeout { .. }
        )
    }
}
