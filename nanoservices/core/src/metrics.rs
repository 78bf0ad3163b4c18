use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// Global registry and metrics are initialized lazily.
static REGISTRY: Lazy<Registry> =
    Lazy::new(|| Registry::new_custom(Some("fleetmetrics".to_string()), None).unwrap());

static ETL_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("etl_runs_total", "Run invocations by outcome");
    let c = IntCounterVec::new(opts, &["outcome"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static ROWS_EXTRACTED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("rows_extracted_total", "Source rows pulled across all runs").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static ROWS_LOADED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("rows_loaded_total", "Fact rows written across all runs").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static DIVISION_GUARDS: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("division_guards_total", "Ratios omitted due to a zero divisor");
    let c = IntCounterVec::new(opts, &["measure"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new("etl_run_duration_seconds", "Wall-clock duration of one run");
    let h = Histogram::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

/// Count a run against its outcome: `committed`, `failed`, or `rejected`.
pub fn inc_run(outcome: &str) {
    ETL_RUNS.with_label_values(&[outcome]).inc();
}

pub fn add_rows_extracted(rows: u64) {
    ROWS_EXTRACTED.inc_by(rows);
}

pub fn add_rows_loaded(rows: u64) {
    ROWS_LOADED.inc_by(rows);
}

/// Count a skipped ratio for the measure that hit a zero divisor.
pub fn inc_division_guard(measure: &str) {
    DIVISION_GUARDS.with_label_values(&[measure]).inc();
}

/// Observe a finished run's duration in seconds.
pub fn observe_run_duration(seconds: f64) {
    RUN_DURATION.observe(seconds);
}

/// Gather metrics as text in Prometheus exposition format, for tests and
/// for embedding in an external exporter.
pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
