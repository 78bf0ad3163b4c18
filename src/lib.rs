pub use fleetmetrics_core as core;
pub use fleetmetrics_utils as utils;

// Convenience re-exports for common usage
pub use fleetmetrics_core::config::{load_config, EtlConfig};
pub use fleetmetrics_core::engine::FleetMetrics;
pub use fleetmetrics_core::events::trigger::Trigger;
pub use fleetmetrics_core::kpi::KpiReport;
pub use fleetmetrics_core::run::runner::{RunOutcome, RunSettings};
pub use fleetmetrics_core::sources::traits::SourceReader;
pub use fleetmetrics_utils::{EtlError, FleetResult, Window};
