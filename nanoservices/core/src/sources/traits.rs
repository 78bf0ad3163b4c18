use async_trait::async_trait;
use fleetmetrics_utils::{FleetResult, Window};

use super::extract::Extract;

/// A transactional source the pipeline extracts from.
///
/// One call serves a whole run: the reader returns the full entity snapshot
/// (vehicles, drivers, routes) together with the trip, delivery, and
/// maintenance rows whose timestamps fall inside `window`.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Human-readable name for logging and metrics
    fn name(&self) -> &str;

    /// Extract the snapshot plus the windowed activity rows
    async fn extract(&self, window: Window) -> FleetResult<Extract>;
}
