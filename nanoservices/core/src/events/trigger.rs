use std::time::Duration;

use chrono::{DateTime, Utc};

/// What caused a run to be requested.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Scheduled run on a fixed interval.
    Interval(Duration),
    /// Operator-requested run, optionally pinning the window's upper bound
    /// for backfills. `None` means up to now.
    OnDemand { window_end: Option<DateTime<Utc>> },
}

/// An event delivered to the engine loop.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub trigger: Trigger,
}

impl TriggerEvent {
    /// The window-end override this event carries, if any.
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        match self.trigger {
            Trigger::Interval(_) => None,
            Trigger::OnDemand { window_end } => window_end,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.trigger {
            Trigger::Interval(_) => "interval",
            Trigger::OnDemand { .. } => "on_demand",
        }
    }
}
