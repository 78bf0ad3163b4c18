pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::EtlError;

pub type FleetResult<T> = Result<T, EtlError>;

/// Half-open extraction interval `[start, end)`.
///
/// A run owns exactly one window: `start` comes from the watermark of the
/// last committed run, `end` is pinned when the run is admitted. Timestamps
/// equal to `end` belong to the next window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> FleetResult<Self> {
        if start >= end {
            return Err(EtlError::EmptyWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Window { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}
