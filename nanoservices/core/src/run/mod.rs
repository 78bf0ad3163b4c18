//! Single-run orchestration: the phase state machine and the runner that
//! drives extract, derive, reconcile, and load against the ledger.

pub mod runner;
pub mod state;

pub use runner::{PipelineRunner, RunOutcome, RunSettings};
pub use state::{RunPhase, RunProgress};
