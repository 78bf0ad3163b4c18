use std::time::Instant;

/// Lifecycle phase of a single incremental run, as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Committed,
    Failed,
}

impl RunPhase {
    /// Ledger encoding, also used as the structured log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Pending => "pending",
            RunPhase::Extracting => "extracting",
            RunPhase::Transforming => "transforming",
            RunPhase::Loading => "loading",
            RunPhase::Committed => "committed",
            RunPhase::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<RunPhase> {
        match raw {
            "pending" => Some(RunPhase::Pending),
            "extracting" => Some(RunPhase::Extracting),
            "transforming" => Some(RunPhase::Transforming),
            "loading" => Some(RunPhase::Loading),
            "committed" => Some(RunPhase::Committed),
            "failed" => Some(RunPhase::Failed),
            _ => None,
        }
    }

    /// Committed and failed runs never change again; only a committed run
    /// moves the watermark.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Committed | RunPhase::Failed)
    }

    /// Phases advance strictly in pipeline order; any active phase may fail.
    pub fn can_advance_to(&self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (RunPhase::Pending, RunPhase::Extracting)
                | (RunPhase::Extracting, RunPhase::Transforming)
                | (RunPhase::Transforming, RunPhase::Loading)
                | (RunPhase::Loading, RunPhase::Committed)
                | (_, RunPhase::Failed)
        )
    }
}

/// In-flight bookkeeping for one run. Phase changes go through [`advance`],
/// so the ledger only ever sees legal transitions.
///
/// [`advance`]: RunProgress::advance
pub struct RunProgress {
    pub run_id: String,
    pub phase: RunPhase,
    pub started_at: Instant,
}

impl RunProgress {
    pub fn new(run_id: String) -> Self {
        RunProgress { run_id, phase: RunPhase::Pending, started_at: Instant::now() }
    }

    /// Move to `next` if the transition is legal and return the phase now in
    /// effect. An illegal jump leaves the phase untouched.
    pub fn advance(&mut self, next: RunPhase) -> RunPhase {
        if self.phase.can_advance_to(next) {
            self.phase = next;
        }
        self.phase
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}
