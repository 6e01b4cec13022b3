//! Reporting hooks for reconciliation outcomes.
//!
//! Defines a [`DecisionSink`] trait that decouples the engine from how
//! outcomes are rendered. Terminal rendering lives in the CLI utilities
//! crate.

use site_sync_models::{FileOutcome, OrphanOutcome};

/// What a run is about to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStart {
    /// Number of outcomes that will follow.
    pub total: usize,
    /// Character count of the longest name any outcome or orphan line will
    /// carry, local and remote names alike.
    pub name_width: usize,
}

/// Receives per-file outcomes and the orphan result as a run progresses.
///
/// Implementations must be `Send + Sync`; outcomes arrive in completion
/// order, which is not name order when files are processed concurrently.
pub trait DecisionSink: Send + Sync {
    /// Called once before the first outcome.
    fn on_start(&self, _start: RunStart) {}

    /// Called once per local entry after its decision has been acted on.
    fn on_outcome(&self, outcome: &FileOutcome);

    /// Called once after every file has been handled.
    fn on_orphans(&self, outcome: &OrphanOutcome);
}

/// Logs one JSON record per event at `info` level.
///
/// Suitable for non-interactive runs where the output is parsed.
pub struct LogSink;

/// JSON record for one outcome, with the human-readable reason alongside
/// the machine tag.
///
/// # Errors
///
/// Returns a serialization error from `serde_json`.
pub fn outcome_record(outcome: &FileOutcome) -> serde_json::Result<String> {
    let mut record = serde_json::to_value(outcome)?;
    record["reason_text"] = outcome.decision.reason().into();
    serde_json::to_string(&record)
}

impl DecisionSink for LogSink {
    fn on_outcome(&self, outcome: &FileOutcome) {
        match outcome_record(outcome) {
            Ok(line) => log::info!("{line}"),
            Err(e) => log::error!("failed to serialize outcome for {}: {e}", outcome.name),
        }
    }

    fn on_orphans(&self, outcome: &OrphanOutcome) {
        match serde_json::to_string(outcome) {
            Ok(line) => log::info!("{line}"),
            Err(e) => log::error!("failed to serialize orphan outcome: {e}"),
        }
    }
}

/// Ignores every event.
pub struct NullSink;

impl DecisionSink for NullSink {
    fn on_outcome(&self, _outcome: &FileOutcome) {}
    fn on_orphans(&self, _outcome: &OrphanOutcome) {}
}
