//! Aggregate progress reporting.
//!
//! Reporting after every transition would swamp the log under high
//! concurrency, so the reporter only emits a summary every N record
//! completions (and whenever the caller forces one).

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use quarry_protocol::SessionState;
use quarry_state::StateCounts;

/// Report cadence: one summary per this many terminal records.
const REPORT_EVERY: usize = 10;

#[derive(Debug, Default)]
pub struct ProgressReporter {
    completions: AtomicUsize,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that a record reached a terminal state; reports every Nth.
    pub fn on_terminal(&self, counts: &StateCounts) {
        let completed = self.completions.fetch_add(1, Ordering::Relaxed) + 1;
        if completed % REPORT_EVERY == 0 {
            self.report(counts);
        }
    }

    /// Emit a progress summary unconditionally.
    pub fn report(&self, counts: &StateCounts) {
        let terminal = counts.finished() + counts.failed();
        let mut active = String::new();
        for state in SessionState::all() {
            if state.is_terminal() {
                continue;
            }
            let count = counts.get(state);
            if count > 0 {
                if !active.is_empty() {
                    active.push_str(", ");
                }
                active.push_str(&format!("{}: {}", state, count));
            }
        }
        if active.is_empty() {
            active.push_str("none");
        }
        info!(
            "Progress: {}/{} terminal ({} finished, {} failed); active: {}",
            terminal,
            counts.total(),
            counts.finished(),
            counts.failed(),
            active
        );
    }
}
