//! Canonical pipeline types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Session lifecycle
// ============================================================================

/// Lifecycle of one query's remote analysis session.
/// This is the CANONICAL definition - use this everywhere.
///
/// States advance strictly forward along the declared order; `Failed` is
/// reachable from any non-terminal state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Record created, nothing sent to the remote system yet
    #[default]
    NotStarted,
    /// Submission persisted but the submit call may not have landed
    Submitting,
    /// Remote session accepted the submission
    Submitted,
    /// Polling the remote session for a terminal status
    Monitoring,
    /// Remote runs all terminal, results not yet downloaded
    Completed,
    /// Download persisted but the download call may not have finished
    Downloading,
    /// Artifacts on local disk, not yet cataloged
    Downloaded,
    /// Cataloging persisted but the copy pass may not have finished
    Copying,
    /// Artifacts cataloged into the results tree
    Finished,
    /// Terminal failure; `error` on the record carries detail
    Failed,
}

/// Next side-effecting action a worker must take for a record.
///
/// Keeping this a pure function of the state (rather than comparing state
/// strings inline) makes the driver loop a plain `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Submit,
    Monitor,
    Download,
    Collect,
    Done,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "NOT_STARTED",
            SessionState::Submitting => "SUBMITTING",
            SessionState::Submitted => "SUBMITTED",
            SessionState::Monitoring => "MONITORING",
            SessionState::Completed => "COMPLETED",
            SessionState::Downloading => "DOWNLOADING",
            SessionState::Downloaded => "DOWNLOADED",
            SessionState::Copying => "COPYING",
            SessionState::Finished => "FINISHED",
            SessionState::Failed => "FAILED",
        }
    }

    /// Position along the forward stage order. `Failed` sorts last.
    pub fn rank(&self) -> u8 {
        match self {
            SessionState::NotStarted => 0,
            SessionState::Submitting => 1,
            SessionState::Submitted => 2,
            SessionState::Monitoring => 3,
            SessionState::Completed => 4,
            SessionState::Downloading => 5,
            SessionState::Downloaded => 6,
            SessionState::Copying => 7,
            SessionState::Finished => 8,
            SessionState::Failed => 9,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Failed)
    }

    /// True once the remote system has (or may have) seen the session.
    /// The engine never resubmits a record past this point.
    pub fn submitted(&self) -> bool {
        *self >= SessionState::Submitted && !matches!(self, SessionState::Failed)
    }

    /// The action that advances a record out of this state.
    pub fn stage(&self) -> Stage {
        match self {
            SessionState::NotStarted | SessionState::Submitting => Stage::Submit,
            SessionState::Submitted | SessionState::Monitoring => Stage::Monitor,
            SessionState::Completed | SessionState::Downloading => Stage::Download,
            SessionState::Downloaded | SessionState::Copying => Stage::Collect,
            SessionState::Finished | SessionState::Failed => Stage::Done,
        }
    }

    /// All states, in forward stage order (for stable progress output).
    pub fn all() -> [SessionState; 10] {
        [
            SessionState::NotStarted,
            SessionState::Submitting,
            SessionState::Submitted,
            SessionState::Monitoring,
            SessionState::Completed,
            SessionState::Downloading,
            SessionState::Downloaded,
            SessionState::Copying,
            SessionState::Finished,
            SessionState::Failed,
        ]
    }
}

impl PartialOrd for SessionState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SessionState {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOT_STARTED" => Ok(SessionState::NotStarted),
            "SUBMITTING" => Ok(SessionState::Submitting),
            "SUBMITTED" => Ok(SessionState::Submitted),
            "MONITORING" => Ok(SessionState::Monitoring),
            "COMPLETED" => Ok(SessionState::Completed),
            "DOWNLOADING" => Ok(SessionState::Downloading),
            "DOWNLOADED" => Ok(SessionState::Downloaded),
            "COPYING" => Ok(SessionState::Copying),
            "FINISHED" => Ok(SessionState::Finished),
            "FAILED" => Ok(SessionState::Failed),
            _ => Err(format!("Invalid session state: '{}'", s)),
        }
    }
}

// ============================================================================
// Session record
// ============================================================================

/// Local record tracking one query's progress through the pipeline.
///
/// Timestamps are set exactly once, at the transition they describe, and
/// never cleared. Run counters mirror the most recent remote status
/// snapshot and are meaningful only once monitoring has observed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub job_id: String,
    pub session_name: String,
    pub state: SessionState,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub succeeded_count: u64,
    #[serde(default)]
    pub failed_count: u64,
}

impl SessionRecord {
    pub fn new(job_id: impl Into<String>, session_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            session_name: session_name.into(),
            state: SessionState::NotStarted,
            submitted_at: None,
            completed_at: None,
            downloaded_at: None,
            finished_at: None,
            error: None,
            run_count: 0,
            succeeded_count: 0,
            failed_count: 0,
        }
    }

    /// Restore-path constructor: a record fabricated from remote state.
    pub fn restored(
        job_id: impl Into<String>,
        session_name: impl Into<String>,
        state: SessionState,
    ) -> Self {
        let mut record = Self::new(job_id, session_name);
        record.state = state;
        record
    }

    pub fn note_submitted(&mut self, at: DateTime<Utc>) {
        self.state = SessionState::Submitted;
        self.submitted_at.get_or_insert(at);
    }

    pub fn note_completed(&mut self, at: DateTime<Utc>) {
        self.state = SessionState::Completed;
        self.completed_at.get_or_insert(at);
    }

    pub fn note_downloaded(&mut self, at: DateTime<Utc>) {
        self.state = SessionState::Downloaded;
        self.downloaded_at.get_or_insert(at);
    }

    pub fn note_finished(&mut self, at: DateTime<Utc>) {
        self.state = SessionState::Finished;
        self.finished_at.get_or_insert(at);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = SessionState::Failed;
        self.error = Some(error.into());
    }

    pub fn observe_runs(&mut self, totals: &RunTotals) {
        self.run_count = totals.total;
        self.succeeded_count = totals.succeeded;
        self.failed_count = totals.failed;
    }
}

// ============================================================================
// Remote wire types (gh mrva JSON)
// ============================================================================

/// Remote session status as reported by the variant-analysis CLI.
///
/// Decoding is lenient: statuses this binary does not know about map to
/// `Unknown`, which the monitor treats as still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSessionState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Per-repository run status inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRunState {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RemoteRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteRunState::Succeeded | RemoteRunState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRun {
    pub status: RemoteRunState,
}

/// One status snapshot for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: RemoteSessionState,
    #[serde(default)]
    pub runs: Vec<RemoteRun>,
}

/// Aggregate run counters extracted from a status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunTotals {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_progress: u64,
    pub pending: u64,
}

/// What a status snapshot means for the monitoring loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep polling
    StillRunning,
    /// All runs terminal, session reported done
    Completed,
    /// Session reported failed with nothing left in flight
    Failed,
}

impl SessionStatus {
    pub fn run_totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            total: self.runs.len() as u64,
            ..RunTotals::default()
        };
        for run in &self.runs {
            match run.status {
                RemoteRunState::Succeeded => totals.succeeded += 1,
                RemoteRunState::Failed => totals.failed += 1,
                RemoteRunState::InProgress => totals.in_progress += 1,
                RemoteRunState::Pending | RemoteRunState::Unknown => totals.pending += 1,
            }
        }
        totals
    }

    fn runs_settled(&self) -> bool {
        self.runs.iter().all(|run| run.status.is_terminal())
    }

    /// Classify this snapshot. A session is only terminal once no run is
    /// pending or in progress; unknown statuses keep the record polling.
    pub fn outcome(&self) -> PollOutcome {
        if !self.runs_settled() {
            return PollOutcome::StillRunning;
        }
        match self.status {
            RemoteSessionState::Completed => PollOutcome::Completed,
            RemoteSessionState::Failed => PollOutcome::Failed,
            RemoteSessionState::Pending
            | RemoteSessionState::InProgress
            | RemoteSessionState::Unknown => PollOutcome::StillRunning,
        }
    }
}

/// Session listing entry used during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSession {
    pub name: String,
    pub status: RemoteSessionState,
}
