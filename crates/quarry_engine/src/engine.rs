//! The orchestrator.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use quarry_client::{ClientError, SuiteResolver, VariantAnalysisClient};
use quarry_protocol::{
    session_name, PollOutcome, RemoteSessionState, SessionRecord, SessionState, Stage,
};
use quarry_state::{RunMeta, SessionLedger, StateCounts, StateError, StateStore};

use crate::collect::{Catalog, CatalogError};
use crate::progress::ProgressReporter;
use crate::shutdown::ShutdownToken;

pub const DEFAULT_MAX_CONCURRENT: usize = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum EngineError {
    /// Suite resolution failed; nothing was created or persisted.
    #[error("Failed to resolve query suite '{suite}': {source}")]
    Resolution {
        suite: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Engine configuration (plain data).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub suite: String,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub language: String,
    pub repository_list: String,
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    /// Simulate every transition without calling the remote system or
    /// touching the filesystem.
    pub dry_run: bool,
    /// Replace records left `FAILED` by a previous run with fresh ones.
    pub retry_failed: bool,
}

impl EngineConfig {
    pub fn session_dir(&self, session_name: &str) -> PathBuf {
        self.output_dir.join("sessions").join(session_name)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join("results").join(&self.prefix)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_manifest.txt", self.prefix))
    }

    fn run_meta(&self) -> RunMeta {
        RunMeta {
            suite: self.suite.clone(),
            prefix: self.prefix.clone(),
            language: self.language.clone(),
            repository_list: self.repository_list.clone(),
        }
    }
}

/// A record that ended the run in `FAILED`.
#[derive(Debug, Clone)]
pub struct FailedSession {
    pub job_id: String,
    pub session_name: String,
    pub error: String,
}

/// Aggregate outcome of a run.
#[derive(Debug)]
pub struct RunSummary {
    pub counts: StateCounts,
    pub failures: Vec<FailedSession>,
    /// Shutdown was requested before every record reached a terminal
    /// state; the persisted snapshot resumes the run.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Shared context for the worker pool.
struct WorkerCtx {
    config: EngineConfig,
    client: Arc<dyn VariantAnalysisClient>,
    ledger: SessionLedger,
    catalog: Option<Catalog>,
    shutdown: ShutdownToken,
    progress: ProgressReporter,
    queue: Mutex<VecDeque<String>>,
}

impl WorkerCtx {
    fn next_session(&self) -> Option<String> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

/// Drives every session of one run to a terminal state.
///
/// Collaborators are injected; the engine owns scheduling, persistence
/// ordering, and the per-record state machine, nothing else.
pub struct Engine {
    config: EngineConfig,
    resolver: Arc<dyn SuiteResolver>,
    client: Arc<dyn VariantAnalysisClient>,
    ledger: SessionLedger,
    shutdown: ShutdownToken,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn SuiteResolver>,
        client: Arc<dyn VariantAnalysisClient>,
        shutdown: ShutdownToken,
    ) -> Result<Self, EngineError> {
        let store = if config.dry_run {
            StateStore::disabled()
        } else {
            StateStore::open(&config.output_dir, &config.prefix)?
        };
        let ledger = SessionLedger::open(store, config.run_meta());
        if !ledger.is_empty() {
            info!("Loaded {} existing session records from state file", ledger.len());
        }
        Ok(Self {
            config,
            resolver,
            client,
            ledger,
            shutdown,
        })
    }

    /// Run until every record is terminal or shutdown is requested.
    pub async fn run(self) -> Result<RunSummary, EngineError> {
        let jobs = self
            .resolver
            .resolve(&self.config.suite)
            .await
            .map_err(|source| EngineError::Resolution {
                suite: self.config.suite.clone(),
                source,
            })?;
        info!("Resolved {} queries from suite {}", jobs.len(), self.config.suite);

        let resolved: Vec<(String, String)> = jobs
            .iter()
            .map(|job| (job.clone(), session_name(&self.config.prefix, job)))
            .collect();

        self.reconcile(&resolved).await?;

        let fresh: Vec<SessionRecord> = resolved
            .iter()
            .map(|(job, name)| SessionRecord::new(job.clone(), name.clone()))
            .collect();
        let created = self.ledger.insert_missing(fresh)?;
        if created > 0 {
            info!("Created {} new session records", created);
        }

        if self.config.retry_failed {
            self.reset_failed()?;
        }

        let queue = self.build_queue(&resolved);
        info!(
            "{} of {} sessions need work (max {} concurrent, poll every {:?}{})",
            queue.len(),
            self.ledger.len(),
            self.config.max_concurrent,
            self.config.poll_interval,
            if self.config.dry_run { ", dry-run" } else { "" }
        );

        let catalog = if self.config.dry_run {
            None
        } else {
            Some(Catalog::open(
                self.config.results_dir(),
                self.config.manifest_path(),
            )?)
        };

        let worker_count = self.config.max_concurrent.max(1).min(queue.len().max(1));
        let ctx = Arc::new(WorkerCtx {
            config: self.config,
            client: self.client,
            ledger: self.ledger,
            catalog,
            shutdown: self.shutdown,
            progress: ProgressReporter::new(),
            queue: Mutex::new(queue),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move { worker_loop(ctx).await }));
        }

        let mut first_err: Option<EngineError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    ctx.shutdown.cancel();
                    first_err.get_or_insert(err);
                }
                Err(join_err) => {
                    ctx.shutdown.cancel();
                    first_err.get_or_insert(EngineError::Worker(join_err.to_string()));
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        let counts = ctx.ledger.counts();
        ctx.progress.report(&counts);

        let mut failures: Vec<FailedSession> = ctx
            .ledger
            .records()
            .into_iter()
            .filter(|record| record.state == SessionState::Failed)
            .map(|record| FailedSession {
                job_id: record.job_id,
                session_name: record.session_name,
                error: record
                    .error
                    .unwrap_or_else(|| "unknown failure".to_string()),
            })
            .collect();
        failures.sort_by(|a, b| a.job_id.cmp(&b.job_id));

        let interrupted = ctx.shutdown.is_cancelled() && !counts.all_terminal();
        if interrupted {
            info!("Interrupted; state persisted, rerun with the same arguments to resume");
        }

        Ok(RunSummary {
            counts,
            failures,
            interrupted,
        })
    }

    /// Merge the remote system's view of existing sessions into the local
    /// set. The remote system is the source of truth for session
    /// existence; local artifacts decide the post-download position.
    async fn reconcile(&self, resolved: &[(String, String)]) -> Result<(), EngineError> {
        if self.config.dry_run {
            return Ok(());
        }
        let remote = match self.client.list_sessions(&self.config.prefix).await {
            Ok(remote) => remote,
            Err(err) => {
                // Submission is idempotent from our side, so a failed
                // listing degrades to possibly re-confirming submissions.
                warn!("Could not list remote sessions for reconciliation: {}", err);
                return Ok(());
            }
        };
        if remote.is_empty() {
            return Ok(());
        }

        let mut restored = Vec::new();
        for session in remote {
            if self.ledger.contains(&session.name) {
                continue;
            }
            let job_id = resolved
                .iter()
                .find(|(_, name)| name == &session.name)
                .map(|(job, _)| job.clone())
                // Session predates the current suite contents; track it
                // under its own name so it still gets driven to terminal.
                .unwrap_or_else(|| session.name.clone());

            let has_artifacts = dir_has_entries(&self.config.session_dir(&session.name));
            let state = infer_restored_state(session.status, has_artifacts);
            debug!(
                "Restoring {} as {} (remote: {:?}, local artifacts: {})",
                session.name, state, session.status, has_artifacts
            );
            let mut record = SessionRecord::restored(job_id, session.name, state);
            if state == SessionState::Failed {
                record.error = Some("Remote session reported failed".to_string());
            }
            restored.push(record);
        }
        let count = self.ledger.insert_missing(restored)?;
        if count > 0 {
            info!("Restored {} session records from the remote system", count);
        }
        Ok(())
    }

    /// Explicit retry policy: a plain rerun skips `FAILED` records; with
    /// `--retry-failed` each one is replaced by a fresh record so the
    /// set-once timestamp rule holds per attempt.
    fn reset_failed(&self) -> Result<(), EngineError> {
        let failed: Vec<SessionRecord> = self
            .ledger
            .records()
            .into_iter()
            .filter(|record| record.state == SessionState::Failed)
            .collect();
        if failed.is_empty() {
            return Ok(());
        }
        info!("Retrying {} previously failed sessions", failed.len());
        for record in failed {
            self.ledger
                .replace(SessionRecord::new(record.job_id, record.session_name))?;
        }
        Ok(())
    }

    /// Work order: resolved suite order first, then restored extras.
    fn build_queue(&self, resolved: &[(String, String)]) -> VecDeque<String> {
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();
        for (_, name) in resolved {
            if seen.insert(name.clone()) {
                if let Some(record) = self.ledger.get(name) {
                    if !record.state.is_terminal() {
                        queue.push_back(name.clone());
                    }
                }
            }
        }
        let mut extras: Vec<String> = self
            .ledger
            .records()
            .into_iter()
            .filter(|record| {
                !record.state.is_terminal() && !seen.contains(&record.session_name)
            })
            .map(|record| record.session_name)
            .collect();
        extras.sort();
        queue.extend(extras);
        queue
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn infer_restored_state(remote: RemoteSessionState, has_artifacts: bool) -> SessionState {
    if has_artifacts {
        return SessionState::Downloaded;
    }
    match remote {
        RemoteSessionState::Completed => SessionState::Completed,
        RemoteSessionState::Failed => SessionState::Failed,
        RemoteSessionState::Pending
        | RemoteSessionState::InProgress
        | RemoteSessionState::Unknown => SessionState::Submitted,
    }
}

// ============================================================================
// Worker pool
// ============================================================================

async fn worker_loop(ctx: Arc<WorkerCtx>) -> Result<(), EngineError> {
    while !ctx.shutdown.is_cancelled() {
        let Some(name) = ctx.next_session() else {
            return Ok(());
        };
        drive_session(&ctx, &name).await?;
    }
    Ok(())
}

/// Advance one record until it is terminal or shutdown is requested.
/// The record is owned by this worker for the whole sequence.
async fn drive_session(ctx: &WorkerCtx, name: &str) -> Result<(), EngineError> {
    loop {
        let Some(record) = ctx.ledger.get(name) else {
            return Ok(());
        };
        match record.state.stage() {
            Stage::Done => {
                ctx.progress.on_terminal(&ctx.ledger.counts());
                return Ok(());
            }
            Stage::Submit => submit_stage(ctx, &record).await?,
            Stage::Monitor => {
                if !monitor_stage(ctx, &record).await? {
                    // Interrupted mid-monitoring; state is persisted.
                    return Ok(());
                }
            }
            Stage::Download => download_stage(ctx, &record).await?,
            Stage::Collect => collect_stage(ctx, &record).await?,
        }
        if ctx.shutdown.is_cancelled() {
            let terminal = ctx
                .ledger
                .get(name)
                .map(|record| record.state.is_terminal())
                .unwrap_or(true);
            if terminal {
                ctx.progress.on_terminal(&ctx.ledger.counts());
            }
            return Ok(());
        }
    }
}

async fn submit_stage(ctx: &WorkerCtx, record: &SessionRecord) -> Result<(), EngineError> {
    let name = record.session_name.as_str();
    ctx.ledger
        .update(name, |r| r.state = SessionState::Submitting)?;
    debug!("Submitting {} ({})", name, record.job_id);
    match ctx.client.submit(&record.job_id, name).await {
        Ok(()) => {
            ctx.ledger.update(name, |r| r.note_submitted(Utc::now()))?;
            info!("Submitted {}", name);
        }
        Err(err) => {
            warn!("Submit failed for {}: {}", name, err);
            ctx.ledger
                .update(name, |r| r.fail(format!("Submit failed: {err}")))?;
        }
    }
    Ok(())
}

/// Poll until the remote session is terminal. Returns `false` when the
/// wait was interrupted by shutdown (record left non-terminal).
async fn monitor_stage(ctx: &WorkerCtx, record: &SessionRecord) -> Result<bool, EngineError> {
    let name = record.session_name.as_str();
    if record.state == SessionState::Submitted {
        ctx.ledger
            .update(name, |r| r.state = SessionState::Monitoring)?;
    }
    loop {
        if ctx.shutdown.is_cancelled() {
            return Ok(false);
        }
        match ctx.client.status(name).await {
            Err(err) => {
                warn!("Status check failed for {}: {}", name, err);
                ctx.ledger
                    .update(name, |r| r.fail(format!("Status check failed: {err}")))?;
                return Ok(true);
            }
            Ok(None) => {
                debug!("Session {} not visible remotely yet", name);
            }
            Ok(Some(status)) => {
                let totals = status.run_totals();
                match status.outcome() {
                    PollOutcome::Completed => {
                        ctx.ledger.update(name, |r| {
                            r.observe_runs(&totals);
                            r.note_completed(Utc::now());
                        })?;
                        info!(
                            "Session {} completed: {}/{} runs succeeded, {} failed",
                            name, totals.succeeded, totals.total, totals.failed
                        );
                        return Ok(true);
                    }
                    PollOutcome::Failed => {
                        ctx.ledger.update(name, |r| {
                            r.observe_runs(&totals);
                            r.fail("Remote session reported failed");
                        })?;
                        warn!("Session {} failed remotely", name);
                        return Ok(true);
                    }
                    PollOutcome::StillRunning => {
                        ctx.ledger.update(name, |r| r.observe_runs(&totals))?;
                        debug!(
                            "Session {}: {}/{} runs done, {} in progress, {} pending",
                            name,
                            totals.succeeded + totals.failed,
                            totals.total,
                            totals.in_progress,
                            totals.pending
                        );
                    }
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(ctx.config.poll_interval) => {}
            _ = ctx.shutdown.cancelled() => return Ok(false),
        }
    }
}

async fn download_stage(ctx: &WorkerCtx, record: &SessionRecord) -> Result<(), EngineError> {
    let name = record.session_name.as_str();
    ctx.ledger
        .update(name, |r| r.state = SessionState::Downloading)?;
    let dest = ctx.config.session_dir(name);
    if !ctx.config.dry_run {
        if let Err(err) = fs::create_dir_all(&dest) {
            ctx.ledger
                .update(name, |r| r.fail(format!("Download failed: {err}")))?;
            return Ok(());
        }
    }
    match ctx.client.download(name, &dest).await {
        Ok(()) => {
            // Zero artifacts is a valid outcome; the collect stage decides
            // what (if anything) lands in the catalog.
            ctx.ledger.update(name, |r| r.note_downloaded(Utc::now()))?;
            info!("Downloaded {} -> {}", name, dest.display());
        }
        Err(err) => {
            warn!("Download failed for {}: {}", name, err);
            ctx.ledger
                .update(name, |r| r.fail(format!("Download failed: {err}")))?;
        }
    }
    Ok(())
}

async fn collect_stage(ctx: &WorkerCtx, record: &SessionRecord) -> Result<(), EngineError> {
    let name = record.session_name.as_str();
    ctx.ledger.update(name, |r| r.state = SessionState::Copying)?;
    match &ctx.catalog {
        None => {
            // Dry run: the copy is simulated wholesale.
            ctx.ledger.update(name, |r| r.note_finished(Utc::now()))?;
        }
        Some(catalog) => match catalog.collect_session(&ctx.config.session_dir(name)) {
            Ok(stats) => {
                ctx.ledger.update(name, |r| r.note_finished(Utc::now()))?;
                info!(
                    "Finished {}: {} artifacts cataloged, {} skipped",
                    name, stats.cataloged, stats.skipped
                );
            }
            Err(err) => {
                warn!("Cataloging failed for {}: {}", name, err);
                ctx.ledger
                    .update(name, |r| r.fail(format!("Cataloging failed: {err}")))?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restored_state_prefers_local_artifacts() {
        assert_eq!(
            infer_restored_state(RemoteSessionState::Completed, true),
            SessionState::Downloaded
        );
        assert_eq!(
            infer_restored_state(RemoteSessionState::InProgress, true),
            SessionState::Downloaded
        );
    }

    #[test]
    fn restored_state_follows_remote_when_no_artifacts() {
        assert_eq!(
            infer_restored_state(RemoteSessionState::Completed, false),
            SessionState::Completed
        );
        assert_eq!(
            infer_restored_state(RemoteSessionState::Failed, false),
            SessionState::Failed
        );
        assert_eq!(
            infer_restored_state(RemoteSessionState::InProgress, false),
            SessionState::Submitted
        );
        assert_eq!(
            infer_restored_state(RemoteSessionState::Pending, false),
            SessionState::Submitted
        );
    }
}
