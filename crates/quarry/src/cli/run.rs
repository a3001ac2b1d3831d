//! Run command - drive a query suite through the full pipeline.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use quarry_client::{
    CodeqlResolver, GhMrvaClient, SimulatedClient, SuiteResolver, VariantAnalysisClient,
};
use quarry_engine::{Engine, EngineConfig, RunSummary, ShutdownToken};
use quarry_logging::{init_logging, LogConfig};
use quarry_protocol::SessionState;

use crate::cli::error::HelpfulError;

/// Exit code when the run was interrupted and left resumable state.
const INTERRUPT_EXIT_CODE: u8 = 130;

/// Arguments for the run command
pub struct RunArgs {
    pub query_suite: String,
    pub output_dir: PathBuf,
    pub session_prefix: String,
    pub language: String,
    pub repository_list: String,
    pub max_concurrent: usize,
    pub poll_interval: u64,
    pub dry_run: bool,
    pub retry_failed: bool,
    pub verbose: bool,
}

/// Execute the run command
pub fn run(args: RunArgs) -> Result<ExitCode> {
    // Dry runs must not create the output tree, including the log file.
    let log_dir = (!args.dry_run).then(|| args.output_dir.join("logs"));
    init_logging(LogConfig {
        verbose: args.verbose,
        log_dir: log_dir.as_deref(),
    })?;

    if !args.dry_run {
        check_dependencies()?;
    }

    println!("quarry run");
    println!("  Suite:            {}", args.query_suite);
    println!("  Output directory: {}", args.output_dir.display());
    println!("  Session prefix:   {}", args.session_prefix);
    println!("  Language:         {}", args.language);
    println!("  Repository list:  {}", args.repository_list);
    println!("  Max concurrent:   {}", args.max_concurrent);
    println!("  Poll interval:    {}s", args.poll_interval);
    if args.dry_run {
        println!("  DRY RUN: no remote calls, no filesystem writes");
    }
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let summary = runtime.block_on(run_async(&args))?;

    print_summary(&summary);
    Ok(exit_code(&summary))
}

async fn run_async(args: &RunArgs) -> Result<RunSummary> {
    let shutdown = ShutdownToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; letting in-flight operations finish");
            signal_token.cancel();
        }
    });

    let resolver: Arc<dyn SuiteResolver> = Arc::new(CodeqlResolver::new());
    let client: Arc<dyn VariantAnalysisClient> = if args.dry_run {
        Arc::new(SimulatedClient::new())
    } else {
        Arc::new(GhMrvaClient::new(
            args.language.clone(),
            args.repository_list.clone(),
        ))
    };

    let config = EngineConfig {
        suite: args.query_suite.clone(),
        output_dir: args.output_dir.clone(),
        prefix: args.session_prefix.clone(),
        language: args.language.clone(),
        repository_list: args.repository_list.clone(),
        max_concurrent: args.max_concurrent,
        poll_interval: Duration::from_secs(args.poll_interval),
        dry_run: args.dry_run,
        retry_failed: args.retry_failed,
    };

    let engine = Engine::new(config, resolver, client, shutdown)?;
    Ok(engine.run().await?)
}

fn check_dependencies() -> Result<()> {
    which::which("gh").map_err(|_| {
        HelpfulError::missing_dependency("gh", "submit and download variant-analysis sessions")
            .with_suggestion("TRY: gh extension install github/gh-mrva")
    })?;
    which::which("codeql")
        .map_err(|_| HelpfulError::missing_dependency("codeql", "resolve queries from the suite"))?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("RUN SUMMARY");
    for state in SessionState::all() {
        let count = summary.counts.get(state);
        if count > 0 {
            println!("  {:<12} {:>6}", state.to_string(), count);
        }
    }
    println!("  {:<12} {:>6}", "TOTAL", summary.counts.total());

    if summary.has_failures() {
        println!();
        println!("FAILED SESSIONS");
        for failure in &summary.failures {
            println!("  {}", failure.job_id);
            println!("    {}", failure.error);
        }
    }

    if summary.interrupted {
        println!();
        println!("Interrupted - rerun with the same arguments to resume.");
    }
}

/// Exit 0 only when no record ended FAILED; 130 flags an interrupt.
fn exit_code_for(summary: &RunSummary) -> u8 {
    if summary.interrupted {
        INTERRUPT_EXIT_CODE
    } else if summary.has_failures() {
        1
    } else {
        0
    }
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    ExitCode::from(exit_code_for(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_engine::FailedSession;
    use quarry_state::StateCounts;

    fn summary(failures: Vec<FailedSession>, interrupted: bool) -> RunSummary {
        RunSummary {
            counts: StateCounts::default(),
            failures,
            interrupted,
        }
    }

    #[test]
    fn clean_run_exits_zero() {
        assert_eq!(exit_code_for(&summary(vec![], false)), 0);
    }

    #[test]
    fn failures_exit_nonzero() {
        let failed = FailedSession {
            job_id: "a.ql".into(),
            session_name: "t1-a-0".into(),
            error: "Submit failed".into(),
        };
        assert_eq!(exit_code_for(&summary(vec![failed], false)), 1);
    }

    #[test]
    fn interrupt_exits_130() {
        assert_eq!(exit_code_for(&summary(vec![], true)), 130);
    }
}
