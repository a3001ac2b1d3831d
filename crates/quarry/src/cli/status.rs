//! Status command - summarize a run's persisted state.
//!
//! Read-only: inspects the state snapshot file and never contacts the
//! remote system, so it is safe to use while a run is active.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use quarry_logging::{init_logging, LogConfig};
use quarry_protocol::{SessionRecord, SessionState};
use quarry_state::StateSnapshot;

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_datetime, print_table_colored, state_color, truncate_string};

/// Arguments for the status command
pub struct StatusArgs {
    pub output_dir: PathBuf,
    pub session_prefix: String,
    pub failed: bool,
    pub limit: usize,
    pub json: bool,
    pub verbose: bool,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    state_file: String,
    suite: &'a str,
    prefix: &'a str,
    language: &'a str,
    repository_list: &'a str,
    updated_at: &'a Option<DateTime<Utc>>,
    counts: BTreeMap<&'static str, usize>,
    records: Vec<&'a SessionRecord>,
}

/// Execute the status command
pub fn run(args: StatusArgs) -> Result<ExitCode> {
    init_logging(LogConfig {
        verbose: args.verbose,
        log_dir: None,
    })?;

    let path = args
        .output_dir
        .join(format!("{}_state.json", args.session_prefix));
    if !path.exists() {
        return Err(HelpfulError::state_not_found(&path).into());
    }
    let contents = fs::read_to_string(&path)
        .map_err(|err| HelpfulError::state_unreadable(&path, &err.to_string()))?;
    let snapshot: StateSnapshot = serde_json::from_str(&contents)
        .map_err(|err| HelpfulError::state_unreadable(&path, &err.to_string()))?;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for record in &snapshot.records {
        *counts.entry(record.state.as_str()).or_default() += 1;
    }

    let mut records: Vec<&SessionRecord> = snapshot
        .records
        .iter()
        .filter(|record| !args.failed || record.state == SessionState::Failed)
        .collect();
    records.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    records.truncate(args.limit);

    if args.json {
        let output = StatusOutput {
            state_file: path.display().to_string(),
            suite: &snapshot.suite,
            prefix: &snapshot.prefix,
            language: &snapshot.language,
            repository_list: &snapshot.repository_list,
            updated_at: &snapshot.updated_at,
            counts,
            records,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("RUN STATE ({})", path.display());
    println!("  Suite:           {}", snapshot.suite);
    println!("  Repository list: {}", snapshot.repository_list);
    if let Some(updated_at) = &snapshot.updated_at {
        println!("  Updated:         {}", format_datetime(updated_at));
    }
    println!();
    for state in SessionState::all() {
        let count = counts.get(state.as_str()).copied().unwrap_or(0);
        if count > 0 {
            println!("  {:<12} {:>6}", state.to_string(), count);
        }
    }
    println!("  {:<12} {:>6}", "TOTAL", snapshot.records.len());
    println!();

    if records.is_empty() {
        if args.failed {
            println!("No failed sessions.");
        } else {
            println!("No sessions recorded.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    print_records_table(&records, args.limit);
    Ok(ExitCode::SUCCESS)
}

fn print_records_table(records: &[&SessionRecord], limit: usize) {
    println!("SESSIONS (showing {})", limit.min(records.len()));

    let headers = &["QUERY", "STATE", "RUNS", "SUBMITTED", "ERROR"];
    let rows = records
        .iter()
        .map(|record| {
            let runs = if record.run_count > 0 {
                format!(
                    "{}/{} ok, {} failed",
                    record.succeeded_count, record.run_count, record.failed_count
                )
            } else {
                "-".to_string()
            };
            let submitted = record
                .submitted_at
                .as_ref()
                .map(format_datetime)
                .unwrap_or_else(|| "-".to_string());
            let error = record
                .error
                .as_deref()
                .map(|e| truncate_string(e, 48))
                .unwrap_or_else(|| "-".to_string());

            vec![
                (truncate_string(&record.job_id, 48), None),
                (
                    record.state.to_string(),
                    Some(state_color(record.state)),
                ),
                (runs, None),
                (submitted, None),
                (error, None),
            ]
        })
        .collect();

    print_table_colored(headers, rows);
}
