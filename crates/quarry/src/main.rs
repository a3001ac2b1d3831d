//! Quarry launcher.
//!
//! Drives a CodeQL query suite through GitHub multi-repository variant
//! analysis: one remote session per query, bounded concurrency, state
//! persisted after every transition so an interrupted run resumes where
//! it left off.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "quarry", about = "Run a CodeQL query suite at fleet scale via MRVA")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit, monitor, download, and catalog every query in a suite
    Run {
        /// Query suite: a pack reference or a path to a .qls file
        #[arg(long, env = "QUARRY_QUERY_SUITE")]
        query_suite: String,

        /// Base directory for state, downloads, and cataloged results
        #[arg(long, env = "QUARRY_OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Prefix for remote session names (e.g. t1-misra-cpp-default)
        #[arg(long, env = "QUARRY_SESSION_PREFIX")]
        session_prefix: String,

        /// Analysis language
        #[arg(long, env = "QUARRY_LANGUAGE",
              value_parser = ["cpp", "c", "java", "javascript", "python", "go", "csharp"])]
        language: String,

        /// Repository list to analyze (e.g. cpp_top_1000)
        #[arg(long, env = "QUARRY_REPOSITORY_LIST")]
        repository_list: String,

        /// Maximum concurrent sessions
        #[arg(long, default_value_t = 20)]
        max_concurrent: usize,

        /// Seconds between remote status checks
        #[arg(long, default_value_t = 300)]
        poll_interval: u64,

        /// Simulate every step without remote calls or filesystem writes
        #[arg(long)]
        dry_run: bool,

        /// Retry sessions a previous run left in FAILED
        #[arg(long)]
        retry_failed: bool,
    },

    /// Summarize the persisted state of a run
    Status {
        /// Base directory the run was pointed at
        #[arg(long, env = "QUARRY_OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Session prefix of the run
        #[arg(long, env = "QUARRY_SESSION_PREFIX")]
        session_prefix: String,

        /// Only list failed sessions
        #[arg(long)]
        failed: bool,

        /// Maximum records to list
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    match dispatch(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: Cli) -> anyhow::Result<ExitCode> {
    match args.command {
        Commands::Run {
            query_suite,
            output_dir,
            session_prefix,
            language,
            repository_list,
            max_concurrent,
            poll_interval,
            dry_run,
            retry_failed,
        } => cli::run::run(cli::run::RunArgs {
            query_suite,
            output_dir,
            session_prefix,
            language,
            repository_list,
            max_concurrent,
            poll_interval,
            dry_run,
            retry_failed,
            verbose: args.verbose,
        }),
        Commands::Status {
            output_dir,
            session_prefix,
            failed,
            limit,
            json,
        } => cli::status::run(cli::status::StatusArgs {
            output_dir,
            session_prefix,
            failed,
            limit,
            json,
            verbose: args.verbose,
        }),
    }
}
