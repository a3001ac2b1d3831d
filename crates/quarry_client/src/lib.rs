//! External collaborator contracts.
//!
//! The engine never talks to the remote variant-analysis system or the
//! query resolver directly; it is handed a `SuiteResolver` and a
//! `VariantAnalysisClient` at construction time. The production
//! implementations shell out to the `codeql` and `gh` CLIs; dry runs get
//! the simulated client.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use quarry_protocol::{RemoteSession, SessionStatus};

pub mod gh;
pub mod resolver;
pub mod sim;

pub use gh::GhMrvaClient;
pub use resolver::CodeqlResolver;
pub use sim::SimulatedClient;

/// Failures from an external collaborator. Always a value, never a panic;
/// the engine decides whether a failure is fatal (resolution) or scoped to
/// one record (everything else).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: &'static str,
        status: String,
        stderr: String,
    },

    #[error("Unexpected {program} output: {detail}")]
    Malformed {
        program: &'static str,
        detail: String,
    },
}

/// Resolves a query suite into an ordered list of job ids.
#[async_trait]
pub trait SuiteResolver: Send + Sync {
    async fn resolve(&self, suite: &str) -> Result<Vec<String>, ClientError>;
}

/// Operations against the remote variant-analysis system.
#[async_trait]
pub trait VariantAnalysisClient: Send + Sync {
    /// Submit a job under `session_name`. Idempotent from the caller's
    /// perspective; the engine never calls this once a record is past
    /// `Submitted`.
    async fn submit(&self, job_id: &str, session_name: &str) -> Result<(), ClientError>;

    /// Fetch the session's status. `Ok(None)` means the session does not
    /// exist remotely yet - distinct from a client failure.
    async fn status(&self, session_name: &str) -> Result<Option<SessionStatus>, ClientError>;

    /// Download the session's artifacts into `dest_dir`. Zero artifacts is
    /// a valid, non-error outcome.
    async fn download(&self, session_name: &str, dest_dir: &Path) -> Result<(), ClientError>;

    /// List remote sessions under `prefix` (reconciliation only).
    async fn list_sessions(&self, prefix: &str) -> Result<Vec<RemoteSession>, ClientError>;
}

/// Cap stderr carried into error values; remote CLIs can be chatty.
pub(crate) fn stderr_excerpt(stderr: &[u8]) -> String {
    const MAX: usize = 500;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() > MAX {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated)", &text[..cut])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_excerpt_truncates_long_output() {
        let long = "x".repeat(1000);
        let excerpt = stderr_excerpt(long.as_bytes());
        assert!(excerpt.len() < 600);
        assert!(excerpt.ends_with("(truncated)"));
    }

    #[test]
    fn stderr_excerpt_trims_short_output() {
        assert_eq!(stderr_excerpt(b"  boom\n"), "boom");
    }
}
