//! `gh mrva` backed client.
//!
//! Every operation is one subprocess invocation; retry policy lives with
//! the caller, not here.

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use quarry_protocol::{RemoteSession, SessionStatus};

use crate::{stderr_excerpt, ClientError, VariantAnalysisClient};

const GH: &str = "gh";

/// Client for the `gh` CLI with the `mrva` extension installed.
pub struct GhMrvaClient {
    language: String,
    repository_list: String,
}

impl GhMrvaClient {
    pub fn new(language: impl Into<String>, repository_list: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            repository_list: repository_list.into(),
        }
    }

    async fn run(args: &[&str]) -> Result<Output, ClientError> {
        debug!("Running: {} {}", GH, args.join(" "));
        Command::new(GH)
            .args(args)
            .output()
            .await
            .map_err(|source| ClientError::Spawn { program: GH, source })
    }
}

#[async_trait]
impl VariantAnalysisClient for GhMrvaClient {
    async fn submit(&self, job_id: &str, session_name: &str) -> Result<(), ClientError> {
        let output = Self::run(&[
            "mrva",
            "submit",
            "--language",
            &self.language,
            "--session",
            session_name,
            "--list",
            &self.repository_list,
            "--query",
            job_id,
        ])
        .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(command_failed(&output))
        }
    }

    async fn status(&self, session_name: &str) -> Result<Option<SessionStatus>, ClientError> {
        let output = Self::run(&["mrva", "status", "--json", "--session", session_name]).await?;
        if !output.status.success() {
            // The extension reports an unknown session as a failure; that
            // is "not yet visible remotely", not a client error.
            let stderr = stderr_excerpt(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(command_failed(&output));
        }
        parse_status(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(&self, session_name: &str, dest_dir: &Path) -> Result<(), ClientError> {
        let dest = dest_dir.to_string_lossy();
        let output = Self::run(&[
            "mrva",
            "download",
            "--session",
            session_name,
            "--output-dir",
            dest.as_ref(),
        ])
        .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(command_failed(&output))
        }
    }

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<RemoteSession>, ClientError> {
        let output = Self::run(&["mrva", "list", "--json"]).await?;
        if !output.status.success() {
            return Err(command_failed(&output));
        }
        parse_session_list(&String::from_utf8_lossy(&output.stdout), prefix)
    }
}

fn command_failed(output: &Output) -> ClientError {
    ClientError::CommandFailed {
        program: GH,
        status: output.status.to_string(),
        stderr: stderr_excerpt(&output.stderr),
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("no session")
}

/// The status JSON is an array with one element per matched session.
fn parse_status(stdout: &str) -> Result<Option<SessionStatus>, ClientError> {
    let sessions: Vec<SessionStatus> =
        serde_json::from_str(stdout.trim()).map_err(|err| ClientError::Malformed {
            program: GH,
            detail: format!("status JSON: {err}"),
        })?;
    Ok(sessions.into_iter().next())
}

fn parse_session_list(stdout: &str, prefix: &str) -> Result<Vec<RemoteSession>, ClientError> {
    let sessions: Vec<RemoteSession> =
        serde_json::from_str(stdout.trim()).map_err(|err| ClientError::Malformed {
            program: GH,
            detail: format!("list JSON: {err}"),
        })?;
    Ok(sessions
        .into_iter()
        .filter(|session| session.name.starts_with(prefix))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_protocol::{PollOutcome, RemoteSessionState};

    #[test]
    fn parse_status_takes_first_session() {
        let json = r#"[
            {"name": "t1-q-0", "status": "in_progress",
             "runs": [{"status": "succeeded"}, {"status": "pending"}]}
        ]"#;
        let status = parse_status(json).unwrap().unwrap();
        assert_eq!(status.status, RemoteSessionState::InProgress);
        assert_eq!(status.runs.len(), 2);
        assert_eq!(status.outcome(), PollOutcome::StillRunning);
    }

    #[test]
    fn parse_status_empty_array_is_none() {
        assert!(parse_status("[]").unwrap().is_none());
    }

    #[test]
    fn parse_status_rejects_garbage() {
        assert!(matches!(
            parse_status("mrva: boom"),
            Err(ClientError::Malformed { .. })
        ));
    }

    #[test]
    fn parse_session_list_filters_by_prefix() {
        let json = r#"[
            {"name": "t1-a-0", "status": "completed"},
            {"name": "t2-b-0", "status": "in_progress"},
            {"name": "t1-c-0", "status": "failed"}
        ]"#;
        let sessions = parse_session_list(json, "t1-").unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.name.starts_with("t1-")));
    }

    #[test]
    fn not_found_stderr_is_detected() {
        assert!(is_not_found("Error: session not found"));
        assert!(is_not_found("no session matches"));
        assert!(!is_not_found("network unreachable"));
    }
}
