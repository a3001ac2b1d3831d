//! Simulated client for dry runs.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use quarry_protocol::{
    RemoteRun, RemoteRunState, RemoteSession, RemoteSessionState, SessionStatus,
};

use crate::{ClientError, VariantAnalysisClient};

/// Dry-run client: every operation succeeds immediately and nothing
/// leaves the process. Status reports a completed session with a single
/// succeeded run so the pipeline walks its full lifecycle.
#[derive(Debug, Default)]
pub struct SimulatedClient;

impl SimulatedClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VariantAnalysisClient for SimulatedClient {
    async fn submit(&self, job_id: &str, session_name: &str) -> Result<(), ClientError> {
        info!("[dry-run] Would submit {} as {}", job_id, session_name);
        Ok(())
    }

    async fn status(&self, _session_name: &str) -> Result<Option<SessionStatus>, ClientError> {
        Ok(Some(SessionStatus {
            status: RemoteSessionState::Completed,
            runs: vec![RemoteRun {
                status: RemoteRunState::Succeeded,
            }],
        }))
    }

    async fn download(&self, session_name: &str, dest_dir: &Path) -> Result<(), ClientError> {
        info!(
            "[dry-run] Would download {} into {}",
            session_name,
            dest_dir.display()
        );
        Ok(())
    }

    async fn list_sessions(&self, _prefix: &str) -> Result<Vec<RemoteSession>, ClientError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_protocol::PollOutcome;

    #[tokio::test]
    async fn simulated_status_completes_immediately() {
        let client = SimulatedClient::new();
        let status = client.status("t1-q-0").await.unwrap().unwrap();
        assert_eq!(status.outcome(), PollOutcome::Completed);
        assert_eq!(status.run_totals().succeeded, 1);
    }

    #[tokio::test]
    async fn simulated_download_touches_nothing() {
        let client = SimulatedClient::new();
        let dest = std::env::temp_dir().join("quarry-sim-never-created");
        client.download("t1-q-0", &dest).await.unwrap();
        assert!(!dest.exists());
    }
}
