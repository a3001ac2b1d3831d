//! Snapshot file I/O.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::snapshot::StateSnapshot;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("State I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Reads and writes the snapshot file for one run prefix.
///
/// Writes are atomic: serialize to a sibling temp file, fsync, rename over
/// the target. A crash mid-write never corrupts the previous snapshot.
#[derive(Debug)]
pub struct StateStore {
    /// `None` in dry-run mode: loads are empty and saves are no-ops.
    path: Option<PathBuf>,
}

impl StateStore {
    /// Open a store rooted at `output_dir`, creating the directory tree.
    pub fn open(output_dir: &Path, prefix: &str) -> Result<Self, StateError> {
        fs::create_dir_all(output_dir).map_err(|source| StateError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: Some(output_dir.join(format!("{prefix}_state.json"))),
        })
    }

    /// A store that never touches the filesystem (dry-run).
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the snapshot. A missing file yields an empty snapshot; an
    /// unreadable or corrupt file is a recoverable condition — it is
    /// discarded with a warning (already-submitted sessions may be
    /// resubmitted, reconciliation will pick most of them back up).
    pub fn load(&self) -> StateSnapshot {
        let Some(path) = self.path.as_deref() else {
            return StateSnapshot::default();
        };
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return StateSnapshot::default();
            }
            Err(err) => {
                warn!("Could not read state file {}: {}", path.display(), err);
                return StateSnapshot::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    "State file {} is corrupt ({}); starting from an empty snapshot. \
                     Already-submitted sessions may be submitted again.",
                    path.display(),
                    err
                );
                StateSnapshot::default()
            }
        }
    }

    /// Atomically replace the snapshot file.
    pub fn save(&self, snapshot: &StateSnapshot) -> Result<(), StateError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = tmp_path(path);
        write_all_synced(&tmp, &bytes)?;
        fs::rename(&tmp, path).map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("state.json");
    path.with_file_name(format!(".{name}.tmp"))
}

fn write_all_synced(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_protocol::{SessionRecord, SessionState};

    #[test]
    fn load_missing_file_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "t1").unwrap();
        let snapshot = store.load();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "t1").unwrap();

        let mut snapshot = StateSnapshot {
            prefix: "t1".into(),
            ..StateSnapshot::default()
        };
        let mut record = SessionRecord::new("a.ql", "t1-a-0");
        record.state = SessionState::Submitted;
        snapshot.records.push(record);

        store.save(&snapshot).unwrap();
        let back = store.load();
        assert_eq!(back.records.len(), 1);
        assert_eq!(back.records[0].state, SessionState::Submitted);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "t1").unwrap();
        store.save(&StateSnapshot::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(store.path().unwrap().exists());
    }

    #[test]
    fn corrupt_file_recovers_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "t1").unwrap();
        fs::write(store.path().unwrap(), b"{ not json").unwrap();

        let snapshot = store.load();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn save_preserves_previous_snapshot_until_rename() {
        // A failed serialize must not clobber the existing file.
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "t1").unwrap();
        let snapshot = StateSnapshot {
            prefix: "t1".into(),
            ..StateSnapshot::default()
        };
        store.save(&snapshot).unwrap();
        let before = fs::read(store.path().unwrap()).unwrap();

        // Second save writes through the temp path; the target is valid JSON
        // at every observable point.
        store.save(&snapshot).unwrap();
        let after = fs::read(store.path().unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn disabled_store_never_touches_disk() {
        let store = StateStore::disabled();
        assert!(store.path().is_none());
        store.save(&StateSnapshot::default()).unwrap();
        assert!(store.load().is_empty());
    }
}
