//! Result cataloging.
//!
//! Downloaded artifacts are copied into a deterministic
//! `results/<prefix>/<org>/<repo>/<filename>` tree and recorded in a
//! plain-text manifest, one `org/repo/filename` line per artifact. The
//! manifest is set-backed: lines already present are never appended
//! again, so re-entering the copy stage after a crash is safe.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use quarry_protocol::ArtifactKey;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CatalogError + '_ {
    move |source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Outcome of cataloging one session's download directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub cataloged: usize,
    /// Files whose names did not match the artifact pattern.
    pub skipped: usize,
}

struct Manifest {
    path: PathBuf,
    seen: HashSet<String>,
}

impl Manifest {
    fn open(path: PathBuf) -> Result<Self, CatalogError> {
        let seen = match fs::read_to_string(&path) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(err) => return Err(io_err(&path)(err)),
        };
        Ok(Self { path, seen })
    }

    /// Append a line unless it is already present. Returns whether the
    /// line was new. The file itself is only created on first append.
    fn append(&mut self, line: &str) -> Result<bool, CatalogError> {
        if !self.seen.insert(line.to_string()) {
            return Ok(false);
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err(&self.path))?;
        writeln!(file, "{line}").map_err(io_err(&self.path))?;
        Ok(true)
    }
}

/// Content-addressed local result catalog shared by all workers.
pub struct Catalog {
    results_dir: PathBuf,
    manifest: Mutex<Manifest>,
}

impl Catalog {
    /// Open the catalog, creating the results root and loading any
    /// existing manifest entries.
    pub fn open(results_dir: PathBuf, manifest_path: PathBuf) -> Result<Self, CatalogError> {
        fs::create_dir_all(&results_dir).map_err(io_err(&results_dir))?;
        Ok(Self {
            results_dir,
            manifest: Mutex::new(Manifest::open(manifest_path)?),
        })
    }

    /// Copy every recognizable artifact in `session_dir` into the results
    /// tree and record it in the manifest. A missing or empty session
    /// directory is zero artifacts, not an error; files that do not match
    /// the `<org>_<repo>_<suffix>.<ext>` pattern are skipped.
    pub fn collect_session(&self, session_dir: &Path) -> Result<CollectStats, CatalogError> {
        let mut stats = CollectStats::default();
        let entries = match fs::read_dir(session_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(err) => return Err(io_err(session_dir)(err)),
        };

        for entry in entries {
            let entry = entry.map_err(io_err(session_dir))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                stats.skipped += 1;
                continue;
            };
            let Some(key) = ArtifactKey::parse(filename) else {
                debug!("Skipping non-artifact file: {}", filename);
                stats.skipped += 1;
                continue;
            };

            let dest_dir = self.results_dir.join(&key.org).join(&key.repo);
            fs::create_dir_all(&dest_dir).map_err(io_err(&dest_dir))?;
            let dest = dest_dir.join(filename);
            fs::copy(&path, &dest).map_err(io_err(&dest))?;

            let line = format!("{}/{}/{}", key.org, key.repo, filename);
            let mut manifest = self
                .manifest
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if manifest.append(&line)? {
                stats.cataloged += 1;
            } else {
                debug!("Manifest already lists {}", line);
                stats.cataloged += 1;
            }
        }

        if stats.cataloged > 0 || stats.skipped > 0 {
            info!(
                "Cataloged {} artifacts from {} ({} skipped)",
                stats.cataloged,
                session_dir.display(),
                stats.skipped
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_in(dir: &Path) -> Catalog {
        Catalog::open(dir.join("results"), dir.join("manifest.txt")).unwrap()
    }

    #[test]
    fn collect_copies_into_org_repo_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let session = tmp.path().join("sessions/t1-q-0");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("google_guava_q.sarif"), b"{}").unwrap();
        fs::write(session.join("torvalds_linux_q.sarif"), b"{}").unwrap();
        fs::write(session.join("README.md"), b"noise").unwrap();

        let catalog = catalog_in(tmp.path());
        let stats = catalog.collect_session(&session).unwrap();
        assert_eq!(stats.cataloged, 2);
        assert_eq!(stats.skipped, 1);

        assert!(tmp
            .path()
            .join("results/google/guava/google_guava_q.sarif")
            .exists());
        assert!(tmp
            .path()
            .join("results/torvalds/linux/torvalds_linux_q.sarif")
            .exists());

        let manifest = fs::read_to_string(tmp.path().join("manifest.txt")).unwrap();
        let mut lines: Vec<_> = manifest.lines().collect();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "google/guava/google_guava_q.sarif",
                "torvalds/linux/torvalds_linux_q.sarif",
            ]
        );
    }

    #[test]
    fn collect_missing_session_dir_is_zero_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(tmp.path());
        let stats = catalog
            .collect_session(&tmp.path().join("sessions/never-downloaded"))
            .unwrap();
        assert_eq!(stats, CollectStats::default());
        assert!(!tmp.path().join("manifest.txt").exists());
    }

    #[test]
    fn collect_twice_does_not_duplicate_manifest_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let session = tmp.path().join("sessions/t1-q-0");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("google_guava_q.sarif"), b"{}").unwrap();

        let catalog = catalog_in(tmp.path());
        catalog.collect_session(&session).unwrap();
        catalog.collect_session(&session).unwrap();

        let manifest = fs::read_to_string(tmp.path().join("manifest.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 1);
    }

    #[test]
    fn manifest_dedup_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let session = tmp.path().join("sessions/t1-q-0");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("google_guava_q.sarif"), b"{}").unwrap();

        catalog_in(tmp.path()).collect_session(&session).unwrap();
        // Fresh catalog, same manifest file: still no duplicate.
        catalog_in(tmp.path()).collect_session(&session).unwrap();

        let manifest = fs::read_to_string(tmp.path().join("manifest.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 1);
    }
}
