//! Shared session ledger.
//!
//! All record mutation goes through `update`, which applies the change and
//! persists the snapshot while holding the lock. Workers advance different
//! records concurrently, but persistence is strictly ordered; the on-disk
//! snapshot lags memory by at most the one transition currently in flight.

use chrono::Utc;
use quarry_protocol::{SessionRecord, SessionState};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::snapshot::StateSnapshot;
use crate::store::{StateError, StateStore};

/// Run metadata carried into every snapshot.
#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    pub suite: String,
    pub prefix: String,
    pub language: String,
    pub repository_list: String,
}

/// Per-state record counts, indexed by stage order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts([usize; 10]);

impl StateCounts {
    pub fn get(&self, state: SessionState) -> usize {
        self.0[state.rank() as usize]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn finished(&self) -> usize {
        self.get(SessionState::Finished)
    }

    pub fn failed(&self) -> usize {
        self.get(SessionState::Failed)
    }

    pub fn all_terminal(&self) -> bool {
        self.finished() + self.failed() == self.total()
    }
}

struct LedgerInner {
    meta: RunMeta,
    records: HashMap<String, SessionRecord>,
}

/// The engine's single shared mutable resource: the session set plus its
/// backing snapshot file, behind one writer lock.
pub struct SessionLedger {
    inner: Mutex<LedgerInner>,
    store: StateStore,
}

impl SessionLedger {
    /// Open the ledger, adopting any records from a previous run's
    /// snapshot. Run metadata always reflects the current invocation.
    pub fn open(store: StateStore, meta: RunMeta) -> Self {
        let snapshot = store.load();
        let records = snapshot
            .records
            .into_iter()
            .map(|record| (record.session_name.clone(), record))
            .collect();
        Self {
            inner: Mutex::new(LedgerInner { meta, records }),
            store,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session_name: &str) -> bool {
        self.lock().records.contains_key(session_name)
    }

    pub fn get(&self, session_name: &str) -> Option<SessionRecord> {
        self.lock().records.get(session_name).cloned()
    }

    /// All records, unordered.
    pub fn records(&self) -> Vec<SessionRecord> {
        self.lock().records.values().cloned().collect()
    }

    pub fn counts(&self) -> StateCounts {
        let inner = self.lock();
        let mut counts = StateCounts::default();
        for record in inner.records.values() {
            counts.0[record.state.rank() as usize] += 1;
        }
        counts
    }

    /// Insert records that are not yet present, then persist once.
    /// Existing records win; returns how many were actually inserted.
    pub fn insert_missing(
        &self,
        records: impl IntoIterator<Item = SessionRecord>,
    ) -> Result<usize, StateError> {
        let mut inner = self.lock();
        let mut inserted = 0;
        for record in records {
            inner
                .records
                .entry(record.session_name.clone())
                .or_insert_with(|| {
                    inserted += 1;
                    record
                });
        }
        if inserted > 0 {
            self.persist_locked(&inner)?;
        }
        Ok(inserted)
    }

    /// Replace a record wholesale (failed-record retry path), persisting.
    pub fn replace(&self, record: SessionRecord) -> Result<(), StateError> {
        let mut inner = self.lock();
        inner.records.insert(record.session_name.clone(), record);
        self.persist_locked(&inner)
    }

    /// Read-modify-persist in one critical section. Returns the updated
    /// record so callers can log the transition without re-locking.
    pub fn update<F>(&self, session_name: &str, mutate: F) -> Result<SessionRecord, StateError>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(session_name)
            .ok_or_else(|| StateError::UnknownSession(session_name.to_string()))?;
        mutate(record);
        let updated = record.clone();
        self.persist_locked(&inner)?;
        Ok(updated)
    }

    /// Persist the current state unconditionally.
    pub fn persist(&self) -> Result<(), StateError> {
        let inner = self.lock();
        self.persist_locked(&inner)
    }

    fn persist_locked(&self, inner: &LedgerInner) -> Result<(), StateError> {
        let snapshot = StateSnapshot {
            suite: inner.meta.suite.clone(),
            prefix: inner.meta.prefix.clone(),
            language: inner.meta.language.clone(),
            repository_list: inner.meta.repository_list.clone(),
            updated_at: Some(Utc::now()),
            records: inner.records.values().cloned().collect(),
        };
        self.store.save(&snapshot)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        // A poisoned lock means a worker panicked mid-mutation; the record
        // map is still structurally valid, so continue with it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
