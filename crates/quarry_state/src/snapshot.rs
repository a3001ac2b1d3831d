//! Persisted snapshot schema.

use chrono::{DateTime, Utc};
use quarry_protocol::SessionRecord;
use serde::{Deserialize, Serialize};

/// On-disk representation of a run: metadata plus every session record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub suite: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub repository_list: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records: Vec<SessionRecord>,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tolerates_missing_fields() {
        let snapshot: StateSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.updated_at.is_none());
    }

    #[test]
    fn snapshot_roundtrips_records() {
        let mut snapshot = StateSnapshot {
            suite: "misra-cpp-default.qls".into(),
            prefix: "t1-misra-cpp".into(),
            language: "cpp".into(),
            repository_list: "cpp_top_1000".into(),
            updated_at: Some(Utc::now()),
            records: vec![SessionRecord::new("a.ql", "t1-a-00000000")],
        };
        snapshot.records[0].run_count = 3;

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.records.len(), 1);
        assert_eq!(back.records[0].run_count, 3);
        assert_eq!(back.prefix, "t1-misra-cpp");
    }
}
