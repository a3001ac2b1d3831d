//! Pipeline engine.
//!
//! Owns the session records for one run, reconciles them against the
//! remote system, and advances each record through
//! submit -> monitor -> download -> collect with a bounded worker pool.
//! State is persisted after every transition, so a killed run resumes
//! from the last persisted state without resubmitting or re-downloading.

pub mod collect;
pub mod engine;
pub mod progress;
pub mod shutdown;

pub use collect::{Catalog, CatalogError, CollectStats};
pub use engine::{Engine, EngineConfig, EngineError, FailedSession, RunSummary};
pub use progress::ProgressReporter;
pub use shutdown::ShutdownToken;
