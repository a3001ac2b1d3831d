//! Shared protocol types for the quarry pipeline.
//!
//! Everything that crosses a crate boundary lives here: the session
//! lifecycle enum, the persisted session record, the wire types decoded
//! from the remote variant-analysis CLI, deterministic session naming,
//! and artifact filename parsing.

pub mod artifact;
pub mod naming;
pub mod types;

pub use artifact::ArtifactKey;
pub use naming::session_name;
pub use types::{
    PollOutcome, RemoteRun, RemoteRunState, RemoteSession, RemoteSessionState, RunTotals,
    SessionRecord, SessionState, SessionStatus, Stage,
};
