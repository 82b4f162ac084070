//! bondlink-engine: multi-agent conversation synchronization.
//! Ingests raw channel frames, attributes and deduplicates them, drives the
//! per-agent state machines and writes through to the conversation store.
//! Exposes the read projection (accessors, snapshots, change tracking).

pub mod diagnostics;
pub mod engine;
pub mod snapshot;

pub use bondlink_core::types;
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsLog};
pub use engine::{
    AgentChange, ChangeKind, EngineConfig, HistoryReport, IngestOutcome, PersistStatus,
    StateVersion, SyncEngine,
};
pub use snapshot::{AgentSnapshot, SessionSnapshot};
