//! bondlink-core: pure domain types and derivations.
//! Event taxonomy, classification of raw channel frames, content
//! fingerprints, dedup policy, and the per-agent state machine. No IO.

pub mod classify;
pub mod conversation;
pub mod fingerprint;
pub mod policy;
pub mod types;

pub use classify::{AttributionError, classify};
pub use conversation::{AgentConversation, AppendEffect, ControlAction};
pub use policy::DedupPolicy;
pub use types::{
    Agent, AgentId, AgentState, ConversationRecord, CoreError, EventDetail, EventKind, ToolCall,
};
