//! ConversationStore trait: the persistence boundary the engine writes through.
//! Synchronous and mock-injectable; backends live in `sqlite` and `memory`.

use bondlink_core::types::{AgentId, ConversationRecord};

use crate::error::StoreError;

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// A record with the same dedup key is already stored for the agent.
    Duplicate,
}

/// Append-only per-agent record log.
///
/// `append` is idempotent under `dedup_key`: a second append with the same
/// key for the same agent is a no-op. Records appended without a key are
/// always stored. `read_all` returns records in original append order.
pub trait ConversationStore: Send {
    fn append(
        &mut self,
        agent: &AgentId,
        record: &ConversationRecord,
        dedup_key: Option<&str>,
    ) -> Result<AppendOutcome, StoreError>;

    fn read_all(&self, agent: &AgentId) -> Result<Vec<ConversationRecord>, StoreError>;

    /// Delete every record for the agent. Returns the number removed.
    fn remove(&mut self, agent: &AgentId) -> Result<usize, StoreError>;

    /// Agents with at least one stored record, sorted.
    fn agent_ids(&self) -> Result<Vec<AgentId>, StoreError>;
}

impl<T: ConversationStore + ?Sized> ConversationStore for Box<T> {
    fn append(
        &mut self,
        agent: &AgentId,
        record: &ConversationRecord,
        dedup_key: Option<&str>,
    ) -> Result<AppendOutcome, StoreError> {
        (**self).append(agent, record, dedup_key)
    }

    fn read_all(&self, agent: &AgentId) -> Result<Vec<ConversationRecord>, StoreError> {
        (**self).read_all(agent)
    }

    fn remove(&mut self, agent: &AgentId) -> Result<usize, StoreError> {
        (**self).remove(agent)
    }

    fn agent_ids(&self) -> Result<Vec<AgentId>, StoreError> {
        (**self).agent_ids()
    }
}
