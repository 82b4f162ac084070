//! In-memory ConversationStore. Used by tests and `--ephemeral` sessions.

use std::collections::BTreeMap;

use bondlink_core::types::{AgentId, ConversationRecord};

use crate::error::StoreError;
use crate::store::{AppendOutcome, ConversationStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    agents: BTreeMap<AgentId, Vec<StoredRecord>>,
}

#[derive(Debug)]
struct StoredRecord {
    dedup_key: Option<String>,
    record: ConversationRecord,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all agents.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.agents.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversationStore for MemoryStore {
    fn append(
        &mut self,
        agent: &AgentId,
        record: &ConversationRecord,
        dedup_key: Option<&str>,
    ) -> Result<AppendOutcome, StoreError> {
        let entries = self.agents.entry(agent.clone()).or_default();
        if let Some(key) = dedup_key {
            if entries.iter().any(|e| e.dedup_key.as_deref() == Some(key)) {
                return Ok(AppendOutcome::Duplicate);
            }
        }
        entries.push(StoredRecord {
            dedup_key: dedup_key.map(str::to_owned),
            record: record.clone(),
        });
        Ok(AppendOutcome::Appended)
    }

    fn read_all(&self, agent: &AgentId) -> Result<Vec<ConversationRecord>, StoreError> {
        Ok(self
            .agents
            .get(agent)
            .map(|entries| entries.iter().map(|e| e.record.clone()).collect())
            .unwrap_or_default())
    }

    fn remove(&mut self, agent: &AgentId) -> Result<usize, StoreError> {
        Ok(self.agents.remove(agent).map(|e| e.len()).unwrap_or(0))
    }

    fn agent_ids(&self) -> Result<Vec<AgentId>, StoreError> {
        Ok(self
            .agents
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect())
    }
}
