//! Serializable read snapshots for machine consumers (`watch --json`,
//! `history --json`).

use chrono::{DateTime, Utc};
use serde::Serialize;

use bondlink_core::conversation::AgentConversation;
use bondlink_core::types::{AgentId, AgentState, ConversationRecord, EventKind};

use crate::engine::StateVersion;

// ─── Agent Snapshot ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub state: AgentState,
    pub is_working: bool,
    /// Progress caption, empty when there is none.
    pub caption: String,
    pub log_len: usize,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_kind: Option<EventKind>,
    /// Most recent message text in the log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Latest reported cumulative cost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl AgentSnapshot {
    pub fn from_conversation(conv: &AgentConversation) -> Self {
        let log = conv.log();
        Self {
            agent_id: conv.agent_id().clone(),
            state: conv.state(),
            is_working: conv.is_working(),
            caption: conv.caption().to_owned(),
            log_len: log.len(),
            steps: conv.steps().to_vec(),
            last_kind: log.last().map(|r| r.kind),
            last_message: latest(log, |r| r.detail.message.clone()),
            total_cost: latest(log, |r| r.detail.total_cost),
        }
    }
}

fn latest<T>(log: &[ConversationRecord], f: impl Fn(&ConversationRecord) -> Option<T>) -> Option<T> {
    log.iter().rev().find_map(f)
}

// ─── Session Snapshot ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub version: StateVersion,
    pub generated_at: DateTime<Utc>,
    /// Sorted by agent id.
    pub agents: Vec<AgentSnapshot>,
    pub diagnostics_total: u64,
}

impl SessionSnapshot {
    pub fn agent(&self, agent: &AgentId) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| &a.agent_id == agent)
    }

    pub fn working_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_working).count()
    }
}
