use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

// ─── Agent Identity ───────────────────────────────────────────────

/// Opaque agent identifier, stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used for compact display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ─── Event Kind ───────────────────────────────────────────────────

/// Closed taxonomy of channel events. Every inbound frame maps to exactly one.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStarted,
    AgentCompleted,
    ConversationalMessage,
    DirectMessage,
    UserMessage,
    TaskStepStarted,
    TaskStepToolSelected,
    TaskStepToolCompleted,
    TaskStepCompleted,
    TaskStarted,
    TaskCompleted,
    #[default]
    Unknown,
}

impl EventKind {
    pub const ALL: [Self; 12] = [
        Self::AgentStarted,
        Self::AgentCompleted,
        Self::ConversationalMessage,
        Self::DirectMessage,
        Self::UserMessage,
        Self::TaskStepStarted,
        Self::TaskStepToolSelected,
        Self::TaskStepToolCompleted,
        Self::TaskStepCompleted,
        Self::TaskStarted,
        Self::TaskCompleted,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentStarted => "agent_started",
            Self::AgentCompleted => "agent_completed",
            Self::ConversationalMessage => "conversational_message",
            Self::DirectMessage => "direct_message",
            Self::UserMessage => "user_message",
            Self::TaskStepStarted => "task_step_started",
            Self::TaskStepToolSelected => "task_step_tool_selected",
            Self::TaskStepToolCompleted => "task_step_tool_completed",
            Self::TaskStepCompleted => "task_step_completed",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::Unknown => "unknown",
        }
    }

    /// Agent-authored chat messages (they end a pending reply).
    pub fn is_agent_message(self) -> bool {
        matches!(self, Self::ConversationalMessage | Self::DirectMessage)
    }

    /// Events emitted while a task is being executed.
    pub fn is_task_progress(self) -> bool {
        matches!(
            self,
            Self::TaskStarted
                | Self::TaskStepStarted
                | Self::TaskStepToolSelected
                | Self::TaskStepToolCompleted
                | Self::TaskStepCompleted
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownEventKind(s.to_owned()))
    }
}

// ─── Agent State ──────────────────────────────────────────────────

/// Per-agent lifecycle state. Exactly one is current at any time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Starting,
    Running,
    Working,
    Stopped,
    Completed,
}

impl AgentState {
    pub const ALL: [Self; 6] = [
        Self::Idle,
        Self::Starting,
        Self::Running,
        Self::Working,
        Self::Stopped,
        Self::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Working => "working",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }

    /// A request is in flight and a reply is pending.
    pub fn is_working(self) -> bool {
        matches!(self, Self::Starting | Self::Working)
    }

    /// Terminal for the session until the agent is started again.
    pub fn is_halted(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Conversation Record ──────────────────────────────────────────

/// Tool invocation extracted from a task step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Raw tool name as sent by the backend (`file_write`).
    pub name: String,
    /// Human label (`FILE WRITE`).
    pub label: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Fields pulled out of the frame's `data` object during classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

/// A classified, attributed channel event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// SHA-256 over the normalized `event` + `data` payload.
    pub fingerprint: String,
    pub kind: EventKind,
    pub agent_id: AgentId,
    /// Raw `event` discriminator (empty when the frame did not parse).
    #[serde(default)]
    pub event: String,
    /// Parsed frame, or the raw text for frames that failed to parse.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub detail: EventDetail,
    /// Arrival position assigned by the engine.
    #[serde(default)]
    pub received_order: u64,
    pub received_at: DateTime<Utc>,
}

// ─── Backend Agent ────────────────────────────────────────────────

/// Agent descriptor returned by the backend REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    #[serde(default)]
    pub name: Option<String>,
    /// Backend-reported state string (`AGENT_STATE_RUNNING`, ...).
    #[serde(default)]
    pub state: String,
}

impl Agent {
    /// Backend name, or a stable name derived from the id.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => format!("Agent {}", self.agent_id.short()),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),
}
