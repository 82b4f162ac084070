//! Event classification: raw channel frame → [`ConversationRecord`].
//!
//! Classification never fails on malformed input (those frames become
//! [`EventKind::Unknown`]). The only rejection is attribution: a frame that
//! names no agent, and for which the caller supplied no channel hint, is
//! reported as [`AttributionError`] instead of being assigned to a default.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::fingerprint::{fingerprint_raw, fingerprint_value};
use crate::types::{AgentId, ConversationRecord, EventDetail, EventKind, ToolCall};

/// Frame could not be attributed to an agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("frame {event:?} ({kind}) carries no agent_id")]
pub struct AttributionError {
    pub event: String,
    pub kind: EventKind,
    pub fingerprint: String,
}

/// Map a wire `event` discriminator to its kind. Legacy names emitted by
/// older single-agent backends are accepted alongside the current ones.
pub fn kind_for_event(event: &str) -> EventKind {
    match event {
        "conversational_agent_started" | "agent_started" => EventKind::AgentStarted,
        "conversational_agent_completed" | "agent_completed" => EventKind::AgentCompleted,
        "conversational_agent_message" => EventKind::ConversationalMessage,
        "agent_message" => EventKind::DirectMessage,
        "user_message" => EventKind::UserMessage,
        "task_agent_started" => EventKind::TaskStarted,
        "task_agent_completed" => EventKind::TaskCompleted,
        "task_agent_step_started" | "agent_step_started" => EventKind::TaskStepStarted,
        "task_agent_step_tool_selected" | "agent_step_tool_selected" => {
            EventKind::TaskStepToolSelected
        }
        "task_agent_step_tool_completed" => EventKind::TaskStepToolCompleted,
        "task_agent_step_completed" | "agent_step_completed" => EventKind::TaskStepCompleted,
        _ => EventKind::Unknown,
    }
}

/// Classify a raw frame.
///
/// `channel_hint` attributes frames that do not name an agent themselves;
/// an `agent_id` inside the frame always takes precedence.
pub fn classify(
    raw: &str,
    channel_hint: Option<&AgentId>,
    now: DateTime<Utc>,
) -> Result<ConversationRecord, AttributionError> {
    let parsed: Option<Value> = serde_json::from_str(raw).ok();

    let Some(frame) = parsed else {
        let fingerprint = fingerprint_raw(raw);
        return match channel_hint {
            Some(agent_id) => Ok(ConversationRecord {
                fingerprint,
                kind: EventKind::Unknown,
                agent_id: agent_id.clone(),
                event: String::new(),
                payload: Value::String(raw.to_owned()),
                detail: EventDetail::default(),
                received_order: 0,
                received_at: now,
            }),
            None => Err(AttributionError {
                event: String::new(),
                kind: EventKind::Unknown,
                fingerprint,
            }),
        };
    };

    let event = frame
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let kind = kind_for_event(&event);
    let fingerprint = fingerprint_value(&frame);
    let data = frame.get("data").cloned().unwrap_or(Value::Null);

    let agent_id = match frame_agent_id(&data) {
        Some(id) => id,
        None => match channel_hint {
            Some(hint) => hint.clone(),
            None => {
                return Err(AttributionError {
                    event,
                    kind,
                    fingerprint,
                });
            }
        },
    };

    Ok(ConversationRecord {
        fingerprint,
        kind,
        agent_id,
        event,
        detail: extract_detail(&data),
        payload: frame,
        received_order: 0,
        received_at: now,
    })
}

/// `data.agent_id` when it is a non-empty string.
fn frame_agent_id(data: &Value) -> Option<AgentId> {
    data.get("agent_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(AgentId::from)
}

/// Pull the displayable fields out of a frame's `data` object.
pub fn extract_detail(data: &Value) -> EventDetail {
    let step = data.get("step");

    // `message` is plain text for conversational events and a serialized
    // conversation message object for direct agent messages.
    let message = match data.get("message") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("message").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
    .or_else(|| step.and_then(|s| string_field(s, "message")));

    let tool = step
        .and_then(|s| s.get("function"))
        .and_then(|function| {
            let name = function.get("name").and_then(Value::as_str)?.trim();
            if name.is_empty() {
                return None;
            }
            Some(ToolCall {
                name: name.to_owned(),
                label: tool_label(name),
                arguments: function.get("arguments").cloned().unwrap_or(Value::Null),
            })
        });

    let total_cost = data
        .get("total_cost")
        .or_else(|| step.and_then(|s| s.get("total_cost")))
        .and_then(Value::as_f64);

    EventDetail {
        message,
        tool,
        output: step.and_then(|s| string_field(s, "output")),
        error: step.and_then(|s| string_field(s, "error")),
        exit: step.and_then(|s| s.get("exit")).and_then(Value::as_bool),
        total_cost,
    }
}

/// Human label for a tool name: `file_write` → `FILE WRITE`.
pub fn tool_label(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// String field, or the JSON text of a non-null structured value.
fn string_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
