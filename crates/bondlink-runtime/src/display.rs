//! Display helpers for CLI output: change lines, agent rows, log entries.

use bondlink_core::types::{Agent, AgentId, ConversationRecord, EventKind};
use bondlink_engine::{AgentChange, AgentSnapshot, ChangeKind};

const MESSAGE_WIDTH: usize = 72;

/// Right-truncate `text` to `max_chars` characters, appending `…` if truncated.
/// Newlines are flattened to spaces.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}

pub fn change_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::RecordAppended => "event",
        ChangeKind::HistoryLoaded => "history",
        ChangeKind::Started => "started",
        ChangeKind::Stopped => "stopped",
        ChangeKind::Cleared => "cleared",
        ChangeKind::Tracked => "tracked",
    }
}

/// One `watch` line: time, agent, change, state, caption and event kind,
/// all as of the change.
pub fn format_change(change: &AgentChange) -> String {
    let mut line = format!(
        "{} {:<8} {:<7} {}",
        change.timestamp.format("%H:%M:%S"),
        change.agent_id.short(),
        change_label(change.kind),
        change.state,
    );
    if let Some(caption) = &change.caption {
        line.push_str(&format!(" ({caption})"));
    }
    if let Some(kind) = change.event_kind {
        line.push_str(&format!(" [{}]", kind.as_str()));
    }
    line
}

/// One `agents` row. `agent` is the backend view, `snapshot` the local one;
/// either may be missing.
pub fn format_agent_row(
    id: &AgentId,
    agent: Option<&Agent>,
    snapshot: Option<&AgentSnapshot>,
) -> String {
    let name = match agent {
        Some(a) => a.display_name(),
        None => format!("Agent {}", id.short()),
    };
    let backend_state = agent
        .map(|a| a.state.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("-");
    let (state, log_len) = match snapshot {
        Some(s) => (s.state.as_str(), s.log_len),
        None => ("-", 0),
    };
    let mut row = format!("{id}  {name:<16} {state:<9} {backend_state:<22} {log_len:>4} events");
    if let Some(s) = snapshot {
        if !s.caption.is_empty() {
            row.push_str(&format!("  {}", s.caption));
        }
    }
    row
}

/// Short text for a record: the message, the tool, or the raw event name.
pub fn record_summary(record: &ConversationRecord) -> String {
    if let Some(tool) = &record.detail.tool {
        return tool.label.clone();
    }
    if let Some(message) = &record.detail.message {
        return truncate(message, MESSAGE_WIDTH);
    }
    if let Some(error) = &record.detail.error {
        return format!("error: {}", truncate(error, MESSAGE_WIDTH));
    }
    if record.kind == EventKind::Unknown && !record.event.is_empty() {
        return format!("({})", record.event);
    }
    String::new()
}

/// One `history` line.
pub fn format_record(record: &ConversationRecord) -> String {
    let summary = record_summary(record);
    let head = format!(
        "{:>4} {} {:<24}",
        record.received_order,
        record.received_at.format("%Y-%m-%d %H:%M:%S"),
        record.kind.as_str(),
    );
    if summary.is_empty() {
        head.trim_end().to_string()
    } else {
        format!("{head} {summary}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondlink_core::types::{AgentState, EventDetail, ToolCall};
    use chrono::{TimeZone, Utc};

    fn record(kind: EventKind, detail: EventDetail) -> ConversationRecord {
        ConversationRecord {
            fingerprint: "f".into(),
            kind,
            agent_id: AgentId::new("A1"),
            event: kind.as_str().into(),
            payload: serde_json::Value::Null,
            detail,
            received_order: 3,
            received_at: Utc
                .with_ymd_and_hms(2026, 3, 1, 9, 30, 5)
                .single()
                .expect("valid datetime"),
        }
    }

    fn snapshot(state: AgentState, caption: &str) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: AgentId::new("agent-0123456789"),
            state,
            is_working: state.is_working(),
            caption: caption.into(),
            log_len: 4,
            steps: vec![],
            last_kind: Some(EventKind::TaskStepToolSelected),
            last_message: None,
            total_cost: None,
        }
    }

    #[test]
    fn truncate_flattens_and_marks_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 8), "line on\u{2026}");
        assert_eq!(truncate("  padded  ", 10), "padded");
        assert_eq!(truncate("ééééé", 3), "éé\u{2026}");
    }

    fn change(kind: ChangeKind, event_kind: Option<EventKind>, caption: Option<&str>) -> AgentChange {
        AgentChange {
            version: 1,
            agent_id: AgentId::new("agent-0123456789"),
            kind,
            state: AgentState::Working,
            event_kind,
            caption: caption.map(str::to_owned),
            timestamp: Utc
                .with_ymd_and_hms(2026, 3, 1, 9, 30, 5)
                .single()
                .expect("valid datetime"),
        }
    }

    #[test]
    fn change_line_shows_caption_and_kind() {
        let line = format_change(&change(
            ChangeKind::RecordAppended,
            Some(EventKind::TaskStepToolSelected),
            Some("Selecting Tool"),
        ));
        assert_eq!(
            line,
            "09:30:05 agent-01 event   working (Selecting Tool) [task_step_tool_selected]"
        );

        let bare = format_change(&change(ChangeKind::Started, None, None));
        assert_eq!(bare, "09:30:05 agent-01 started working");
    }

    #[test]
    fn agent_row_merges_backend_and_local_views() {
        let id = AgentId::new("agent-0123456789");
        let agent = Agent {
            agent_id: id.clone(),
            name: None,
            state: "AGENT_STATE_RUNNING".into(),
        };
        let snap = snapshot(AgentState::Working, "Working");
        let row = format_agent_row(&id, Some(&agent), Some(&snap));
        assert!(row.starts_with("agent-0123456789  Agent agent-01"));
        assert!(row.contains("working"));
        assert!(row.contains("AGENT_STATE_RUNNING"));
        assert!(row.ends_with("  Working"));

        let local_only = format_agent_row(&id, None, None);
        assert!(local_only.contains("Agent agent-01"));
        assert!(local_only.contains("   0 events"));
    }

    #[test]
    fn record_summary_prefers_tool_then_message() {
        let tool = record(
            EventKind::TaskStepToolSelected,
            EventDetail {
                tool: Some(ToolCall {
                    name: "file_write".into(),
                    label: "FILE WRITE".into(),
                    arguments: serde_json::Value::Null,
                }),
                message: Some("ignored".into()),
                ..EventDetail::default()
            },
        );
        assert_eq!(record_summary(&tool), "FILE WRITE");

        let msg = record(
            EventKind::ConversationalMessage,
            EventDetail {
                message: Some("hello\nthere".into()),
                ..EventDetail::default()
            },
        );
        assert_eq!(record_summary(&msg), "hello there");
        assert_eq!(
            format_record(&msg),
            "   3 2026-03-01 09:30:05 conversational_message   hello there"
        );

        let started = record(EventKind::TaskStarted, EventDetail::default());
        assert_eq!(format_record(&started), "   3 2026-03-01 09:30:05 task_started");
    }
}
