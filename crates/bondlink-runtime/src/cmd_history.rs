//! `bondlink history`: rebuild one agent from the store and print it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bondlink_core::types::{AgentId, ConversationRecord};
use bondlink_engine::{AgentSnapshot, SyncEngine};

use crate::display;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    #[serde(flatten)]
    pub agent: AgentSnapshot,
    pub records: Vec<ConversationRecord>,
}

impl HistoryView {
    pub fn render(&self) -> String {
        let mut out = format!("agent  {}\nstate  {}", self.agent.agent_id, self.agent.state);
        if !self.agent.caption.is_empty() {
            out.push_str(&format!(" ({})", self.agent.caption));
        }
        if !self.agent.steps.is_empty() {
            out.push_str(&format!("\nsteps  {}", self.agent.steps.join(" \u{203a} ")));
        }
        if let Some(cost) = self.agent.total_cost {
            out.push_str(&format!("\ncost   {cost:.4}"));
        }
        if self.records.is_empty() {
            out.push_str("\n(no stored events)");
        }
        for record in &self.records {
            out.push('\n');
            out.push_str(&display::format_record(record));
        }
        out
    }
}

/// Reload `agent` from the store, discarding in-memory state for it.
pub fn history_view(
    engine: &mut SyncEngine,
    agent: &AgentId,
    now: DateTime<Utc>,
) -> anyhow::Result<HistoryView> {
    engine.load_history(agent, now)?;
    let snapshot = engine
        .agent_snapshot(agent)
        .ok_or_else(|| anyhow::anyhow!("{agent}: not tracked after history load"))?;
    Ok(HistoryView {
        agent: snapshot,
        records: engine.agent_log(agent).to_vec(),
    })
}

/// Entry point for `bondlink history`.
pub fn cmd_history(engine: &mut SyncEngine, agent: &AgentId, json: bool) -> anyhow::Result<()> {
    let view = history_view(engine, agent, Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", view.render());
    }
    Ok(())
}
