//! `bondlink agents` and `bondlink create`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use bondlink_core::types::{Agent, AgentId};
use bondlink_engine::AgentSnapshot;

use crate::backend::AgentBackend;
use crate::display;
use crate::session::Session;

/// Backend view of an agent merged with what this client has stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentListing {
    pub agent_id: AgentId,
    pub display_name: String,
    /// `None` for agents only known from the local store.
    pub backend: Option<Agent>,
    pub local: Option<AgentSnapshot>,
}

impl AgentListing {
    pub fn row(&self) -> String {
        display::format_agent_row(&self.agent_id, self.backend.as_ref(), self.local.as_ref())
    }
}

/// Backend agents plus agents that only exist in the store, sorted by id.
pub async fn agent_listing<B: AgentBackend>(
    session: &Session<B>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<AgentListing>> {
    let agents = session.refresh_agents(now).await?;
    let known: Vec<AgentId> = agents.iter().map(|a| a.agent_id.clone()).collect();

    let engine = {
        let mut engine = session.engine().lock().await;
        let report = engine.load_all_history(&known, now);
        for agent in &report.failed {
            tracing::warn!(agent = %agent, "stored history unavailable");
        }
        engine
    };

    let mut backend: BTreeMap<AgentId, Agent> = agents
        .into_iter()
        .map(|a| (a.agent_id.clone(), a))
        .collect();

    let listing = engine
        .agent_ids()
        .map(|id| {
            let agent = backend.remove(id);
            let display_name = match &agent {
                Some(a) => a.display_name(),
                None => format!("Agent {}", id.short()),
            };
            AgentListing {
                agent_id: id.clone(),
                display_name,
                backend: agent,
                local: engine.agent_snapshot(id),
            }
        })
        .collect();
    Ok(listing)
}

/// One backend agent with its stored conversation.
pub async fn agent_detail<B: AgentBackend>(
    session: &Session<B>,
    agent: &AgentId,
    now: DateTime<Utc>,
) -> anyhow::Result<AgentListing> {
    let backend = session.backend().get_agent(agent).await?;
    let mut engine = session.engine().lock().await;
    engine.track(agent, now);
    if let Err(e) = engine.load_history(agent, now) {
        tracing::warn!(agent = %agent, "stored history unavailable: {e}");
    }
    Ok(AgentListing {
        agent_id: agent.clone(),
        display_name: backend.display_name(),
        backend: Some(backend),
        local: engine.agent_snapshot(agent),
    })
}

/// Entry point for `bondlink agents`.
pub async fn cmd_agents<B: AgentBackend>(
    session: &Session<B>,
    agent: Option<&AgentId>,
    json: bool,
) -> anyhow::Result<()> {
    let listing = match agent {
        Some(id) => vec![agent_detail(session, id, Utc::now()).await?],
        None => agent_listing(session, Utc::now()).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }
    if listing.is_empty() {
        println!("(no agents)");
        return Ok(());
    }
    for entry in &listing {
        println!("{}", entry.row());
    }
    Ok(())
}

/// Entry point for `bondlink create`.
pub async fn cmd_create<B: AgentBackend>(session: &Session<B>, json: bool) -> anyhow::Result<()> {
    let agent = session.create_agent(Utc::now()).await?;
    if json {
        println!("{}", serde_json::to_string(&agent)?);
    } else {
        println!("{}  {}", agent.agent_id, agent.display_name());
    }
    Ok(())
}
