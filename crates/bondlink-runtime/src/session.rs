//! Session: owns the engine (behind one async mutex) and the backend, and
//! applies REST outcomes to the engine only after the backend confirmed them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use bondlink_core::types::{Agent, AgentId, AgentState};
use bondlink_engine::{HistoryReport, IngestOutcome, SyncEngine};

use crate::backend::{AgentBackend, BackendError, StartRequest};
use crate::connection::{ConnectionError, EventSink};
use crate::socketio::ChannelFrame;

/// Socket.IO event the backend listens on for client frames.
pub const OUTBOUND_EVENT: &str = "message";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("agent {0} is still working; wait for it or stop it first")]
    AgentBusy(AgentId),

    #[error("message is empty")]
    EmptyMessage,

    #[error("message not sent: {0}")]
    Send(#[from] ConnectionError),
}

pub struct Session<B> {
    backend: B,
    engine: Arc<Mutex<SyncEngine>>,
}

impl<B: AgentBackend> Session<B> {
    pub fn new(backend: B, engine: SyncEngine) -> Self {
        Self {
            backend,
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn engine(&self) -> &Arc<Mutex<SyncEngine>> {
        &self.engine
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// List backend agents and start tracking them.
    pub async fn refresh_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>, SessionError> {
        let agents = self.backend.list_agents().await?;
        let mut engine = self.engine.lock().await;
        for agent in &agents {
            engine.track(&agent.agent_id, now);
        }
        Ok(agents)
    }

    /// Load history for backend agents plus agents already in the store.
    /// An unreachable backend degrades to store-only history.
    pub async fn bootstrap(&self, now: DateTime<Utc>) -> HistoryReport {
        let known: Vec<AgentId> = match self.refresh_agents(now).await {
            Ok(agents) => agents.into_iter().map(|a| a.agent_id).collect(),
            Err(e) => {
                tracing::warn!("listing agents failed, loading stored history only: {e}");
                Vec::new()
            }
        };
        let report = self.engine.lock().await.load_all_history(&known, now);
        tracing::info!(
            agents = report.agents_loaded,
            records = report.records_loaded,
            failed = report.failed.len(),
            "history loaded"
        );
        report
    }

    pub async fn create_agent(&self, now: DateTime<Utc>) -> Result<Agent, SessionError> {
        let agent = self.backend.create_agent().await?;
        self.engine.lock().await.track(&agent.agent_id, now);
        tracing::info!(agent = %agent.agent_id, "agent created");
        Ok(agent)
    }

    /// Start the agent. State moves to `Starting` only after success.
    pub async fn start(
        &self,
        agent: &AgentId,
        request: &StartRequest,
        now: DateTime<Utc>,
    ) -> Result<AgentState, SessionError> {
        self.backend.start_agent(agent, request).await?;
        let state = self.engine.lock().await.apply_start_succeeded(agent, now);
        tracing::info!(agent = %agent, %state, "agent start confirmed");
        Ok(state)
    }

    /// Stop the agent. State is forced to `Stopped` only after success.
    pub async fn stop(&self, agent: &AgentId, now: DateTime<Utc>) -> Result<AgentState, SessionError> {
        self.backend.stop_agent(agent).await?;
        let state = self.engine.lock().await.apply_stop_succeeded(agent, now);
        tracing::info!(agent = %agent, %state, "agent stop confirmed");
        Ok(state)
    }

    /// Emit a user message on [`OUTBOUND_EVENT`], then record it locally.
    /// Nothing is recorded if the emit fails. Refused while the agent is
    /// working unless `force`.
    pub async fn send_user_message<S: EventSink>(
        &self,
        sink: &S,
        agent: &AgentId,
        message: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        // Held across the emit so an echo cannot be ingested first.
        let mut engine = self.engine.lock().await;
        if engine.is_working(agent) && !force {
            return Err(SessionError::AgentBusy(agent.clone()));
        }

        let text = user_message_frame(agent, message, now).to_string();
        sink.emit(OUTBOUND_EVENT, &Value::String(text.clone())).await?;

        let outcome = engine.ingest(&text, Some(agent), now);
        match &outcome {
            IngestOutcome::Applied { state, persist, .. } => {
                tracing::debug!(agent = %agent, %state, ?persist, "user message recorded");
            }
            other => tracing::warn!(agent = %agent, outcome = ?other, "sent user message not recorded"),
        }
        Ok(outcome)
    }

    /// Reset the agent and delete its stored conversation.
    pub async fn clear(&self, agent: &AgentId, now: DateTime<Utc>) -> Option<usize> {
        self.engine.lock().await.clear(agent, now)
    }

    /// Feed one channel frame to the engine.
    pub async fn ingest_frame(&self, frame: &ChannelFrame, now: DateTime<Utc>) -> IngestOutcome {
        let outcome = self.engine.lock().await.ingest(&frame.payload, None, now);
        tracing::trace!(channel_event = %frame.name, ?outcome, "frame ingested");
        outcome
    }
}

/// Outbound `user_message` frame. `sent_at` keeps repeated identical texts
/// distinct under content dedup.
pub fn user_message_frame(agent: &AgentId, message: &str, now: DateTime<Utc>) -> Value {
    serde_json::json!({
        "event": "user_message",
        "data": {
            "agent_id": agent.as_str(),
            "message": message,
            "sent_at": now.to_rfc3339(),
        }
    })
}
