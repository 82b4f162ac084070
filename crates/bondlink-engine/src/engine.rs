//! Synchronization engine: the single writer of per-agent conversation state.
//!
//! Every inbound frame goes through `ingest`: classify, attribute, dedup
//! against the agent log, append, drive the state machine, project steps,
//! then write through to the store. Store failures are recovered here; the
//! in-memory state is authoritative for the session.
//!
//! Single-threaded, deterministic. No async. Time is passed in.
//! Push semantics are modeled with version-based change tracking: callers
//! poll `changes_since(version)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use bondlink_core::classify::classify;
use bondlink_core::conversation::{AgentConversation, ControlAction};
use bondlink_core::policy::DedupPolicy;
use bondlink_core::types::{AgentId, AgentState, ConversationRecord, EventKind};
use bondlink_store::{AppendOutcome, ConversationStore, StoreError};

use crate::diagnostics::{DEFAULT_DIAGNOSTICS_CAPACITY, Diagnostic, DiagnosticKind, DiagnosticsLog};
use crate::snapshot::{AgentSnapshot, SessionSnapshot};

/// Monotonic version counter for change tracking.
pub type StateVersion = u64;

// ─── Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub dedup: DedupPolicy,
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::default(),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

// ─── Outcomes & Changes ───────────────────────────────────────────

/// What happened to the store copy of an applied record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStatus {
    Stored,
    /// The store already held a record with this dedup key.
    AlreadyStored,
    Failed,
}

/// Result of ingesting one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Applied {
        agent_id: AgentId,
        kind: EventKind,
        received_order: u64,
        previous: AgentState,
        state: AgentState,
        steps_added: usize,
        persist: PersistStatus,
    },
    /// Dedupable record already in the agent log. Nothing changed.
    Duplicate {
        agent_id: AgentId,
        kind: EventKind,
        fingerprint: String,
    },
    /// Frame could not be attributed. Nothing changed.
    Unattributed { event: String, kind: EventKind },
}

impl IngestOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Self::Applied { agent_id, .. } | Self::Duplicate { agent_id, .. } => Some(agent_id),
            Self::Unattributed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    RecordAppended,
    HistoryLoaded,
    Started,
    Stopped,
    Cleared,
    Tracked,
}

/// Change notification for one agent. State and caption are as of this
/// change, not the agent's latest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentChange {
    pub version: StateVersion,
    pub agent_id: AgentId,
    pub kind: ChangeKind,
    pub state: AgentState,
    /// Kind of the appended record, for `RecordAppended` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<EventKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Summary of a multi-agent history load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub agents_loaded: usize,
    pub records_loaded: usize,
    pub failed: Vec<AgentId>,
}

// ─── Engine ───────────────────────────────────────────────────────

pub struct SyncEngine {
    config: EngineConfig,
    store: Box<dyn ConversationStore>,
    agents: BTreeMap<AgentId, AgentConversation>,
    /// Next arrival position. Monotonic for the engine's lifetime.
    next_order: u64,
    version: StateVersion,
    changes: Vec<AgentChange>,
    diagnostics: DiagnosticsLog,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("agents", &self.agents.len())
            .field("next_order", &self.next_order)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(store: Box<dyn ConversationStore>, config: EngineConfig) -> Self {
        let diagnostics = DiagnosticsLog::with_capacity(config.diagnostics_capacity);
        Self {
            config,
            store,
            agents: BTreeMap::new(),
            next_order: 0,
            version: 0,
            changes: Vec::new(),
            diagnostics,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Ingest ──────────────────────────────────────────────────

    /// Ingest one raw frame from the channel.
    ///
    /// `channel_hint` attributes frames that carry no `agent_id`; pass it only
    /// when the frame is known to belong to that agent.
    pub fn ingest(
        &mut self,
        raw: &str,
        channel_hint: Option<&AgentId>,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        let mut record = match classify(raw, channel_hint, now) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(event = %err.event, kind = %err.kind, "dropping unattributed frame");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::Unattributed,
                    agent_id: None,
                    event: err.event.clone(),
                    detail: err.to_string(),
                    at: now,
                });
                return IngestOutcome::Unattributed {
                    event: err.event,
                    kind: err.kind,
                };
            }
        };

        let agent_id = record.agent_id.clone();
        let dedup_key = self.config.dedup.dedup_key(&record).map(str::to_owned);

        if let Some(key) = dedup_key.as_deref() {
            let seen = self
                .agents
                .get(&agent_id)
                .is_some_and(|conv| conv.contains_fingerprint(key));
            if seen {
                tracing::debug!(agent = %agent_id, kind = %record.kind, "duplicate frame dropped");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::DuplicateDropped,
                    agent_id: Some(agent_id.clone()),
                    event: record.event.clone(),
                    detail: format!("fingerprint {}", &key[..key.len().min(12)]),
                    at: now,
                });
                return IngestOutcome::Duplicate {
                    agent_id,
                    kind: record.kind,
                    fingerprint: record.fingerprint,
                };
            }
        }

        record.received_order = self.next_order;
        self.next_order += 1;
        let kind = record.kind;
        let received_order = record.received_order;

        let persist = self.write_through(&record, dedup_key.as_deref(), now);

        let effect = self
            .agents
            .entry(agent_id.clone())
            .or_insert_with(|| AgentConversation::new(agent_id.clone()))
            .append(record);

        if effect.state_changed() {
            tracing::debug!(
                agent = %agent_id,
                from = %effect.previous,
                to = %effect.state,
                %kind,
                "agent state changed"
            );
        }
        self.record_change(&agent_id, ChangeKind::RecordAppended, Some(kind), now);

        IngestOutcome::Applied {
            agent_id,
            kind,
            received_order,
            previous: effect.previous,
            state: effect.state,
            steps_added: effect.steps_added,
            persist,
        }
    }

    fn write_through(
        &mut self,
        record: &ConversationRecord,
        dedup_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> PersistStatus {
        match self.store.append(&record.agent_id, record, dedup_key) {
            Ok(AppendOutcome::Appended) => PersistStatus::Stored,
            Ok(AppendOutcome::Duplicate) => {
                tracing::debug!(agent = %record.agent_id, kind = %record.kind, "store already holds record");
                PersistStatus::AlreadyStored
            }
            Err(e) => {
                tracing::warn!(agent = %record.agent_id, kind = %record.kind, "write-through failed: {e}");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::PersistFailed,
                    agent_id: Some(record.agent_id.clone()),
                    event: record.event.clone(),
                    detail: e.to_string(),
                    at: now,
                });
                PersistStatus::Failed
            }
        }
    }

    // ── History ─────────────────────────────────────────────────

    /// Rebuild one agent from the store. Records are replayed through the
    /// state machine and step projection without write-through. Existing
    /// in-memory state for the agent is discarded first.
    ///
    /// On store failure the agent keeps its current state and the error is
    /// recorded as a diagnostic.
    pub fn load_history(&mut self, agent: &AgentId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let records = match self.store.read_all(agent) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(agent = %agent, "history load failed: {e}");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::HistoryLoadFailed,
                    agent_id: Some(agent.clone()),
                    event: String::new(),
                    detail: e.to_string(),
                    at: now,
                });
                return Err(e);
            }
        };

        let mut conv = AgentConversation::new(agent.clone());
        let count = records.len();
        for mut record in records {
            // Stored records belong to this agent by key.
            record.agent_id = agent.clone();
            record.received_order = self.next_order;
            self.next_order += 1;
            conv.append(record);
        }
        let state = conv.state();
        self.agents.insert(agent.clone(), conv);
        self.record_change(agent, ChangeKind::HistoryLoaded, None, now);

        tracing::debug!(agent = %agent, records = count, %state, "history loaded");
        Ok(count)
    }

    /// Load history for the union of `known` agents and agents present in
    /// the store. Per-agent failures are collected, not propagated.
    pub fn load_all_history(&mut self, known: &[AgentId], now: DateTime<Utc>) -> HistoryReport {
        let mut targets: Vec<AgentId> = known.to_vec();
        match self.store.agent_ids() {
            Ok(stored) => targets.extend(stored),
            Err(e) => {
                tracing::warn!("listing stored agents failed: {e}");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::HistoryLoadFailed,
                    agent_id: None,
                    event: String::new(),
                    detail: e.to_string(),
                    at: now,
                });
            }
        }
        targets.sort();
        targets.dedup();

        let mut report = HistoryReport::default();
        for agent in targets {
            match self.load_history(&agent, now) {
                Ok(n) => {
                    report.agents_loaded += 1;
                    report.records_loaded += n;
                }
                Err(_) => report.failed.push(agent),
            }
        }
        report
    }

    // ── External control ────────────────────────────────────────

    /// Record a confirmed start. Call only after the backend reported success.
    pub fn apply_start_succeeded(&mut self, agent: &AgentId, now: DateTime<Utc>) -> AgentState {
        self.apply_control(agent, ControlAction::StartSucceeded, ChangeKind::Started, now)
    }

    /// Record a confirmed stop. Call only after the backend reported success.
    pub fn apply_stop_succeeded(&mut self, agent: &AgentId, now: DateTime<Utc>) -> AgentState {
        self.apply_control(agent, ControlAction::StopSucceeded, ChangeKind::Stopped, now)
    }

    fn apply_control(
        &mut self,
        agent: &AgentId,
        action: ControlAction,
        change: ChangeKind,
        now: DateTime<Utc>,
    ) -> AgentState {
        let conv = self.conversation_mut(agent);
        conv.apply_control(action);
        let state = conv.state();
        self.record_change(agent, change, None, now);
        state
    }

    /// Reset the agent to its initial state and remove its stored records.
    /// The agent stays tracked. Store failure is logged, not returned.
    pub fn clear(&mut self, agent: &AgentId, now: DateTime<Utc>) -> Option<usize> {
        self.conversation_mut(agent).clear();
        self.record_change(agent, ChangeKind::Cleared, None, now);

        match self.store.remove(agent) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(agent = %agent, "removing stored records failed: {e}");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::ClearFailed,
                    agent_id: Some(agent.clone()),
                    event: String::new(),
                    detail: e.to_string(),
                    at: now,
                });
                None
            }
        }
    }

    /// Start tracking an agent eagerly. Returns false if already tracked.
    pub fn track(&mut self, agent: &AgentId, now: DateTime<Utc>) -> bool {
        if self.agents.contains_key(agent) {
            return false;
        }
        self.agents
            .insert(agent.clone(), AgentConversation::new(agent.clone()));
        self.record_change(agent, ChangeKind::Tracked, None, now);
        true
    }

    fn conversation_mut(&mut self, agent: &AgentId) -> &mut AgentConversation {
        self.agents
            .entry(agent.clone())
            .or_insert_with(|| AgentConversation::new(agent.clone()))
    }

    fn record_change(
        &mut self,
        agent: &AgentId,
        kind: ChangeKind,
        event_kind: Option<EventKind>,
        now: DateTime<Utc>,
    ) {
        let state = self.agent_state(agent);
        let caption = self.caption(agent).map(str::to_owned);
        self.version += 1;
        self.changes.push(AgentChange {
            version: self.version,
            agent_id: agent.clone(),
            kind,
            state,
            event_kind,
            caption,
            timestamp: now,
        });
    }

    // ── Read projection ─────────────────────────────────────────

    pub fn conversation(&self, agent: &AgentId) -> Option<&AgentConversation> {
        self.agents.get(agent)
    }

    /// Current state; agents never seen are in the initial `Idle` state.
    pub fn agent_state(&self, agent: &AgentId) -> AgentState {
        self.agents
            .get(agent)
            .map(AgentConversation::state)
            .unwrap_or_default()
    }

    pub fn agent_log(&self, agent: &AgentId) -> &[ConversationRecord] {
        self.agents.get(agent).map(|c| c.log()).unwrap_or_default()
    }

    pub fn step_log(&self, agent: &AgentId) -> &[String] {
        self.agents.get(agent).map(|c| c.steps()).unwrap_or_default()
    }

    pub fn is_working(&self, agent: &AgentId) -> bool {
        self.agents.get(agent).is_some_and(AgentConversation::is_working)
    }

    /// Progress caption while working, or "Task Complete" until the event
    /// after a finished task. `None` when there is nothing to show.
    pub fn caption(&self, agent: &AgentId) -> Option<&str> {
        self.agents
            .get(agent)
            .map(AgentConversation::caption)
            .filter(|c| !c.is_empty())
    }

    /// Tracked agents, sorted.
    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.keys()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            version: self.version,
            generated_at: now,
            agents: self.agents.values().map(AgentSnapshot::from_conversation).collect(),
            diagnostics_total: self.diagnostics.total_recorded(),
        }
    }

    pub fn agent_snapshot(&self, agent: &AgentId) -> Option<AgentSnapshot> {
        self.agents.get(agent).map(AgentSnapshot::from_conversation)
    }

    // ── Change tracking ─────────────────────────────────────────

    pub fn version(&self) -> StateVersion {
        self.version
    }

    /// Changes with version greater than `since_version`.
    pub fn changes_since(&self, since_version: StateVersion) -> &[AgentChange] {
        let start = self.changes.partition_point(|c| c.version <= since_version);
        &self.changes[start..]
    }

    /// Drop change entries with version <= `before_version`. Call after
    /// every consumer has observed them.
    pub fn trim_changes_before(&mut self, before_version: StateVersion) {
        self.changes.retain(|c| c.version > before_version);
    }

    pub fn diagnostics(&self) -> &DiagnosticsLog {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondlink_store::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn engine() -> SyncEngine {
        SyncEngine::new(Box::new(MemoryStore::new()), EngineConfig::default())
    }

    fn frame(agent: &str, event: &str) -> String {
        serde_json::json!({"event": event, "data": {"agent_id": agent}}).to_string()
    }

    fn tool_frame(agent: &str, tool: &str) -> String {
        serde_json::json!({
            "event": "task_agent_step_tool_selected",
            "data": {"agent_id": agent, "step": {"function": {"name": tool, "arguments": {}}}}
        })
        .to_string()
    }

    /// Store whose every call fails.
    struct FailingStore;

    impl ConversationStore for FailingStore {
        fn append(
            &mut self,
            _: &AgentId,
            _: &ConversationRecord,
            _: Option<&str>,
        ) -> Result<AppendOutcome, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn read_all(&self, _: &AgentId) -> Result<Vec<ConversationRecord>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("unreadable")))
        }

        fn remove(&mut self, _: &AgentId) -> Result<usize, StoreError> {
            Err(StoreError::Io(std::io::Error::other("read-only")))
        }

        fn agent_ids(&self) -> Result<Vec<AgentId>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("unreadable")))
        }
    }

    // ── 1. Scenario: task started ───────────────────────────────────

    #[test]
    fn task_started_creates_agent_with_started_step() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");

        let outcome = eng.ingest(&frame("A1", "task_agent_started"), None, t0());

        assert!(outcome.is_applied());
        assert_eq!(eng.step_log(&a1), ["Started"]);
        assert_eq!(eng.agent_log(&a1).len(), 1);
        assert_eq!(eng.agent_state(&a1), AgentState::Working);
        assert_eq!(eng.caption(&a1), Some("Working"));
    }

    // ── 2. Scenario: tool selection label ───────────────────────────

    #[test]
    fn tool_selection_appends_label() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());
        eng.ingest(&tool_frame("A1", "file_write"), None, t0());

        let steps = eng.step_log(&a1);
        assert_eq!(&steps[steps.len() - 2..], ["Selecting Tool", "FILE WRITE"]);
        assert_eq!(eng.caption(&a1), Some("Selecting Tool"));
    }

    #[test]
    fn task_complete_caption_is_visible_after_task_ends() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());
        eng.ingest(&frame("A1", "task_agent_completed"), None, t0());

        assert_eq!(eng.agent_state(&a1), AgentState::Running);
        assert!(!eng.is_working(&a1));
        assert_eq!(eng.caption(&a1), Some("Task Complete"));
        let snap = eng.agent_snapshot(&a1).expect("tracked");
        assert_eq!(snap.caption, "Task Complete");

        eng.ingest(&frame("A1", "conversational_agent_message"), None, t0());
        assert_eq!(eng.caption(&a1), None);
    }

    // ── 3. Scenario: duplicate delivery ─────────────────────────────

    #[test]
    fn identical_frame_twice_appends_once() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        let raw = tool_frame("A1", "file_write");

        eng.ingest(&raw, None, t0());
        let v = eng.version();
        let second = eng.ingest(&raw, None, t0());

        assert!(matches!(second, IngestOutcome::Duplicate { .. }));
        assert_eq!(eng.agent_log(&a1).len(), 1);
        assert_eq!(eng.version(), v);
        assert_eq!(eng.diagnostics().count(DiagnosticKind::DuplicateDropped), 1);
    }

    #[test]
    fn never_dedup_kinds_append_every_time() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        let raw = frame("A1", "task_agent_completed");

        eng.ingest(&raw, None, t0());
        eng.ingest(&raw, None, t0());

        assert_eq!(eng.agent_log(&a1).len(), 2);
        assert_eq!(eng.step_log(&a1), ["Completed", "Completed"]);
    }

    // ── 4. Scenario: unattributed frame ─────────────────────────────

    #[test]
    fn missing_agent_id_changes_nothing() {
        let mut eng = engine();
        let raw = serde_json::json!({"event": "conversational_agent_message", "data": {"message": "hi"}})
            .to_string();

        let outcome = eng.ingest(&raw, None, t0());

        assert!(matches!(
            outcome,
            IngestOutcome::Unattributed { kind: EventKind::ConversationalMessage, .. }
        ));
        assert_eq!(eng.agent_count(), 0);
        assert_eq!(eng.version(), 0);
        assert_eq!(eng.diagnostics().count(DiagnosticKind::Unattributed), 1);
    }

    #[test]
    fn channel_hint_attributes_bare_frame() {
        let mut eng = engine();
        let hint = AgentId::new("A7");
        let raw = serde_json::json!({"event": "agent_message", "data": {"message": "hi"}}).to_string();

        let outcome = eng.ingest(&raw, Some(&hint), t0());

        assert_eq!(outcome.agent_id(), Some(&hint));
        assert_eq!(eng.agent_log(&hint).len(), 1);
    }

    // ── 5. Scenario: stop forces Stopped ────────────────────────────

    #[test]
    fn stop_success_forces_stopped_after_working() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        eng.ingest(&frame("A1", "conversational_agent_started"), None, t0());
        eng.ingest(&frame("A1", "task_agent_step_started"), None, t0());
        assert_eq!(eng.agent_state(&a1), AgentState::Working);

        assert_eq!(eng.apply_stop_succeeded(&a1, t0()), AgentState::Stopped);
        assert!(!eng.is_working(&a1));
        assert_eq!(eng.caption(&a1), None);

        // Late corroborating event is tolerated.
        eng.ingest(&frame("A1", "task_agent_step_completed"), None, t0());
        assert_eq!(eng.agent_state(&a1), AgentState::Stopped);
    }

    #[test]
    fn start_success_enters_starting() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        eng.track(&a1, t0());
        assert_eq!(eng.apply_start_succeeded(&a1, t0()), AgentState::Starting);
        assert_eq!(eng.caption(&a1), Some("Starting"));

        eng.ingest(&frame("A1", "conversational_agent_started"), None, t0());
        assert_eq!(eng.agent_state(&a1), AgentState::Running);
        assert!(!eng.is_working(&a1));
    }

    // ── 6. Ordering & attribution isolation ─────────────────────────

    #[test]
    fn received_order_is_monotonic_across_agents() {
        let mut eng = engine();
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());
        eng.ingest(&frame("A2", "task_agent_started"), None, t0());
        eng.ingest(&tool_frame("A1", "web_search"), None, t0());

        let a1 = eng.agent_log(&AgentId::new("A1"));
        let a2 = eng.agent_log(&AgentId::new("A2"));
        assert_eq!(a1.iter().map(|r| r.received_order).collect::<Vec<_>>(), [0, 2]);
        assert_eq!(a2[0].received_order, 1);
        assert_eq!(eng.step_log(&AgentId::new("A2")), ["Started"]);
    }

    // ── 7. History ──────────────────────────────────────────────────

    #[test]
    fn history_load_then_live_redelivery_is_deduped() {
        let mut store = MemoryStore::new();
        {
            let mut first = SyncEngine::new(Box::new(MemoryStore::new()), EngineConfig::default());
            first.ingest(&frame("A1", "task_agent_started"), None, t0());
            first.ingest(&tool_frame("A1", "file_write"), None, t0());
            for record in first.agent_log(&AgentId::new("A1")) {
                let key = first.config().dedup.dedup_key(record);
                store
                    .append(&record.agent_id, record, key)
                    .expect("seed store");
            }
        }

        let mut eng = SyncEngine::new(Box::new(store), EngineConfig::default());
        let report = eng.load_all_history(&[], t0());
        assert_eq!(report.agents_loaded, 1);
        assert_eq!(report.records_loaded, 2);

        let a1 = AgentId::new("A1");
        assert_eq!(eng.step_log(&a1), ["Started", "Selecting Tool", "FILE WRITE"]);

        let outcome = eng.ingest(&tool_frame("A1", "file_write"), None, t0());
        assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));
        assert_eq!(eng.agent_log(&a1).len(), 2);
    }

    #[test]
    fn reload_rebuilds_from_scratch() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());
        eng.ingest(&tool_frame("A1", "file_write"), None, t0());

        let loaded = eng.load_history(&a1, t0()).expect("load");
        assert_eq!(loaded, 2);
        assert_eq!(eng.agent_log(&a1).len(), 2);
        assert_eq!(eng.step_log(&a1).len(), 3);
    }

    #[test]
    fn load_all_history_includes_known_agents_without_records() {
        let mut eng = engine();
        let report = eng.load_all_history(&[AgentId::new("B1")], t0());
        assert_eq!(report.agents_loaded, 1);
        assert_eq!(eng.agent_state(&AgentId::new("B1")), AgentState::Idle);
    }

    #[test]
    fn unseen_agent_reports_initial_state() {
        let eng = engine();
        let ghost = AgentId::new("never-seen");
        assert_eq!(eng.agent_state(&ghost), AgentState::Idle);
        assert_eq!(eng.caption(&ghost), None);
        assert_eq!(eng.agent_count(), 0);
    }

    // ── 8. Store failures are recovered ─────────────────────────────

    #[test]
    fn persist_failure_does_not_block_ingest() {
        let mut eng = SyncEngine::new(Box::new(FailingStore), EngineConfig::default());
        let a1 = AgentId::new("A1");

        let outcome = eng.ingest(&frame("A1", "task_agent_started"), None, t0());

        assert!(matches!(
            outcome,
            IngestOutcome::Applied { persist: PersistStatus::Failed, .. }
        ));
        assert_eq!(eng.agent_log(&a1).len(), 1);
        assert_eq!(eng.diagnostics().count(DiagnosticKind::PersistFailed), 1);
    }

    #[test]
    fn history_failure_keeps_state_and_records_diagnostic() {
        let mut eng = SyncEngine::new(Box::new(FailingStore), EngineConfig::default());
        let a1 = AgentId::new("A1");
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());

        assert!(eng.load_history(&a1, t0()).is_err());
        assert_eq!(eng.agent_log(&a1).len(), 1);

        let report = eng.load_all_history(&[a1.clone()], t0());
        assert_eq!(report.failed, vec![a1]);
        assert!(eng.diagnostics().count(DiagnosticKind::HistoryLoadFailed) >= 2);
    }

    // ── 9. Clear & track ────────────────────────────────────────────

    #[test]
    fn clear_resets_agent_and_store() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        eng.ingest(&tool_frame("A1", "file_write"), None, t0());

        assert_eq!(eng.clear(&a1, t0()), Some(1));
        assert_eq!(eng.agent_state(&a1), AgentState::Idle);
        assert!(eng.agent_log(&a1).is_empty());
        assert!(eng.step_log(&a1).is_empty());

        // Previously seen fingerprint is accepted again after clear.
        assert!(eng.ingest(&tool_frame("A1", "file_write"), None, t0()).is_applied());
    }

    #[test]
    fn clear_with_failing_store_still_resets_memory() {
        let mut eng = SyncEngine::new(Box::new(FailingStore), EngineConfig::default());
        let a1 = AgentId::new("A1");
        eng.ingest(&frame("A1", "user_message"), None, t0());

        assert_eq!(eng.clear(&a1, t0()), None);
        assert!(eng.agent_log(&a1).is_empty());
        assert_eq!(eng.diagnostics().count(DiagnosticKind::ClearFailed), 1);
    }

    #[test]
    fn track_is_idempotent() {
        let mut eng = engine();
        let a1 = AgentId::new("A1");
        assert!(eng.track(&a1, t0()));
        assert!(!eng.track(&a1, t0()));
        assert_eq!(eng.version(), 1);
        assert_eq!(eng.agent_ids().collect::<Vec<_>>(), vec![&a1]);
    }

    // ── 10. Change tracking ─────────────────────────────────────────

    #[test]
    fn changes_since_filters_by_version() {
        let mut eng = engine();
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());
        let v1 = eng.version();
        eng.ingest(&frame("A2", "user_message"), None, t0());
        eng.apply_stop_succeeded(&AgentId::new("A1"), t0());

        let all = eng.changes_since(0);
        let newer = eng.changes_since(v1);
        assert_eq!(all.len(), 3);
        assert_eq!(newer.len(), 2);
        assert!(newer.iter().all(|c| c.version > v1));
        assert_eq!(newer[1].kind, ChangeKind::Stopped);
        assert_eq!(newer[1].state, AgentState::Stopped);

        eng.trim_changes_before(v1);
        assert_eq!(eng.changes_since(0).len(), 2);
    }

    #[test]
    fn snapshot_reflects_agents() {
        let mut eng = engine();
        eng.ingest(&frame("A1", "task_agent_started"), None, t0());
        eng.ingest(&frame("A2", "conversational_agent_started"), None, t0());

        let snap = eng.snapshot(t0());
        assert_eq!(snap.version, 2);
        assert_eq!(snap.agents.len(), 2);
        assert_eq!(snap.agents[0].agent_id.as_str(), "A1");
        assert!(snap.agents[0].is_working);
        assert_eq!(snap.agents[1].state, AgentState::Running);
    }
}
