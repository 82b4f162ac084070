//! Per-agent conversation state: lifecycle state machine, ordered record
//! log and the step log projected from it.
//!
//! Every function here is pure. [`AgentConversation`] only changes through
//! [`AgentConversation::append`], [`AgentConversation::apply_control`] and
//! [`AgentConversation::clear`].

use std::collections::HashSet;

use crate::types::{AgentId, AgentState, ConversationRecord, EventKind};

// ─── Captions & Step Labels ───────────────────────────────────────

pub const CAPTION_STARTING: &str = "Starting";
pub const CAPTION_WORKING: &str = "Working";
pub const CAPTION_SELECTING_TOOL: &str = "Selecting Tool";
pub const CAPTION_STEP_COMPLETED: &str = "Step Completed";
pub const CAPTION_TASK_COMPLETE: &str = "Task Complete";

pub const STEP_STARTED: &str = "Started";
pub const STEP_SELECTING_TOOL: &str = "Selecting Tool";
pub const STEP_COMPLETED: &str = "Completed";

// ─── Transitions ──────────────────────────────────────────────────

/// Outcome of feeding one input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: AgentState,
    /// New progress caption. `None` keeps the current one while the agent
    /// stays working and clears it otherwise.
    pub caption: Option<&'static str>,
}

impl Transition {
    fn to(next: AgentState) -> Self {
        Self {
            next,
            caption: None,
        }
    }

    fn with_caption(next: AgentState, caption: &'static str) -> Self {
        Self {
            next,
            caption: Some(caption),
        }
    }
}

/// Inputs that do not come from the channel: confirmed REST outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    StartSucceeded,
    StopSucceeded,
}

/// Next state for a channel event. Defined for every `(state, kind)` pair.
///
/// A halted agent (`Stopped`/`Completed`) only reacts to lifecycle events;
/// late task or message events are logged but do not revive it.
pub fn transition(current: AgentState, kind: EventKind) -> Transition {
    use AgentState as S;
    use EventKind as K;

    match kind {
        K::AgentStarted => Transition::to(S::Running),
        K::AgentCompleted => Transition::to(S::Completed),
        K::Unknown => Transition::to(current),
        _ if current.is_halted() => Transition::to(current),
        K::ConversationalMessage | K::DirectMessage => Transition::to(S::Running),
        K::UserMessage | K::TaskStarted | K::TaskStepStarted => {
            Transition::with_caption(S::Working, CAPTION_WORKING)
        }
        K::TaskStepToolSelected => Transition::with_caption(S::Working, CAPTION_SELECTING_TOOL),
        K::TaskStepToolCompleted => Transition::with_caption(S::Working, CAPTION_STEP_COMPLETED),
        K::TaskStepCompleted => Transition::to(S::Working),
        K::TaskCompleted => Transition::with_caption(S::Running, CAPTION_TASK_COMPLETE),
    }
}

/// Next state for a confirmed control action. Applies from any state.
pub fn control_transition(action: ControlAction) -> Transition {
    match action {
        ControlAction::StartSucceeded => {
            Transition::with_caption(AgentState::Starting, CAPTION_STARTING)
        }
        ControlAction::StopSucceeded => Transition::to(AgentState::Stopped),
    }
}

// ─── Step Projection ──────────────────────────────────────────────

/// Step labels contributed by a single record.
pub fn step_labels(record: &ConversationRecord) -> Vec<String> {
    match record.kind {
        EventKind::TaskStarted => vec![STEP_STARTED.to_owned()],
        EventKind::TaskStepToolSelected => match &record.detail.tool {
            Some(tool) => vec![STEP_SELECTING_TOOL.to_owned(), tool.label.clone()],
            None => Vec::new(),
        },
        EventKind::TaskCompleted => vec![STEP_COMPLETED.to_owned()],
        _ => Vec::new(),
    }
}

/// Step log of an entire record sequence.
pub fn project_step_log<'a>(records: impl IntoIterator<Item = &'a ConversationRecord>) -> Vec<String> {
    records.into_iter().flat_map(step_labels).collect()
}

// ─── Agent Conversation ───────────────────────────────────────────

/// What an append changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendEffect {
    pub previous: AgentState,
    pub state: AgentState,
    pub steps_added: usize,
}

impl AppendEffect {
    pub fn state_changed(&self) -> bool {
        self.previous != self.state
    }
}

/// State machine, record log and step log for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConversation {
    agent_id: AgentId,
    state: AgentState,
    caption: String,
    log: Vec<ConversationRecord>,
    steps: Vec<String>,
    fingerprints: HashSet<String>,
}

impl AgentConversation {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            state: AgentState::Idle,
            caption: String::new(),
            log: Vec::new(),
            steps: Vec::new(),
            fingerprints: HashSet::new(),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Progress caption. Empty unless working, except that "Task Complete"
    /// stays until the next event.
    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn is_working(&self) -> bool {
        self.state.is_working()
    }

    pub fn log(&self) -> &[ConversationRecord] {
        &self.log
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn contains_fingerprint(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Append a record (arrival order), drive the state machine and extend
    /// the step log. Dedup is the caller's decision.
    pub fn append(&mut self, record: ConversationRecord) -> AppendEffect {
        debug_assert_eq!(record.agent_id, self.agent_id);

        let previous = self.state;
        let t = transition(previous, record.kind);
        self.apply(t);

        let labels = step_labels(&record);
        let steps_added = labels.len();
        self.steps.extend(labels);

        self.fingerprints.insert(record.fingerprint.clone());
        self.log.push(record);

        AppendEffect {
            previous,
            state: self.state,
            steps_added,
        }
    }

    /// Apply a confirmed REST outcome. Returns true if the state changed.
    pub fn apply_control(&mut self, action: ControlAction) -> bool {
        let previous = self.state;
        self.apply(control_transition(action));
        previous != self.state
    }

    /// Reset to the initial state. The agent stays tracked.
    pub fn clear(&mut self) {
        self.state = AgentState::Idle;
        self.caption.clear();
        self.log.clear();
        self.steps.clear();
        self.fingerprints.clear();
    }

    fn apply(&mut self, t: Transition) {
        match t.caption {
            Some(caption) => self.caption = caption.to_owned(),
            None if self.state.is_working() && t.next.is_working() => {}
            None => self.caption.clear(),
        }
        self.state = t.next;
    }
}
