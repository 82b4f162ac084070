//! Dedup policy: which event kinds collapse on equal fingerprints.

use std::collections::BTreeSet;

use crate::types::{ConversationRecord, EventKind};

/// Kinds that are appended even when an identical payload was already seen.
///
/// `AgentStarted` and `TaskCompleted` are operationally significant on every
/// delivery (a restarted agent, a second identical task) so they bypass dedup
/// unless configured otherwise.
pub const DEFAULT_NEVER_DEDUP: [EventKind; 2] = [EventKind::AgentStarted, EventKind::TaskCompleted];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupPolicy {
    never_dedup: BTreeSet<EventKind>,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::with_never_dedup(DEFAULT_NEVER_DEDUP)
    }
}

impl DedupPolicy {
    pub fn with_never_dedup(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            never_dedup: kinds.into_iter().collect(),
        }
    }

    /// Every kind is deduplicated.
    pub fn dedup_all() -> Self {
        Self {
            never_dedup: BTreeSet::new(),
        }
    }

    pub fn is_deduplicated(&self, kind: EventKind) -> bool {
        !self.never_dedup.contains(&kind)
    }

    /// Dedup key for a record, `None` when its kind bypasses dedup.
    pub fn dedup_key<'a>(&self, record: &'a ConversationRecord) -> Option<&'a str> {
        self.is_deduplicated(record.kind)
            .then_some(record.fingerprint.as_str())
    }

    pub fn never_dedup(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.never_dedup.iter().copied()
    }
}
