//! Bounded ring of recent engine diagnostics.
//!
//! Recovered failures (unattributed frames, dropped duplicates, store
//! errors) never propagate out of `ingest`; they land here instead so the
//! host can surface them.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use bondlink_core::types::AgentId;

pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Frame named no agent and no channel hint was supplied.
    Unattributed,
    /// Dedupable record already present in the agent log.
    DuplicateDropped,
    /// Write-through to the store failed.
    PersistFailed,
    /// Store read failed while loading history.
    HistoryLoadFailed,
    /// Store remove failed while clearing an agent.
    ClearFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Raw event discriminator, empty when unknown.
    pub event: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsLog {
    capacity: usize,
    entries: VecDeque<Diagnostic>,
    total: u64,
}

impl Default for DiagnosticsLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DIAGNOSTICS_CAPACITY)
    }
}

impl DiagnosticsLog {
    /// Capacity 0 is bumped to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
        self.total += 1;
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Diagnostic> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Everything ever recorded, including evicted entries.
    pub fn total_recorded(&self) -> u64 {
        self.total
    }

    /// Retained entries of one kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn diag(kind: DiagnosticKind, detail: &str) -> Diagnostic {
        Diagnostic {
            kind,
            agent_id: None,
            event: String::new(),
            detail: detail.to_owned(),
            at: Utc
                .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("valid datetime"),
        }
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut log = DiagnosticsLog::with_capacity(2);
        log.push(diag(DiagnosticKind::Unattributed, "a"));
        log.push(diag(DiagnosticKind::DuplicateDropped, "b"));
        log.push(diag(DiagnosticKind::PersistFailed, "c"));

        let details: Vec<_> = log.iter().map(|d| d.detail.as_str()).collect();
        assert_eq!(details, ["b", "c"]);
        assert_eq!(log.total_recorded(), 3);
        assert_eq!(log.count(DiagnosticKind::Unattributed), 0);
        assert_eq!(log.latest().map(|d| d.kind), Some(DiagnosticKind::PersistFailed));
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut log = DiagnosticsLog::with_capacity(0);
        log.push(diag(DiagnosticKind::Unattributed, "a"));
        log.push(diag(DiagnosticKind::Unattributed, "b"));
        assert_eq!(log.len(), 1);
    }
}
