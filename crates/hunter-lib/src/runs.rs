//! Append-only ledger of scan runs

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::models::{RunId, RunRecord, RunStatus, SourceId};

/// Ledger of run records, one per orchestration attempt per source
///
/// Records transition pending→running at creation and are finished
/// exactly once with a terminal status; they are never mutated after
/// `finished_at` is set.
pub struct RunLedger {
    runs: DashMap<RunId, RunRecord>,
    next_id: AtomicU64,
}

impl RunLedger {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a running record for one source
    pub fn start(&self, source_id: SourceId, started_at: DateTime<Utc>) -> RunRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = RunRecord {
            id,
            source_id,
            status: RunStatus::Running,
            started_at,
            finished_at: None,
            message: String::new(),
        };
        debug!(run_id = id, source_id, "Scan run started");
        self.runs.insert(id, record.clone());
        record
    }

    /// Finish a run with a terminal status; no-op if already finished
    pub fn finish(
        &self,
        id: RunId,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Option<RunRecord> {
        debug_assert!(status.is_terminal());
        let mut entry = self.runs.get_mut(&id)?;
        if entry.finished_at.is_some() {
            warn!(run_id = id, "Ignoring second finish for run");
            return None;
        }
        entry.status = status;
        entry.finished_at = Some(finished_at);
        entry.message = message.into();
        Some(entry.clone())
    }

    pub fn get(&self, id: RunId) -> Option<RunRecord> {
        self.runs.get(&id).map(|entry| entry.clone())
    }

    /// All runs, most recent first
    pub fn list(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs
    }

    /// One source's runs, most recent first
    pub fn for_source(&self, source_id: SourceId) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|entry| entry.value().source_id == source_id)
            .map(|entry| entry.value().clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs
    }

    /// Cascade hook for source deletion; returns removed run count
    pub fn remove_source(&self, source_id: SourceId) -> usize {
        let before = self.runs.len();
        self.runs.retain(|_, run| run.source_id != source_id);
        before - self.runs.len()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_finish_success() {
        let ledger = RunLedger::new();
        let started = Utc::now();
        let run = ledger.start(1, started);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.finished_at, None);

        let finished = ledger
            .finish(run.id, RunStatus::Success, Utc::now(), "3 VMs")
            .unwrap();
        assert_eq!(finished.status, RunStatus::Success);
        assert_eq!(finished.message, "3 VMs");
        assert!(finished.finished_at.is_some());
    }

    #[test]
    fn test_finished_run_is_immutable() {
        let ledger = RunLedger::new();
        let run = ledger.start(1, Utc::now());
        ledger
            .finish(run.id, RunStatus::Failed, Utc::now(), "transport error")
            .unwrap();

        assert!(ledger
            .finish(run.id, RunStatus::Success, Utc::now(), "late")
            .is_none());
        let stored = ledger.get(run.id).unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.message, "transport error");
    }

    #[test]
    fn test_list_most_recent_first() {
        let ledger = RunLedger::new();
        let base = Utc::now();
        ledger.start(1, base - chrono::Duration::minutes(10));
        let newest = ledger.start(2, base);

        let runs = ledger.list();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, newest.id);
    }

    #[test]
    fn test_for_source_and_cascade_remove() {
        let ledger = RunLedger::new();
        ledger.start(1, Utc::now());
        ledger.start(1, Utc::now());
        ledger.start(2, Utc::now());

        assert_eq!(ledger.for_source(1).len(), 2);
        assert_eq!(ledger.remove_source(1), 2);
        assert_eq!(ledger.len(), 1);
    }
}
