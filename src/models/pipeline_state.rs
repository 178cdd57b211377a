use crate::models::cells::CellConflictMap;
use crate::models::plugin::{ParseOutcome, PluginRecord};

/// Single source of truth for the loaded plugin set.
///
/// # Thread Safety
///
/// `PipelineState` is wrapped in `Arc<RwLock<PipelineState>>` by
/// [`crate::state::StateManager`]. Writes are funneled through the owning
/// [`crate::pipeline::PluginPipeline`]; everyone else reads snapshots.
#[derive(Clone, Debug, Default)]
pub struct PipelineState {
    /// Records in reconciled order, unique by filename
    pub records: Vec<PluginRecord>,

    /// Outcomes still expected for the current generation
    pub pending: usize,

    /// Number of tasks submitted for the current load
    pub total_submitted: usize,

    /// Raw load order text last applied
    pub load_order_text: String,

    /// Cell edits of the enabled subset
    pub conflicts: CellConflictMap,

    /// Pool generation whose outcomes are accepted
    pub generation: u64,
}

impl PipelineState {
    /// True once every outcome of the current load has been merged.
    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }

    pub fn enabled_count(&self) -> usize {
        self.records.iter().filter(|r| r.enabled).count()
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_failed()).count()
    }

    pub fn record(&self, filename: &str) -> Option<&PluginRecord> {
        self.records.iter().find(|r| r.filename == filename)
    }

    pub fn record_by_hash(&self, hash: &str) -> Option<&PluginRecord> {
        self.records.iter().find(|r| r.hash == hash)
    }

    /// Insert an outcome, replacing any record with the same filename.
    pub fn upsert_outcome(&mut self, outcome: ParseOutcome) {
        let record = PluginRecord::from(outcome);
        match self
            .records
            .iter_mut()
            .find(|existing| existing.filename == record.filename)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Count one merged outcome against the pending counter.
    ///
    /// Returns `false` if nothing was pending; the counter never goes below zero.
    pub fn decrement_pending(&mut self) -> bool {
        match self.pending.checked_sub(1) {
            Some(pending) => {
                self.pending = pending;
                true
            }
            None => false,
        }
    }

    /// Drop every record and reset counters for a new load.
    pub fn begin_load(&mut self, total: usize, generation: u64) {
        self.records.clear();
        self.conflicts = CellConflictMap::new();
        self.pending = total;
        self.total_submitted = total;
        self.generation = generation;
    }

    /// Stop waiting for the current load and move to `generation`.
    ///
    /// Merged records stay; outcomes still pending will never be accepted.
    pub fn cancel_load(&mut self, generation: u64) {
        self.pending = 0;
        self.generation = generation;
    }

    /// Reset to an empty plugin set, keeping the load order text.
    pub fn clear_plugins(&mut self) {
        self.records.clear();
        self.conflicts = CellConflictMap::new();
        self.pending = 0;
        self.total_submitted = 0;
    }

    /// Summary line for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} plugins ({} enabled, {} failed), {} pending, {} edited cells, {} conflicts",
            self.records.len(),
            self.enabled_count(),
            self.failed_count(),
            self.pending,
            self.conflicts.len(),
            self.conflicts.conflict_count()
        )
    }
}
