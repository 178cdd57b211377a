// State management module
//
// This module provides the StateManager which wraps PipelineState with thread-safe access
// using Arc<RwLock<T>> and emits change events for subscribers.

use crate::metrics::PipelineMetrics;
use crate::models::{CellConflictMap, PipelineState};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify interested parties (the CLI, a map renderer) about pipeline
/// progress without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineChange {
    /// A new load began
    LoadStarted { total: usize },

    /// The pending outcome counter moved
    PendingChanged { pending: usize, total: usize },

    /// Record order, membership or enabled flags changed
    RecordsChanged { total: usize, enabled: usize },

    /// A different load order text was applied
    LoadOrderChanged,

    /// The cell conflict map was recomputed with a different result
    ConflictsChanged { edited: usize, conflicted: usize },

    /// Every outcome of the current load has been merged
    LoadFinished { total: usize, failed: usize },

    /// The current load was abandoned with outcomes still pending
    LoadCancelled { dropped: usize },

    /// The plugin set was cleared
    StateReset,
}

/// The parts of [`PipelineState`] that change detection looks at.
///
/// Cheaper to capture than a full clone, which would copy every parsed cell.
#[derive(Debug, PartialEq)]
struct StateDigest {
    generation: u64,
    pending: usize,
    total_submitted: usize,
    records: Vec<(String, String, bool)>,
    load_order_text: String,
    conflicts: CellConflictMap,
}

impl StateDigest {
    fn capture(state: &PipelineState) -> Self {
        Self {
            generation: state.generation,
            pending: state.pending,
            total_submitted: state.total_submitted,
            records: state
                .records
                .iter()
                .map(|r| (r.filename.clone(), r.hash.clone(), r.enabled))
                .collect(),
            load_order_text: state.load_order_text.clone(),
            conflicts: state.conflicts.clone(),
        }
    }
}

/// Thread-safe state manager with event emission
///
/// This is the shared view of the loaded plugin set:
/// - Provides thread-safe access to [`PipelineState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`PipelineChange`] events
/// - Supports subscribing to changes via tokio broadcast channels
///
/// Writes go through [`update()`](Self::update), which the owning
/// [`crate::pipeline::PluginPipeline`] calls from its single event path.
pub struct StateManager {
    state: Arc<RwLock<PipelineState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<PipelineChange>,

    metrics: Arc<PipelineMetrics>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(PipelineMetrics::new()))
    }

    /// Create a StateManager that counts updates and broadcasts into `metrics`
    pub fn with_metrics(metrics: Arc<PipelineMetrics>) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(PipelineState::default())),
            state_tx,
            metrics,
        }
    }

    /// Get an owned snapshot of the current state
    ///
    /// This clones every record; for single fields prefer [`read()`](Self::read).
    pub fn snapshot(&self) -> PipelineState {
        self.read(PipelineState::clone)
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let pending = state_manager.read(|state| state.pending);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PipelineState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// The events that were emitted, in emission order
    pub fn update<F>(&self, update_fn: F) -> Vec<PipelineChange>
    where
        F: FnOnce(&mut PipelineState),
    {
        let changes = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let before = StateDigest::capture(&state);

            update_fn(&mut state);

            Self::detect_changes(&before, &StateDigest::capture(&state), &state)
        };

        self.metrics.record_state_update();
        for change in &changes {
            self.broadcast(change.clone());
        }

        changes
    }

    /// Drop every record and counter, keeping the load order text
    pub fn reset(&self) -> Vec<PipelineChange> {
        let mut changes = self.update(PipelineState::clear_plugins);

        self.broadcast(PipelineChange::StateReset);
        changes.push(PipelineChange::StateReset);

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineChange> {
        self.state_tx.subscribe()
    }

    fn broadcast(&self, change: PipelineChange) {
        // No subscribers is fine
        if self.state_tx.send(change).is_ok() {
            self.metrics.record_state_broadcast();
        }
    }

    fn detect_changes(
        old: &StateDigest,
        new: &StateDigest,
        state: &PipelineState,
    ) -> Vec<PipelineChange> {
        let mut changes = Vec::new();

        if old.generation != new.generation {
            if new.pending > 0 {
                changes.push(PipelineChange::LoadStarted {
                    total: new.total_submitted,
                });
            } else if old.pending > 0 {
                changes.push(PipelineChange::LoadCancelled {
                    dropped: old.pending,
                });
            }
        }

        if old.pending != new.pending || old.total_submitted != new.total_submitted {
            changes.push(PipelineChange::PendingChanged {
                pending: new.pending,
                total: new.total_submitted,
            });
        }

        if old.records != new.records {
            changes.push(PipelineChange::RecordsChanged {
                total: state.records.len(),
                enabled: state.enabled_count(),
            });
        }

        if old.load_order_text != new.load_order_text {
            changes.push(PipelineChange::LoadOrderChanged);
        }

        if old.conflicts != new.conflicts {
            changes.push(PipelineChange::ConflictsChanged {
                edited: new.conflicts.len(),
                conflicted: new.conflicts.conflict_count(),
            });
        }

        if old.pending > 0 && new.pending == 0 && old.generation == new.generation {
            changes.push(PipelineChange::LoadFinished {
                total: state.records.len(),
                failed: state.failed_count(),
            });
        }

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}
