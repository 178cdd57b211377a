// Pipeline coordinator
//
// Owns the worker pool and the shared plugin state. Every worker event, load order
// replacement and toggle funnels through one `&mut self` path, so reconciliation and
// aggregation always see a consistent record set.

use crate::metrics::PipelineMetrics;
use crate::models::{
    CellConflictMap, GameData, ParseOutcome, ParseTask, PipelineSettings, PipelineState,
    PluginRecord, UserConfig,
};
use crate::services::cell_conflicts::CellConflictService;
use crate::services::load_order::{reconcile, render_load_order};
use crate::services::parser::{ParserFactory, parser_factory};
use crate::services::worker_pool::{NO_WORKERS_REASON, PoolError, WorkerEvent, WorkerPool};
use crate::state::{PipelineChange, StateManager};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Errors surfaced to the caller of [`PluginPipeline`]
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Parse workers are not loaded yet")]
    PoolNotReady,

    #[error("Found no plugins to load")]
    NoPlugins,

    #[error("Plugin is not loaded: {0}")]
    UnknownPlugin(String),

    #[error("Plugin {filename} cannot be enabled: {reason}")]
    NotEnableable { filename: String, reason: String },

    #[error(transparent)]
    Pool(PoolError),
}

impl From<PoolError> for PipelineError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::NotReady => PipelineError::PoolNotReady,
            other => PipelineError::Pool(other),
        }
    }
}

/// Ingestion, reconciliation and aggregation for one plugin set.
///
/// The caller owns the pipeline and drives it by awaiting worker events:
///
/// ```ignore
/// let mut pipeline = PluginPipeline::from_config(&config)?;
/// pipeline.set_load_order(plugins_txt);
/// pipeline.load_plugins(tasks)?;
/// pipeline.run_until_idle().await;
/// let conflicts = pipeline.state().read(|s| s.conflicts.clone());
/// ```
pub struct PluginPipeline {
    pool: WorkerPool,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    state: StateManager,
    conflicts: CellConflictService,
    metrics: Arc<PipelineMetrics>,
}

impl PluginPipeline {
    /// Build a pipeline and spawn its workers.
    ///
    /// # Arguments
    /// * `settings` - Worker count and policy
    /// * `game` - Base master, canonical masters and overworld id
    /// * `factory` - Builds one parser per worker
    pub fn new(
        settings: &PipelineSettings,
        game: GameData,
        factory: Arc<dyn ParserFactory>,
    ) -> Result<Self, PipelineError> {
        let metrics = Arc::new(PipelineMetrics::new());
        let (pool, events_rx) = WorkerPool::new(
            settings.resolved_worker_count(),
            settings.worker_policy,
            factory,
            Arc::clone(&metrics),
        )?;

        Ok(Self {
            pool,
            events_rx,
            state: StateManager::with_metrics(Arc::clone(&metrics)),
            conflicts: CellConflictService::new(game),
            metrics,
        })
    }

    /// Build a pipeline using the parser adapter named in the user config.
    pub fn from_config(config: &UserConfig) -> Result<Self, PipelineError> {
        let settings = &config.pipeline_settings;
        Self::new(settings, config.game_data.clone(), parser_factory(settings))
    }

    /// Wait until every spawned worker has signalled readiness.
    pub async fn wait_until_ready(&mut self) {
        while !self.pool.all_started() {
            match self.events_rx.recv().await {
                Some(event) => {
                    self.handle_event(event);
                }
                None => break,
            }
        }
    }

    /// Start a full reload with a new set of files.
    ///
    /// Drops the previous records, queued tasks and in-flight results, then queues every
    /// task. Canonical masters are always hashed without parsing.
    ///
    /// # Returns
    /// The number of tasks submitted
    pub fn load_plugins(&mut self, tasks: Vec<ParseTask>) -> Result<usize, PipelineError> {
        if tasks.is_empty() {
            return Err(PipelineError::NoPlugins);
        }
        if !self.pool.is_ready() {
            return Err(PipelineError::PoolNotReady);
        }

        self.pool.reset();
        let generation = self.pool.generation();
        let total = tasks.len();

        self.state.update(|state| state.begin_load(total, generation));

        for task in tasks {
            let skip = task.skip_parsing || self.conflicts.game().is_canonical_master(&task.filename);
            let task = task.skip_parsing(skip);
            if self.pool.is_ready() {
                self.pool.submit(task)?;
            } else {
                self.pool.abandon(task, NO_WORKERS_REASON);
            }
        }

        tracing::info!("Loading {} plugins (generation {})", total, generation);
        for completed in self.pool.take_abandoned() {
            self.merge_outcome(completed.outcome);
        }
        Ok(total)
    }

    /// Receive the next worker event.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events_rx.recv().await
    }

    /// Apply one worker event; current-generation outcomes are merged.
    pub fn handle_event(&mut self, event: WorkerEvent) -> Vec<PipelineChange> {
        let mut changes = Vec::new();
        for completed in self.pool.handle_event(event) {
            changes.extend(self.merge_outcome(completed.outcome));
        }
        changes
    }

    /// Process worker events until no outcome is pending.
    pub async fn run_until_idle(&mut self) {
        while !self.state.read(PipelineState::is_idle) {
            match self.events_rx.recv().await {
                Some(event) => {
                    self.handle_event(event);
                }
                None => break,
            }
        }

        tracing::info!("Load finished: {}", self.state.read(PipelineState::summary));
    }

    fn merge_outcome(&mut self, outcome: ParseOutcome) -> Vec<PipelineChange> {
        let failed = outcome.parse_error.is_some();
        let filename = outcome.filename.clone();
        let conflicts = &self.conflicts;

        let changes = self.state.update(|state| {
            if !state.decrement_pending() {
                tracing::warn!("Merged {} with nothing pending", filename);
            }
            state.upsert_outcome(outcome);
            apply_load_order(state, conflicts);
        });

        self.metrics.record_outcome_merged(failed);
        tracing::debug!("Merged outcome for {}", filename);

        changes
    }

    /// Replace the load order text and reconcile.
    pub fn set_load_order(&mut self, text: impl Into<String>) -> Vec<PipelineChange> {
        let text = text.into();
        let conflicts = &self.conflicts;

        self.state.update(|state| {
            state.load_order_text = text;
            apply_load_order(state, conflicts);
        })
    }

    /// Flip one plugin's enabled flag.
    ///
    /// # Returns
    /// The new enabled flag
    ///
    /// # Errors
    /// [`PipelineError::UnknownPlugin`] if no record has that filename, and
    /// [`PipelineError::NotEnableable`] when enabling a record that failed to parse
    pub fn toggle_plugin(&mut self, filename: &str) -> Result<bool, PipelineError> {
        let record = self
            .state
            .read(|state| state.record(filename).cloned())
            .ok_or_else(|| PipelineError::UnknownPlugin(filename.to_string()))?;

        if !record.enabled && !record.can_enable() {
            return Err(PipelineError::NotEnableable {
                filename: record.filename,
                reason: record.parse_error.unwrap_or_default(),
            });
        }

        let enabled = !record.enabled;
        let conflicts = &self.conflicts;
        self.state.update(|state| {
            if let Some(record) = state.records.iter_mut().find(|r| r.filename == filename) {
                record.enabled = enabled;
            }
            state.conflicts = conflicts.aggregate(&state.records);
        });

        tracing::debug!("Toggled {} -> {}", filename, enabled);
        Ok(enabled)
    }

    /// Enable every enableable plugin, or disable all of them.
    ///
    /// Enabling skips canonical masters and failed records.
    pub fn set_all_enabled(&mut self, enabled: bool) -> Vec<PipelineChange> {
        let conflicts = &self.conflicts;

        self.state.update(|state| {
            for record in &mut state.records {
                record.enabled = enabled
                    && record.can_enable()
                    && !conflicts.game().is_canonical_master(&record.filename);
            }
            state.conflicts = conflicts.aggregate(&state.records);
        })
    }

    /// Cells of one loaded plugin, whatever its enabled flag.
    pub fn preview_plugin(&self, filename: &str) -> Option<CellConflictMap> {
        self.state
            .read(|state| state.record(filename).map(|r| self.conflicts.preview(r)))
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<PluginRecord> {
        self.state.read(|state| state.record_by_hash(hash).cloned())
    }

    /// Loaded plugins with an in-scope edit of `(x, y)`, in reconciled order.
    pub fn plugins_editing_cell(&self, x: i32, y: i32) -> Vec<PluginRecord> {
        self.state.read(|state| {
            self.conflicts
                .plugins_editing_cell(&state.records, x, y)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// The reconciled order as `plugins.txt` text.
    pub fn render_load_order(&self) -> String {
        self.state.read(|state| render_load_order(&state.records))
    }

    /// Retire every worker. Loaded records stay; an unfinished load is cancelled.
    pub fn terminate_all(&mut self) -> Vec<PipelineChange> {
        self.pool.terminate_all();
        let generation = self.pool.generation();
        self.state.update(|state| state.cancel_load(generation))
    }

    /// Respawn workers after [`terminate_all`](Self::terminate_all).
    pub fn restart_workers(&mut self) -> Result<(), PipelineError> {
        self.pool.start()?;
        Ok(())
    }

    /// Forget every loaded plugin and drop queued work.
    pub fn clear(&mut self) -> Vec<PipelineChange> {
        self.pool.reset();
        let generation = self.pool.generation();
        let mut changes = self.state.update(|state| state.cancel_load(generation));
        changes.extend(self.state.reset());
        changes
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineChange> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn game(&self) -> &GameData {
        self.conflicts.game()
    }
}

/// Reconcile the record set against the current text and recompute conflicts.
fn apply_load_order(state: &mut PipelineState, conflicts: &CellConflictService) {
    let records = std::mem::take(&mut state.records);
    state.records = reconcile(records, &state.load_order_text);
    state.conflicts = conflicts.aggregate(&state.records);
}
