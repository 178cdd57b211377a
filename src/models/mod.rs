//! Data models for the cellmap pipeline.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`ParseTask`] / [`ParseOutcome`]: the messages crossing the worker boundary
//! - [`PluginRecord`]: a reconciled plugin with its enabled flag
//! - [`LoadOrderLine`]: one parsed line of a `plugins.txt` load order
//! - [`CellConflictMap`]: per-grid-cell edits and conflicts of the enabled plugins
//! - [`PipelineState`]: the shared record set wrapped by [`StateManager`](crate::state::StateManager)
//! - [`UserConfig`]: settings loaded from `Cellmap Settings.yaml`

pub mod cells;
pub mod config;
pub mod load_order;
pub mod pipeline_state;
pub mod plugin;

pub use cells::{CellConflictMap, CellEntry, grid_coords, grid_id};
pub use config::{DEFAULT_WORKER_COUNT, GameData, PipelineSettings, UserConfig, WorkerPolicy};
pub use load_order::{LoadOrderLine, parse_load_order};
pub use pipeline_state::PipelineState;
pub use plugin::{
    CellRecord, ParseOutcome, ParseTask, ParsedPlugin, PluginHeader, PluginRecord, WorldRecord,
    format_bytes,
};
