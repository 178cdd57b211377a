// cellmap - parallel plugin ingestion, load order reconciliation and cell conflict maps
//
// This is the library crate containing the pipeline and its data structures.
// The binary crate (main.rs) provides the CLI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::PipelineMetrics;
pub use models::{
    CellConflictMap, CellEntry, GameData, ParseOutcome, ParseTask, PipelineSettings,
    PipelineState, PluginRecord, UserConfig, WorkerPolicy,
};
pub use pipeline::{PipelineError, PluginPipeline};
pub use state::{PipelineChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
