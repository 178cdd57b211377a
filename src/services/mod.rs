//! Services module - the pipeline's business logic.
//!
//! Everything here is independent of the CLI and can be driven directly from tests.
//!
//! # Components
//!
//! - [`worker_pool`]: fixed-size pool of parse worker threads with a FIFO backlog,
//!   reuse/recycle policy and generation-tagged cancellation
//! - [`parser`]: the [`PluginParser`] seam, content hashing and the two shipped adapters
//! - [`load_order`]: reconciles parsed records against a `plugins.txt` style text
//! - [`cell_conflicts`]: overworld cell edits and conflicts of the enabled plugins
//! - [`discovery`]: async data directory enumeration and file reads
//!
//! # Usage Example
//!
//! ```ignore
//! use cellmap::services::{discovery, load_order};
//!
//! let paths = discovery::find_plugin_files(data_dir).await?;
//! let tasks = discovery::read_parse_tasks(&paths, &game).await;
//! ```

pub mod cell_conflicts;
pub mod discovery;
pub mod load_order;
pub mod parser;
pub mod worker_pool;

pub use cell_conflicts::CellConflictService;
pub use discovery::{find_plugin_files, is_plugin_path, read_load_order, read_parse_tasks};
pub use load_order::{reconcile, render_load_order};
pub use parser::{
    CommandParser, DumpParser, ParserError, ParserFactory, PluginParser, hash_plugin,
    parser_factory,
};
pub use worker_pool::{CompletedTask, PoolError, WorkerEvent, WorkerId, WorkerPool, parse_task};
