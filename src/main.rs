//! cellmap - command line front end for the plugin pipeline
//!
//! # Overview
//!
//! Every subcommand runs the same load:
//! 1. Load `Cellmap Settings.yaml` from the config directory (defaults if missing)
//! 2. Initialize logging (daily rotated file, optional stderr console)
//! 3. Spawn the parse worker pool and wait for readiness
//! 4. Apply the load order text, enumerate the data directory, queue every plugin
//! 5. Drive worker events until nothing is pending
//!
//! and then reports on the reconciled result:
//! - `scan`: JSON report of every plugin and every edited cell, optionally exporting the
//!   reconciled load order
//! - `preview`: the cells one plugin edits, whether or not it is enabled
//! - `cell`: the plugins editing one grid cell
//!
//! The coordinator runs on a current-thread tokio runtime; parsing happens on the pool's
//! own OS threads.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use cellmap::models::{CellEntry, PluginRecord, format_bytes};
use cellmap::services::discovery;
use cellmap::{APP_NAME, ConfigManager, PluginPipeline, UserConfig, VERSION, WorkerPolicy};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "cellmap", version, about = "Plugin load order and cell conflict mapper")]
struct Cli {
    /// Directory holding `Cellmap Settings.yaml`
    #[arg(long, global = true, default_value = "Cellmap Data")]
    config_dir: Utf8PathBuf,

    /// Also log to stderr
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a data directory and report every plugin and edited cell
    Scan {
        #[command(flatten)]
        load: LoadArgs,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,

        /// Export the reconciled load order as plugins.txt
        #[arg(long)]
        write_load_order: Option<Utf8PathBuf>,
    },

    /// Show the cells one plugin edits
    Preview {
        #[command(flatten)]
        load: LoadArgs,

        #[arg(long)]
        plugin: String,
    },

    /// List the plugins editing one grid cell
    Cell {
        #[command(flatten)]
        load: LoadArgs,

        #[arg(long, allow_negative_numbers = true)]
        x: i32,

        #[arg(long, allow_negative_numbers = true)]
        y: i32,
    },
}

#[derive(Args)]
struct LoadArgs {
    /// Game data directory (or game root containing `Data`)
    #[arg(short, long)]
    data_dir: Utf8PathBuf,

    /// Load order file; overrides `Load Order TXT` from the settings
    #[arg(long)]
    plugins_txt: Option<Utf8PathBuf>,

    /// Number of parse workers; overrides `Worker Count`
    #[arg(long)]
    workers: Option<usize>,

    /// `reuse` or `recycle`; overrides `Worker Policy`
    #[arg(long)]
    policy: Option<WorkerPolicy>,
}

#[derive(Serialize)]
struct PluginSummary<'a> {
    filename: &'a str,
    hash: &'a str,
    size: String,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_error: Option<&'a str>,
}

impl<'a> From<&'a PluginRecord> for PluginSummary<'a> {
    fn from(record: &'a PluginRecord) -> Self {
        Self {
            filename: &record.filename,
            hash: &record.hash,
            size: format_bytes(record.size, 2),
            enabled: record.enabled,
            parse_error: record.parse_error.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ScanReport<'a> {
    plugins: Vec<PluginSummary<'a>>,
    edited_cells: usize,
    conflicted_cells: usize,
    cells: Vec<&'a CellEntry>,
}

#[derive(Serialize)]
struct CellReport<'a> {
    x: i32,
    y: i32,
    conflicted: bool,
    plugins: Vec<PluginSummary<'a>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let config = config_manager.load_user_config()?;

    let _guard = cellmap::logging::setup_logging_with_console(
        &config.pipeline_settings.log_dir,
        APP_NAME,
        config.pipeline_settings.debug_mode,
        cli.verbose,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run(cli.command, config));

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    tracing::info!("Shutdown complete");

    result
}

async fn run(command: Commands, config: UserConfig) -> Result<()> {
    match command {
        Commands::Scan {
            load,
            output,
            write_load_order,
        } => {
            let mut pipeline = load_pipeline(&load, config).await?;
            let state = pipeline.state().snapshot();

            let report = ScanReport {
                plugins: state.records.iter().map(PluginSummary::from).collect(),
                edited_cells: state.conflicts.len(),
                conflicted_cells: state.conflicts.conflict_count(),
                cells: state.conflicts.iter().collect(),
            };
            let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("Failed to write report: {}", path))?;
                    tracing::info!("Wrote report to {}", path);
                }
                None => println!("{}", json),
            }

            if let Some(path) = write_load_order {
                tokio::fs::write(&path, pipeline.render_load_order())
                    .await
                    .with_context(|| format!("Failed to write load order: {}", path))?;
                tracing::info!("Wrote reconciled load order to {}", path);
            }

            finish(&mut pipeline);
        }
        Commands::Preview { load, plugin } => {
            let mut pipeline = load_pipeline(&load, config).await?;

            let preview = pipeline
                .preview_plugin(&plugin)
                .with_context(|| format!("Plugin is not loaded: {}", plugin))?;
            let cells: Vec<&CellEntry> = preview.iter().collect();
            println!("{}", serde_json::to_string_pretty(&cells)?);

            finish(&mut pipeline);
        }
        Commands::Cell { load, x, y } => {
            let mut pipeline = load_pipeline(&load, config).await?;

            let editors = pipeline.plugins_editing_cell(x, y);
            let conflicted = pipeline
                .state()
                .read(|state| state.conflicts.get_cell(x, y).is_some_and(|c| c.conflicted));
            let report = CellReport {
                x,
                y,
                conflicted,
                plugins: editors.iter().map(PluginSummary::from).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);

            finish(&mut pipeline);
        }
    }

    Ok(())
}

/// Build the pipeline, apply the load order and ingest the data directory.
async fn load_pipeline(load: &LoadArgs, mut config: UserConfig) -> Result<PluginPipeline> {
    let settings = &mut config.pipeline_settings;
    if let Some(workers) = load.workers {
        settings.worker_count = workers;
    }
    if let Some(policy) = load.policy {
        settings.worker_policy = policy;
    }

    let load_order_path = load.plugins_txt.clone().or_else(|| {
        (!settings.loadorder_txt.is_empty()).then(|| Utf8PathBuf::from(&settings.loadorder_txt))
    });

    let mut pipeline = PluginPipeline::from_config(&config)?;
    pipeline.wait_until_ready().await;

    match load_order_path {
        Some(path) => {
            let text = discovery::read_load_order(&path).await?;
            pipeline.set_load_order(text);
            tracing::info!("Applied load order from {}", path);
        }
        None => tracing::warn!("No load order configured, plugins sorted by modification time"),
    }

    let paths = discovery::find_plugin_files(&load.data_dir).await?;
    let tasks = discovery::read_parse_tasks(&paths, pipeline.game()).await;
    pipeline.load_plugins(tasks)?;
    pipeline.run_until_idle().await;

    Ok(pipeline)
}

fn finish(pipeline: &mut PluginPipeline) {
    pipeline.terminate_all();
    pipeline.metrics().log_summary();
}
