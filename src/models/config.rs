use serde::{Deserialize, Serialize};

/// User configuration from `Cellmap Settings.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserConfig {
    #[serde(rename = "Pipeline_Settings", default)]
    pub pipeline_settings: PipelineSettings,

    #[serde(rename = "Game_Data", default)]
    pub game_data: GameData,
}

/// What happens to a parse worker after it finishes a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPolicy {
    /// Return the worker to the idle list.
    #[default]
    Reuse,
    /// Retire the worker and spawn a fresh one, resetting parser memory.
    Recycle,
}

impl std::str::FromStr for WorkerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reuse" => Ok(Self::Reuse),
            "recycle" => Ok(Self::Recycle),
            other => Err(format!("unknown worker policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    /// Number of parse workers; 0 means hardware concurrency
    #[serde(rename = "Worker Count", default)]
    pub worker_count: usize,

    #[serde(rename = "Worker Policy", default)]
    pub worker_policy: WorkerPolicy,

    /// External cell dumper; empty means files already hold JSON dumps
    #[serde(rename = "Parser Command", default)]
    pub parser_command: String,

    #[serde(rename = "Parser Args", default)]
    pub parser_args: Vec<String>,

    #[serde(rename = "Load Order TXT", default)]
    pub loadorder_txt: String,

    #[serde(rename = "Log Directory", default = "default_log_dir")]
    pub log_dir: String,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_count: 0,
            worker_policy: WorkerPolicy::Reuse,
            parser_command: String::new(),
            parser_args: Vec::new(),
            loadorder_txt: String::new(),
            log_dir: default_log_dir(),
            debug_mode: false,
        }
    }
}

impl PipelineSettings {
    /// Resolved parallelism degree: configured count, else hardware concurrency, else 8.
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }

        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(DEFAULT_WORKER_COUNT)
    }
}

/// Fallback worker count when hardware concurrency is unknown.
pub const DEFAULT_WORKER_COUNT: usize = 8;

fn default_log_dir() -> String {
    "logs".to_string()
}

/// Game-specific constants used by ingestion and cell aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameData {
    /// Master a plugin must list first for its cells to land on the overworld grid
    #[serde(rename = "Base Master", default = "default_base_master")]
    pub base_master: String,

    /// Base-game masters that are hashed but never parsed
    #[serde(rename = "Canonical Masters", default = "default_canonical_masters")]
    pub canonical_masters: Vec<String>,

    /// Form id of the overworld worldspace (Tamriel)
    #[serde(rename = "Overworld World Id", default = "default_overworld_world_id")]
    pub overworld_world_id: u32,
}

impl Default for GameData {
    fn default() -> Self {
        Self {
            base_master: default_base_master(),
            canonical_masters: default_canonical_masters(),
            overworld_world_id: default_overworld_world_id(),
        }
    }
}

impl GameData {
    /// Exact, case-sensitive match against the canonical master list.
    pub fn is_canonical_master(&self, filename: &str) -> bool {
        self.canonical_masters.iter().any(|m| m == filename)
    }
}

fn default_base_master() -> String {
    "Skyrim.esm".to_string()
}

fn default_canonical_masters() -> Vec<String> {
    vec![
        "Skyrim.esm".to_string(),
        "Update.esm".to_string(),
        "Dawnguard.esm".to_string(),
        "HearthFires.esm".to_string(),
        "Dragonborn.esm".to_string(),
    ]
}

fn default_overworld_world_id() -> u32 {
    60
}
