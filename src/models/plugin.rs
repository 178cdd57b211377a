use serde::{Deserialize, Serialize};

/// A selected plugin file waiting for a parse worker.
///
/// The byte buffer is moved into the worker's channel on dispatch, never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTask {
    pub filename: String,
    /// Last-modified time in milliseconds since the Unix epoch
    pub last_modified: i64,
    pub contents: Vec<u8>,
    /// Hash only, no structured record (canonical base-game masters)
    pub skip_parsing: bool,
}

impl ParseTask {
    pub fn new(filename: impl Into<String>, last_modified: i64, contents: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            last_modified,
            contents,
            skip_parsing: false,
        }
    }

    pub fn skip_parsing(mut self, skip: bool) -> Self {
        self.skip_parsing = skip;
        self
    }
}

/// Plugin header as reported by the cell dumper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PluginHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub masters: Vec<String>,
    #[serde(default)]
    pub next_object_id: u32,
    #[serde(default)]
    pub num_records_and_groups: u32,
    #[serde(default)]
    pub version: f32,
}

/// A single CELL record edited by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub form_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_id: Option<String>,
    #[serde(default)]
    pub is_persistent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_form_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

impl CellRecord {
    /// Grid coordinates, if the cell is an exterior cell.
    pub fn coords(&self) -> Option<(i32, i32)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }
}

/// A WRLD record edited by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRecord {
    pub form_id: u32,
    #[serde(default)]
    pub editor_id: String,
}

/// Structured record produced by the plugin parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParsedPlugin {
    pub header: PluginHeader,
    #[serde(default)]
    pub cells: Vec<CellRecord>,
    #[serde(default)]
    pub worlds: Vec<WorldRecord>,
}

impl ParsedPlugin {
    pub fn first_master(&self) -> Option<&str> {
        self.header.masters.first().map(String::as_str)
    }
}

/// What a worker reports back for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub filename: String,
    pub last_modified: i64,
    /// Base-36 content fingerprint; used for linking and dedup, never for ordering
    pub hash: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedPlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ParseOutcome {
    /// Initial enabled state: a structured record arrived and nothing failed.
    pub fn enabled(&self) -> bool {
        self.parsed.is_some() && self.parse_error.is_none()
    }
}

/// A reconciled plugin: a parse outcome plus its enabled flag.
///
/// `filename` is the identity key. Two records with the same filename never coexist
/// in the pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub filename: String,
    pub last_modified: i64,
    pub hash: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedPlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    pub enabled: bool,
}

impl PluginRecord {
    /// Records that failed to parse stay visible but can never be enabled.
    pub fn can_enable(&self) -> bool {
        self.parse_error.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.parse_error.is_some()
    }

    pub fn cells(&self) -> &[CellRecord] {
        self.parsed.as_ref().map(|p| p.cells.as_slice()).unwrap_or(&[])
    }

    pub fn first_master(&self) -> Option<&str> {
        self.parsed.as_ref().and_then(ParsedPlugin::first_master)
    }
}

impl From<ParseOutcome> for PluginRecord {
    fn from(outcome: ParseOutcome) -> Self {
        let enabled = outcome.enabled();
        Self {
            filename: outcome.filename,
            last_modified: outcome.last_modified,
            hash: outcome.hash,
            size: outcome.size,
            parsed: outcome.parsed,
            parse_error: outcome.parse_error,
            enabled,
        }
    }
}

/// Human-readable byte size ("1.5 KB", "0 Bytes").
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    const UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let k = 1024f64;
    let value = bytes as f64;
    let exponent = ((value.ln() / k.ln()).floor() as usize).min(UNITS.len() - 1);
    let scaled = value / k.powi(exponent as i32);

    // Trim trailing zeros the way a float-to-string round trip would
    let formatted = format!("{:.*}", decimals, scaled);
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };

    format!("{} {}", trimmed, UNITS[exponent])
}
