//! Plugin discovery: turn a game data directory into parse tasks.
//!
//! Enumeration and reads are async (`tokio::fs`) so a large data directory never blocks
//! the coordinator. A selected game root is accepted too: its `Data` subdirectory is
//! searched as well.

use crate::models::{GameData, ParseTask};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;

/// `.esm`, `.esp` or `.esl` directly in a data dir, optionally under a game root.
static PLUGIN_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^((Skyrim Special Edition|Skyrim|SkyrimVR)/)?(Data/)?[^/\\]*\.es[mpl]$")
        .expect("Invalid plugin path regex")
});

/// Check a relative path (forward slashes) against the accepted plugin locations.
pub fn is_plugin_path(path: &str) -> bool {
    PLUGIN_PATH.is_match(path)
}

/// List plugin files in `data_dir` and its `Data` subdirectory, sorted by path.
pub async fn find_plugin_files(data_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut found = Vec::new();
    let mut dirs = vec![(data_dir.to_path_buf(), true)];

    while let Some((dir, descend)) = dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", dir))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to read directory entry in: {}", dir))?
        {
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                tracing::warn!("Skipping non UTF-8 path: {}", entry.path().display());
                continue;
            };
            let Some(name) = path.file_name() else {
                continue;
            };

            let file_type = entry
                .file_type()
                .await
                .with_context(|| format!("Failed to stat: {}", path))?;

            if file_type.is_dir() {
                if descend && name.eq_ignore_ascii_case("Data") {
                    dirs.push((path, false));
                }
            } else if is_plugin_path(name) {
                found.push(path);
            }
        }
    }

    found.sort();
    tracing::info!("Found {} plugin files under {}", found.len(), data_dir);
    Ok(found)
}

/// Read plugin files into parse tasks.
///
/// Canonical masters get `skip_parsing`. Unreadable files are logged and skipped so one
/// locked file does not abort a whole load.
pub async fn read_parse_tasks(paths: &[Utf8PathBuf], game: &GameData) -> Vec<ParseTask> {
    let mut tasks = Vec::with_capacity(paths.len());

    for path in paths {
        match read_parse_task(path, game).await {
            Ok(task) => tasks.push(task),
            Err(e) => tracing::warn!("Skipping {}: {:#}", path, e),
        }
    }

    tasks
}

async fn read_parse_task(path: &Utf8Path, game: &GameData) -> Result<ParseTask> {
    let filename = path
        .file_name()
        .with_context(|| format!("Path has no file name: {}", path))?
        .to_string();

    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat plugin: {}", path))?;
    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_millis() as i64)
        .unwrap_or(0);

    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read plugin: {}", path))?;

    let skip = game.is_canonical_master(&filename);
    Ok(ParseTask::new(filename, last_modified, contents).skip_parsing(skip))
}

/// Read a `plugins.txt` style load order file.
pub async fn read_load_order(path: &Utf8Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read load order: {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_is_plugin_path() {
        assert!(is_plugin_path("SkyUI_SE.esp"));
        assert!(is_plugin_path("Unofficial Skyrim Special Edition Patch.ESP"));
        assert!(is_plugin_path("ccBGSSSE001-Fish.esl"));
        assert!(is_plugin_path("Data/Skyrim.esm"));
        assert!(is_plugin_path("Skyrim Special Edition/Data/Update.esm"));
        assert!(is_plugin_path("SkyrimVR/Data/SkyrimVR.esm"));

        assert!(!is_plugin_path("SkyUI_SE.bsa"));
        assert!(!is_plugin_path("meshes/foo.esp"));
        assert!(!is_plugin_path("Data/Sub/foo.esp"));
        assert!(!is_plugin_path("Plugin.esp.bak"));
    }

    #[tokio::test]
    async fn test_find_plugin_files_in_root_and_data() {
        let temp = TempDir::new().unwrap();
        let root = utf8_dir(&temp);
        fs::write(root.join("Root.esp"), b"a").unwrap();
        fs::write(root.join("readme.txt"), b"a").unwrap();
        fs::create_dir(root.join("Data")).unwrap();
        fs::write(root.join("Data").join("Skyrim.esm"), b"b").unwrap();
        fs::create_dir(root.join("Data").join("Data")).unwrap();
        fs::write(root.join("Data").join("Data").join("Deep.esp"), b"c").unwrap();
        fs::create_dir(root.join("meshes")).unwrap();
        fs::write(root.join("meshes").join("Hidden.esp"), b"d").unwrap();

        let found = find_plugin_files(&root).await.unwrap();
        let names: Vec<&str> = found.iter().filter_map(|p| p.file_name()).collect();

        assert_eq!(names, vec!["Skyrim.esm", "Root.esp"]);
    }

    #[tokio::test]
    async fn test_find_plugin_files_missing_dir() {
        let temp = TempDir::new().unwrap();
        let missing = utf8_dir(&temp).join("nope");
        assert!(find_plugin_files(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_read_parse_tasks_flags_canonical_masters() {
        let temp = TempDir::new().unwrap();
        let root = utf8_dir(&temp);
        fs::write(root.join("Skyrim.esm"), b"master").unwrap();
        fs::write(root.join("Mod.esp"), b"mod").unwrap();

        let paths = vec![
            root.join("Skyrim.esm"),
            root.join("Mod.esp"),
            root.join("Gone.esp"),
        ];
        let tasks = read_parse_tasks(&paths, &GameData::default()).await;

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].filename, "Skyrim.esm");
        assert!(tasks[0].skip_parsing);
        assert_eq!(tasks[1].contents, b"mod");
        assert!(!tasks[1].skip_parsing);
        assert!(tasks[1].last_modified > 0);
    }

    #[tokio::test]
    async fn test_read_load_order() {
        let temp = TempDir::new().unwrap();
        let path = utf8_dir(&temp).join("plugins.txt");
        fs::write(&path, "*Mod.esp\r\n").unwrap();

        assert_eq!(read_load_order(&path).await.unwrap(), "*Mod.esp\r\n");
    }
}
