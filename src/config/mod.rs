use crate::models::UserConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the user settings inside the config directory.
pub const USER_CONFIG_FILE: &str = "Cellmap Settings.yaml";

/// Configuration manager for loading and saving the YAML settings file.
///
/// Manages `Cellmap Settings.yaml`: pipeline settings (workers, parser adapter, load
/// order path, logging) and game data (base master, canonical masters, overworld id).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing the settings file (e.g., "Cellmap Data")
    ///
    /// # Returns
    /// A new ConfigManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the user configuration file.
    ///
    /// # Returns
    /// The loaded UserConfig, or default if file doesn't exist
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.user_config_path)
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!("Loaded user config from {}", self.user_config_path);
        Ok(config)
    }

    /// Save the user configuration file.
    ///
    /// # Arguments
    /// * `config` - The UserConfig to save
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkerPolicy;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.user_config_path().ends_with(USER_CONFIG_FILE));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let loaded = manager.load_user_config().unwrap();

        assert_eq!(loaded, UserConfig::default());
    }

    #[test]
    fn test_load_save_user_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = UserConfig::default();
        config.pipeline_settings.worker_count = 4;
        config.pipeline_settings.worker_policy = WorkerPolicy::Recycle;
        manager.save_user_config(&config).unwrap();

        let loaded = manager.load_user_config().unwrap();
        assert_eq!(loaded.pipeline_settings.worker_count, 4);
        assert_eq!(loaded.pipeline_settings.worker_policy, WorkerPolicy::Recycle);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.user_config_path(), "Pipeline_Settings: [not, a, map]").unwrap();

        let err = manager.load_user_config().unwrap_err();
        assert!(err.to_string().contains("Failed to parse user config"));
    }
}
