use std::{
    fs,
    path::{Path, PathBuf}
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Executor configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Slots of the shared blocking pool
    pub thread_pool_size:    usize,
    /// Concurrently running worker processes
    pub process_pool_size:   usize,
    /// Registry auto-registers unknown structures on lookup
    pub allow_auto_register: bool,
    /// Registry accepts identifier and type re-registration
    pub allow_overwrite:     bool,
    /// Agent name carried in every passport
    pub agent_name:          String
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_pool_size:    4,
            process_pool_size:   2,
            allow_auto_register: false,
            allow_overwrite:     false,
            agent_name:          "actorun".to_string()
        }
    }
}

/// Get the project directories for cross-platform config path resolution
pub fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "actorun").context("Failed to determine project directories")
}

/// Get the config file path
pub fn get_config_file_path() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    Ok(project_dirs.config_dir().join("config.yaml"))
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<ExecutorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load the per-user configuration, writing the defaults there when it doesn't exist
pub fn load_default_config() -> Result<ExecutorConfig> {
    let config_path = get_config_file_path()?;

    if config_path.exists() {
        load_config(&config_path)
    } else {
        let config = ExecutorConfig::default();
        save_config(&config, &config_path)?;
        Ok(config)
    }
}

/// Save configuration to a file
pub fn save_config(config: &ExecutorConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(config).context("Failed to serialize config")?;

    fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = ExecutorConfig { thread_pool_size: 8, agent_name: "lab-agent".to_string(), ..Default::default() };
        save_config(&config, &path).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "allow_auto_register: true\n").unwrap();

        let config = load_config(&path).unwrap();

        assert!(config.allow_auto_register);
        assert_eq!(config.thread_pool_size, 4);
        assert_eq!(config.agent_name, "actorun");
    }

    #[test]
    fn test_unreadable_config_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "thread_pool_size: [not, a, number]\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        let err = load_config(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
