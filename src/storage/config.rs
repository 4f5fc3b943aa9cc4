//! Configuration handling for taskdeps
//!
//! Configuration is stored in `.taskdeps/config.toml` (project) and
//! `~/.config/taskdeps/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DependencyType, DEFAULT_PROJECT};

/// Name of the per-project data directory
pub const DATA_DIR: &str = ".taskdeps";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Which edge store a project uses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// `dependencies.jsonl`, one edge per line
    #[default]
    Jsonl,
    /// `dependencies.db`
    Sqlite,
}

/// Whether an edge may link tasks of different projects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrossProjectPolicy {
    #[default]
    Allow,
    Deny,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
}

/// Rules for dependency operations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DependencyConfig {
    /// Type used by `dep add` when `--type` is omitted
    pub default_type: DependencyType,

    /// Deleting a missing edge succeeds instead of failing with not-found
    pub idempotent_delete: bool,

    /// Edges between tasks of different projects
    pub cross_project: CrossProjectPolicy,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project key for new tasks when `--project` is omitted
    pub default_project: String,

    /// Storage settings
    pub storage: StorageConfig,

    /// Dependency settings
    pub dependencies: DependencyConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            default_project: DEFAULT_PROJECT.to_string(),
            storage: StorageConfig::default(),
            dependencies: DependencyConfig::default(),
        }
    }
}

impl ProjectConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_project.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_project must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Log filter used when neither flags nor `TASKDEPS_LOG` set one
    pub log_level: Option<String>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Configuration of an opened project
///
/// Global settings are read separately through [`Config::load_global`].
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
}

impl Config {
    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        Ok(Self {
            project: Self::load_project_config(project_root)?,
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "taskdeps", "taskdeps")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse global config: {}", config_path.display()))
    }

    /// Loads project configuration from a specific root
    pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(DATA_DIR).join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| {
                format!("Failed to parse project config: {}", config_path.display())
            })?;

        config
            .validate()
            .with_context(|| format!("In project config: {}", config_path.display()))?;

        Ok(config)
    }

    /// Finds the project root by looking for a `.taskdeps/` directory
    /// in the current directory or any parent
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Finds the project root starting at `start`
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(DATA_DIR).is_dir())
            .map(Path::to_path_buf)
    }
}
