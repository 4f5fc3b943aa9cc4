//! Project management
//!
//! Handles project initialization and provides access to stores.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::{Backend, DATA_DIR};
use super::{Config, EdgeStore, JsonlEdgeStore, SqliteEdgeStore, TaskStore};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a taskdeps project. Run 'taskdeps init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# taskdeps configuration

# Project key for new tasks when --project is omitted
default_project = "default"

[storage]
# Edge store backend: "jsonl" (git-friendly) or "sqlite"
backend = "jsonl"

[dependencies]
# Type used by 'taskdeps dep add' when --type is omitted
default_type = "finish_to_start"

# Treat deleting a missing dependency as success
idempotent_delete = false

# Edges between tasks of different projects: "allow" or "deny"
cross_project = "allow"
"#;

const GITIGNORE: &str = r#"# Lock and temp files from in-flight writes
*.lock
*.tmp

# SQLite sidecar files
*.db-wal
*.db-shm
"#;

/// A taskdeps project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(DATA_DIR).is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Existing files are left untouched, so running this twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let data_dir = root.join(DATA_DIR);

        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create {} directory: {}", DATA_DIR, data_dir.display())
        })?;

        let config_path = data_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = data_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .taskdeps directory path
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the task store
    pub fn task_store(&self) -> TaskStore {
        TaskStore::for_project(&self.root)
    }

    /// Opens the edge store selected by `storage.backend`
    pub fn edge_store(&self) -> Result<Box<dyn EdgeStore>> {
        let store: Box<dyn EdgeStore> = match self.config.project.storage.backend {
            Backend::Jsonl => Box::new(JsonlEdgeStore::for_project(&self.root)),
            Backend::Sqlite => Box::new(SqliteEdgeStore::for_project(&self.root)?),
        };
        Ok(store)
    }
}
