//! # Storage Layer
//!
//! Persistence for tasks and dependency edges.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Tasks | JSONL (one JSON per line) | `.taskdeps/tasks.jsonl` |
//! | Edges (default) | JSONL | `.taskdeps/dependencies.jsonl` |
//! | Edges (`backend = "sqlite"`) | SQLite | `.taskdeps/dependencies.db` |
//! | Config | TOML | `.taskdeps/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - JSONL files are guarded by `fs2` locks on a sibling `.lock` file
//! - SQLite mutations run in `BEGIN IMMEDIATE` transactions
//! - JSONL writes are atomic (temp file + rename)
//! - Every [`EdgeStore::insert`] runs its duplicate and cycle checks
//!   under the same lock as the write
//!
//! ## Project Structure
//!
//! ```text
//! .taskdeps/
//! ├── tasks.jsonl           # Task records
//! ├── dependencies.jsonl    # Dependency edges (jsonl backend)
//! ├── dependencies.db       # Dependency edges (sqlite backend)
//! ├── config.toml           # Project configuration
//! └── .gitignore            # Ignores lock and temp files
//! ```
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a taskdeps project
//! - [`EdgeStore`] - Interface shared by the edge backends
//! - [`TaskStore`] - Read/write tasks as JSONL
//! - [`Config`] - Project and global configuration

mod config;
mod edge_store;
mod edges_jsonl;
mod edges_sqlite;
mod jsonl;
mod memory;
mod project;

pub use config::{
    Backend, Config, ConfigError, CrossProjectPolicy, DependencyConfig, GlobalConfig,
    OutputFormat, ProjectConfig, StorageConfig, DATA_DIR,
};
pub use edge_store::{EdgeStore, StoreError, StoreResult};
pub use edges_jsonl::JsonlEdgeStore;
pub use edges_sqlite::SqliteEdgeStore;
pub use jsonl::TaskStore;
pub use memory::MemoryEdgeStore;
pub use project::{Project, ProjectError};
