//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Task | Task records and dates | `task add`, `task dates`, `task rm` |
//! | Dep | Dependency edges | `dep add`, `dep set`, `dep list` |
//! | Schedule | Derived constraints | `schedule constraints`, `schedule check` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr:
//! ```bash
//! taskdeps --verbose dep add t-1a2b3c4 t-5d6e7f8
//! ```
//!
//! ## Entry Point
//!
//! Parse a [`Cli`] and pass it to [`execute()`].

mod app;
mod dep;
mod output;
mod schedule;
mod task;

pub use app::{execute, Cli, Commands, LogLevel};
pub use output::{error_code, Output, OutputFormat};
