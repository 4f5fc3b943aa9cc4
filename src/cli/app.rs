//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use super::output::{Output, OutputFormat};
use super::{dep, schedule, task};
use crate::storage::Project;

#[derive(Parser)]
#[command(name = "taskdeps")]
#[command(
    author,
    version,
    about = "Typed task dependencies with cycle checks and schedule constraints"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to `default_format` in the global config)
    #[arg(long, short = 'f', global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log level (overrides --verbose and TASKDEPS_LOG)
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log level accepted by `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new taskdeps project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Manage dependencies between tasks
    #[command(subcommand)]
    Dep(dep::DepCommands),

    /// Inspect the schedule constraints implied by dependencies
    #[command(subcommand)]
    Schedule(schedule::ScheduleCommands),
}

/// Runs a parsed command line
pub fn execute(cli: Cli, output: &Output) -> Result<()> {
    match cli.command {
        Commands::Init { path } => {
            debug!(path = %path, "initializing project");
            let project = Project::init(&path)?;
            output.success(&format!(
                "Initialized taskdeps project at {}",
                project.root().display()
            ));
        }

        Commands::Task(cmd) => task::run(cmd, output)?,
        Commands::Dep(cmd) => dep::run(cmd, output)?,
        Commands::Schedule(cmd) => schedule::run(cmd, output)?,
    }

    debug!("command completed");
    Ok(())
}
