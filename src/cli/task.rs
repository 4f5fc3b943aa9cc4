//! Task CLI commands

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use tracing::info;

use super::dep::{describe_edge, open_manager};
use super::output::Output;
use crate::domain::{Task, TaskId};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    ///
    /// Examples:
    ///   taskdeps task add "Pour foundation" --start 2025-03-01 --finish 2025-03-05
    ///   taskdeps task add "Landing page" --project web
    Add {
        /// Task title
        title: String,

        /// Project key (defaults to `default_project` in the config)
        #[arg(long, short)]
        project: Option<String>,

        /// Planned start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Planned finish date (YYYY-MM-DD)
        #[arg(long)]
        finish: Option<NaiveDate>,
    },

    /// List tasks
    List {
        /// Only tasks of this project
        #[arg(long, short)]
        project: Option<String>,
    },

    /// Show a task and its dependencies
    Show {
        /// Task ID
        id: String,
    },

    /// Set or clear a task's planned dates
    Dates {
        /// Task ID
        id: String,

        /// Planned start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Planned finish date (YYYY-MM-DD)
        #[arg(long)]
        finish: Option<NaiveDate>,

        /// Remove both dates
        #[arg(long, conflicts_with_all = ["start", "finish"])]
        clear: bool,
    },

    /// Remove a task and every dependency touching it
    Rm {
        /// Task ID
        id: String,
    },
}

pub fn run(cmd: TaskCommands, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            title,
            project,
            start,
            finish,
        } => add_task(output, &title, project, start, finish),
        TaskCommands::List { project } => list_tasks(output, project.as_deref()),
        TaskCommands::Show { id } => show_task(output, &id),
        TaskCommands::Dates {
            id,
            start,
            finish,
            clear,
        } => set_dates(output, &id, start, finish, clear),
        TaskCommands::Rm { id } => remove_task(output, &id),
    }
}

fn add_task(
    output: &Output,
    title: &str,
    project_key: Option<String>,
    start: Option<NaiveDate>,
    finish: Option<NaiveDate>,
) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();

    let key = project_key.unwrap_or_else(|| project.config().project.default_project.clone());
    let mut task = Task::new(TaskId::new(title, Utc::now()), title, key)?;
    if start.is_some() || finish.is_some() {
        task.set_dates(start, finish)?;
    }

    store.insert(&task)?;
    info!(task = %task.id, project = %task.project, "task added");

    if output.is_json() {
        output.data(&task);
    } else {
        output.success(&format!("Created task: {} - {}", task.id, task.title));
    }

    Ok(())
}

fn list_tasks(output: &Output, project_key: Option<&str>) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();

    let tasks = match project_key {
        Some(key) => store.read_for_project(key)?,
        None => store.read_all()?,
    };

    let mut sorted: Vec<_> = tasks.values().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    if output.is_json() {
        output.data(&sorted);
    } else if sorted.is_empty() {
        match project_key {
            Some(key) => println!("No tasks in project {}", key),
            None => println!("No tasks"),
        }
    } else {
        println!(
            "{:<10} {:<12} {:<10} {:<10} TITLE",
            "ID", "PROJECT", "START", "FINISH"
        );
        println!("{}", "-".repeat(70));

        for task in sorted {
            println!(
                "{:<10} {:<12} {:<10} {:<10} {}",
                task.id,
                task.project,
                format_date(task.start),
                format_date(task.finish),
                task.title
            );
        }
    }

    Ok(())
}

fn show_task(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: TaskId = id_str.parse()?;

    let tasks = project.task_store().read_all()?;
    let task = tasks
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;

    let manager = open_manager(&project)?;
    let edges = manager.list_by_task(&id).map_err(|e| e.into_anyhow())?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task,
            "predecessors": edges.predecessors,
            "successors": edges.successors,
        }));
        return Ok(());
    }

    println!("ID:       {}", task.id);
    println!("Title:    {}", task.title);
    println!("Project:  {}", task.project);
    println!("Start:    {}", format_date(task.start));
    println!("Finish:   {}", format_date(task.finish));

    if !edges.predecessors.is_empty() {
        println!();
        println!("Depends on:");
        for edge in &edges.predecessors {
            println!("  {}", describe_edge(edge));
        }
    }

    if !edges.successors.is_empty() {
        println!();
        println!("Required by:");
        for edge in &edges.successors {
            println!("  {}", describe_edge(edge));
        }
    }

    Ok(())
}

fn set_dates(
    output: &Output,
    id_str: &str,
    start: Option<NaiveDate>,
    finish: Option<NaiveDate>,
    clear: bool,
) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let id: TaskId = id_str.parse()?;

    let tasks = store.read_all()?;
    let mut task = tasks
        .get(&id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;

    if clear {
        task.set_dates(None, None)?;
    } else {
        task.set_dates(start.or(task.start), finish.or(task.finish))?;
    }
    store.update(&task)?;
    info!(task = %task.id, "task dates changed");

    if output.is_json() {
        output.data(&task);
    } else {
        output.success(&format!(
            "Dates of {}: {} .. {}",
            task.id,
            format_date(task.start),
            format_date(task.finish)
        ));
    }

    Ok(())
}

fn remove_task(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let id: TaskId = id_str.parse()?;

    if !store.read_all()?.contains_key(&id) {
        anyhow::bail!("Task not found: {}", id);
    }

    // Edges first, so a failure never leaves edges pointing at a missing task
    let manager = open_manager(&project)?;
    let removed_edges = manager
        .remove_task_edges(&id)
        .map_err(|e| e.into_anyhow())
        .context("Failed to remove dependencies of task")?;
    store.remove(&id)?;
    info!(task = %id, "task removed");

    // Catches edges added while the task was still listed
    let late_edges = manager
        .remove_task_edges(&id)
        .map_err(|e| e.into_anyhow())
        .context("Failed to remove dependencies of task")?;
    let removed_edges = removed_edges + late_edges;

    if output.is_json() {
        output.data(&serde_json::json!({
            "removed": id.to_string(),
            "removed_dependencies": removed_edges,
        }));
    } else {
        output.success(&format!(
            "Removed task {} ({} dependencies)",
            id, removed_edges
        ));
    }

    Ok(())
}

pub(super) fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}
