//! Schedule CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::dep::open_manager;
use super::output::Output;
use crate::domain::{ConstraintCheck, TaskId};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Show the constraints a task's predecessors place on its dates
    Constraints {
        /// Task ID
        task: String,
    },

    /// Check every dependency of a project against the planned dates
    ///
    /// Exits with an error when any constraint is violated.
    Check {
        /// Project key (defaults to `default_project` in the config)
        #[arg(long, short)]
        project: Option<String>,
    },

    /// Print a project's tasks so that predecessors come first
    Order {
        /// Project key (defaults to `default_project` in the config)
        #[arg(long, short)]
        project: Option<String>,
    },
}

pub fn run(cmd: ScheduleCommands, output: &Output) -> Result<()> {
    match cmd {
        ScheduleCommands::Constraints { task } => show_constraints(output, &task),
        ScheduleCommands::Check { project } => check(output, project),
        ScheduleCommands::Order { project } => order(output, project),
    }
}

fn show_constraints(output: &Output, task_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: TaskId = task_str.parse()?;

    let tasks = project.task_store().read_all()?;
    let constraints = open_manager(&project)?.constraints_for(&tasks, &id)?;

    if output.is_json() {
        output.data(&constraints);
    } else if constraints.is_empty() {
        println!("No dated predecessors constrain {}", id);
    } else {
        for c in &constraints {
            println!(
                "{}  ({} {} {:+}d via {})",
                c, c.predecessor, c.dep_type, c.lag_days, c.edge
            );
        }
    }

    Ok(())
}

fn check(output: &Output, project_key: Option<String>) -> Result<()> {
    let project = Project::open_current()?;
    let key = project_key.unwrap_or_else(|| project.config().project.default_project.clone());

    let tasks = project.task_store().read_all()?;
    let report = open_manager(&project)?.check_project(&tasks, &key)?;
    let violations = report.violations().count();

    if output.is_json() {
        output.data(&serde_json::json!({
            "project": key,
            "consistent": report.is_consistent(),
            "checked": report.checked,
            "undated": report.undated,
            "out_of_range": report.out_of_range,
        }));
    } else {
        for checked in &report.checked {
            let status = match checked.check {
                ConstraintCheck::Satisfied { slack_days } => format!("ok (slack {}d)", slack_days),
                ConstraintCheck::Violated { by_days } => format!("VIOLATED by {}d", by_days),
            };
            println!("{:<40} {}", checked.constraint.to_string(), status);
        }
        if !report.undated.is_empty() {
            println!("{} dependencies skipped (undated tasks)", report.undated.len());
        }
        for id in &report.out_of_range {
            println!("{:<40} skipped (lag leaves the calendar)", id.to_string());
        }
        if report.checked.is_empty() && report.undated.is_empty() && report.out_of_range.is_empty()
        {
            println!("No dependencies in project {}", key);
        }
    }

    if violations > 0 {
        anyhow::bail!("{} schedule constraint(s) violated in project {}", violations, key);
    }
    Ok(())
}

fn order(output: &Output, project_key: Option<String>) -> Result<()> {
    let project = Project::open_current()?;
    let key = project_key.unwrap_or_else(|| project.config().project.default_project.clone());

    let tasks = project.task_store().read_all()?;
    let order = open_manager(&project)?.topological_order(&tasks, &key)?;

    if output.is_json() {
        output.data(&order);
    } else if order.is_empty() {
        println!("No tasks in project {}", key);
    } else {
        for (pos, id) in order.iter().enumerate() {
            let title = tasks.get(id).map(|t| t.title.as_str()).unwrap_or("(unknown task)");
            println!("{:>3}. {} {}", pos + 1, id, title);
        }
    }

    Ok(())
}
