//! Dependency CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::domain::{DependencyEdge, DependencyType, EdgeChange, EdgeId, NewDependency, TaskId};
use crate::manager::{DependencyManager, DependencyPolicy};
use crate::storage::{EdgeStore, Project};

#[derive(Subcommand)]
pub enum DepCommands {
    /// Add a dependency: SUCCESSOR depends on PREDECESSOR
    ///
    /// Examples:
    ///   taskdeps dep add t-1a2b3c4 t-5d6e7f8              # finish-to-start
    ///   taskdeps dep add t-1a2b3c4 t-5d6e7f8 --type ss --lag 2
    ///   taskdeps dep add t-1a2b3c4 t-5d6e7f8 --lag -3      # allow overlap
    Add {
        /// Task that constrains the other
        predecessor: String,

        /// Task that is constrained
        successor: String,

        /// Dependency type: fs, ss, ff or sf (defaults to `default_type` in the config)
        #[arg(long = "type", short = 't')]
        dep_type: Option<DependencyType>,

        /// Lag in days; negative values allow overlap
        #[arg(long, short, allow_negative_numbers = true)]
        lag: Option<i32>,
    },

    /// Remove a dependency
    Rm {
        /// Dependency ID
        id: String,
    },

    /// Change the type or lag of a dependency
    Set {
        /// Dependency ID
        id: String,

        /// New dependency type: fs, ss, ff or sf
        #[arg(long = "type", short = 't')]
        dep_type: Option<DependencyType>,

        /// New lag in days
        #[arg(long, short, allow_negative_numbers = true)]
        lag: Option<i32>,
    },

    /// List dependencies of a task, or of a whole project
    List {
        /// Task ID (omit to list a project's dependencies)
        task: Option<String>,

        /// Project key (defaults to `default_project` in the config)
        #[arg(long, short, conflicts_with = "task")]
        project: Option<String>,
    },

    /// Look up the dependency linking two tasks, if any
    Find {
        /// Predecessor task ID
        predecessor: String,

        /// Successor task ID
        successor: String,
    },
}

pub fn run(cmd: DepCommands, output: &Output) -> Result<()> {
    match cmd {
        DepCommands::Add {
            predecessor,
            successor,
            dep_type,
            lag,
        } => add_dependency(output, &predecessor, &successor, dep_type, lag),
        DepCommands::Rm { id } => remove_dependency(output, &id),
        DepCommands::Set { id, dep_type, lag } => update_dependency(output, &id, dep_type, lag),
        DepCommands::List { task, project } => {
            list_dependencies(output, task.as_deref(), project.as_deref())
        }
        DepCommands::Find {
            predecessor,
            successor,
        } => find_dependency(output, &predecessor, &successor),
    }
}

/// Opens the project's edge store wrapped in a manager configured from
/// the project config
pub(super) fn open_manager(project: &Project) -> Result<DependencyManager<Box<dyn EdgeStore>>> {
    let policy = DependencyPolicy::from(&project.config().project.dependencies);
    Ok(DependencyManager::with_policy(project.edge_store()?, policy))
}

/// One-line rendering: `d-xxxxxxx  t-aaaaaaa -> t-bbbbbbb  FS +2d`
pub(super) fn describe_edge(edge: &DependencyEdge) -> String {
    format!(
        "{}  {} -> {}  {} {:+}d",
        edge.id, edge.predecessor, edge.successor, edge.dep_type, edge.lag_days
    )
}

fn add_dependency(
    output: &Output,
    pred_str: &str,
    succ_str: &str,
    dep_type: Option<DependencyType>,
    lag: Option<i32>,
) -> Result<()> {
    let project = Project::open_current()?;
    let predecessor: TaskId = pred_str.parse()?;
    let successor: TaskId = succ_str.parse()?;

    let dep_type = dep_type.unwrap_or(project.config().project.dependencies.default_type);
    let request = NewDependency::new(predecessor, successor, dep_type, lag.unwrap_or(0));

    let tasks = project.task_store().read_all()?;
    let manager = open_manager(&project)?;
    let edge = manager.add(&tasks, request).map_err(|e| e.into_anyhow())?;

    // A concurrent `task rm` may have deleted an endpoint since the read above
    let tasks = project.task_store().read_all()?;
    manager
        .recheck_endpoints(&tasks, &edge)
        .map_err(|e| e.into_anyhow())?;

    if output.is_json() {
        output.data(&edge);
    } else {
        output.success(&format!("Added dependency: {}", describe_edge(&edge)));
    }

    Ok(())
}

fn remove_dependency(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: EdgeId = id_str.parse()?;

    let manager = open_manager(&project)?;
    let removed = manager.remove(&id).map_err(|e| e.into_anyhow())?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id.to_string(),
            "removed": removed.is_some(),
        }));
    } else if removed.is_some() {
        output.success(&format!("Removed dependency {}", id));
    } else {
        output.success(&format!("Dependency {} was already removed", id));
    }

    Ok(())
}

fn update_dependency(
    output: &Output,
    id_str: &str,
    dep_type: Option<DependencyType>,
    lag: Option<i32>,
) -> Result<()> {
    let change = EdgeChange {
        dep_type,
        lag_days: lag,
    };
    if change.is_empty() {
        anyhow::bail!("Nothing to change: pass --type and/or --lag");
    }

    let project = Project::open_current()?;
    let id: EdgeId = id_str.parse()?;

    let manager = open_manager(&project)?;
    let edge = manager.update(&id, change).map_err(|e| e.into_anyhow())?;

    if output.is_json() {
        output.data(&edge);
    } else {
        output.success(&format!("Updated dependency: {}", describe_edge(&edge)));
    }

    Ok(())
}

fn list_dependencies(output: &Output, task: Option<&str>, project_key: Option<&str>) -> Result<()> {
    let project = Project::open_current()?;
    let manager = open_manager(&project)?;

    if let Some(task_str) = task {
        let id: TaskId = task_str.parse()?;
        let edges = manager.list_by_task(&id).map_err(|e| e.into_anyhow())?;

        if output.is_json() {
            output.data(&edges);
        } else if edges.is_empty() {
            println!("No dependencies for {}", id);
        } else {
            println!("Predecessors of {}:", id);
            print_edges(&edges.predecessors);
            println!();
            println!("Successors of {}:", id);
            print_edges(&edges.successors);
        }
        return Ok(());
    }

    let key = project_key
        .map(str::to_string)
        .unwrap_or_else(|| project.config().project.default_project.clone());
    let tasks = project.task_store().read_all()?;
    let edges = manager
        .list_by_project(tasks.values(), &key)
        .map_err(|e| e.into_anyhow())?;

    if output.is_json() {
        output.data(&edges);
    } else if edges.is_empty() {
        println!("No dependencies in project {}", key);
    } else {
        print_edges(&edges);
    }

    Ok(())
}

fn find_dependency(output: &Output, pred_str: &str, succ_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let predecessor: TaskId = pred_str.parse()?;
    let successor: TaskId = succ_str.parse()?;

    let edge = project
        .edge_store()?
        .find_between(&predecessor, &successor)
        .map_err(|e| e.into_anyhow())?;

    if output.is_json() {
        output.data(&edge);
    } else {
        match edge {
            Some(edge) => println!("{}", describe_edge(&edge)),
            None => println!("No dependency from {} to {}", predecessor, successor),
        }
    }

    Ok(())
}

fn print_edges(edges: &[DependencyEdge]) {
    if edges.is_empty() {
        println!("  (none)");
    }
    for edge in edges {
        println!("  {}", describe_edge(edge));
    }
}
