//! Task domain model
//!
//! Tasks are the nodes dependencies point at. The dependency core only
//! needs to know whether a task exists, which project it belongs to and,
//! for schedule checks, its planned start/finish days.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::id::TaskId;
use super::schedule::DayWindow;

/// Project key used when none is given
pub const DEFAULT_PROJECT: &str = "default";

#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error("Task {task} finishes ({finish}) before it starts ({start})")]
    InvalidWindow {
        task: TaskId,
        start: NaiveDate,
        finish: NaiveDate,
    },

    #[error("Task title cannot be empty")]
    EmptyTitle,
}

/// A unit of work that can take part in dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Task title
    pub title: String,

    /// Project this task is scoped to
    #[serde(default = "default_project")]
    pub project: String,

    /// Planned first working day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,

    /// Planned last working day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<NaiveDate>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

impl Task {
    /// Creates a new undated task in the given project
    pub fn new(
        id: TaskId,
        title: impl Into<String>,
        project: impl Into<String>,
    ) -> Result<Self, TaskError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(TaskError::EmptyTitle);
        }

        let now = Utc::now();
        Ok(Self {
            id,
            title,
            project: project.into(),
            start: None,
            finish: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets the planned dates, rejecting a finish before the start
    pub fn set_dates(
        &mut self,
        start: Option<NaiveDate>,
        finish: Option<NaiveDate>,
    ) -> Result<(), TaskError> {
        if let (Some(start), Some(finish)) = (start, finish) {
            if finish < start {
                return Err(TaskError::InvalidWindow {
                    task: self.id.clone(),
                    start,
                    finish,
                });
            }
        }

        self.start = start;
        self.finish = finish;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns the planned window when both dates are known
    pub fn window(&self) -> Option<DayWindow> {
        match (self.start, self.finish) {
            (Some(start), Some(finish)) => DayWindow::new(start, finish),
            _ => None,
        }
    }

    /// Returns true if the task belongs to `project`
    pub fn in_project(&self, project: &str) -> bool {
        self.project == project
    }
}

/// Read access to the set of known tasks
///
/// This is the task existence collaborator consulted before an edge is
/// stored; the edge store itself never validates endpoints.
pub trait TaskLookup {
    /// Returns the task with the given ID, if known
    fn task(&self, id: &TaskId) -> Option<&Task>;

    /// Returns true if the task exists
    fn contains(&self, id: &TaskId) -> bool {
        self.task(id).is_some()
    }

    /// Returns the project a task belongs to
    fn project_of(&self, id: &TaskId) -> Option<&str> {
        self.task(id).map(|t| t.project.as_str())
    }
}

impl TaskLookup for HashMap<TaskId, Task> {
    fn task(&self, id: &TaskId) -> Option<&Task> {
        self.get(id)
    }
}
