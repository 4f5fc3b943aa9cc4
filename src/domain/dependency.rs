//! Dependency edges between tasks
//!
//! An edge says the successor's start or finish is constrained by the
//! predecessor's start or finish, shifted by a signed number of days.
//! Only the type and the lag of an edge may change after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::id::{EdgeId, TaskId};
use super::schedule::Bound;

/// Scheduling relationship between predecessor and successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Successor starts after the predecessor finishes
    #[default]
    #[serde(alias = "fs")]
    FinishToStart,
    /// Successor starts after the predecessor starts
    #[serde(alias = "ss")]
    StartToStart,
    /// Successor finishes after the predecessor finishes
    #[serde(alias = "ff")]
    FinishToFinish,
    /// Successor finishes after the predecessor starts
    #[serde(alias = "sf")]
    StartToFinish,
}

impl DependencyType {
    pub const ALL: [DependencyType; 4] = [
        DependencyType::FinishToStart,
        DependencyType::StartToStart,
        DependencyType::FinishToFinish,
        DependencyType::StartToFinish,
    ];

    /// Short label used in tables (`FS`, `SS`, `FF`, `SF`)
    pub fn label(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "FS",
            DependencyType::StartToStart => "SS",
            DependencyType::FinishToFinish => "FF",
            DependencyType::StartToFinish => "SF",
        }
    }

    /// Canonical snake_case name, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "finish_to_start",
            DependencyType::StartToStart => "start_to_start",
            DependencyType::FinishToFinish => "finish_to_finish",
            DependencyType::StartToFinish => "start_to_finish",
        }
    }

    /// The predecessor event the lag is measured from
    pub fn reference_event(&self) -> Bound {
        match self {
            DependencyType::FinishToStart | DependencyType::FinishToFinish => Bound::Finish,
            DependencyType::StartToStart | DependencyType::StartToFinish => Bound::Start,
        }
    }

    /// The successor date the edge constrains
    pub fn constrained_bound(&self) -> Bound {
        match self {
            DependencyType::FinishToStart | DependencyType::StartToStart => Bound::Start,
            DependencyType::FinishToFinish | DependencyType::StartToFinish => Bound::Finish,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DependencyType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(&normalized) || t.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown dependency type '{}' (expected fs, ss, ff or sf)",
                    s.trim()
                )
            })
    }
}

/// A stored dependency between two tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: EdgeId,
    pub predecessor: TaskId,
    pub successor: TaskId,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    /// Positive values delay the successor, negative values allow overlap
    #[serde(default)]
    pub lag_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DependencyEdge {
    /// Materializes a request into a stored edge with the given ID
    pub fn from_request(id: EdgeId, request: NewDependency, now: DateTime<Utc>) -> Self {
        Self {
            id,
            predecessor: request.predecessor,
            successor: request.successor,
            dep_type: request.dep_type,
            lag_days: request.lag_days,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the edge has `task` at either end
    pub fn touches(&self, task: &TaskId) -> bool {
        &self.predecessor == task || &self.successor == task
    }

    /// Returns true if the edge links exactly this ordered pair
    pub fn links(&self, predecessor: &TaskId, successor: &TaskId) -> bool {
        &self.predecessor == predecessor && &self.successor == successor
    }

    /// Changes the dependency type
    pub fn retype(&mut self, dep_type: DependencyType) {
        if self.dep_type != dep_type {
            self.dep_type = dep_type;
            self.updated_at = Utc::now();
        }
    }

    /// Changes the lag
    pub fn set_lag(&mut self, lag_days: i32) {
        if self.lag_days != lag_days {
            self.lag_days = lag_days;
            self.updated_at = Utc::now();
        }
    }

    /// Applies a change set, returning true if anything changed
    pub fn apply(&mut self, change: &EdgeChange) -> bool {
        let before = (self.dep_type, self.lag_days);
        if let Some(dep_type) = change.dep_type {
            self.retype(dep_type);
        }
        if let Some(lag) = change.lag_days {
            self.set_lag(lag);
        }
        before != (self.dep_type, self.lag_days)
    }
}

/// Request to create a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDependency {
    pub predecessor: TaskId,
    pub successor: TaskId,
    pub dep_type: DependencyType,
    pub lag_days: i32,
}

impl NewDependency {
    pub fn new(
        predecessor: TaskId,
        successor: TaskId,
        dep_type: DependencyType,
        lag_days: i32,
    ) -> Self {
        Self {
            predecessor,
            successor,
            dep_type,
            lag_days,
        }
    }

    /// Finish-to-start with no lag
    pub fn finish_to_start(predecessor: TaskId, successor: TaskId) -> Self {
        Self::new(predecessor, successor, DependencyType::FinishToStart, 0)
    }
}

/// Mutable fields of an existing edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeChange {
    pub dep_type: Option<DependencyType>,
    pub lag_days: Option<i32>,
}

impl EdgeChange {
    pub fn is_empty(&self) -> bool {
        self.dep_type.is_none() && self.lag_days.is_none()
    }
}

/// Edges touching a single task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskEdges {
    /// Edges where the task is the successor
    pub predecessors: Vec<DependencyEdge>,
    /// Edges where the task is the predecessor
    pub successors: Vec<DependencyEdge>,
}

impl TaskEdges {
    pub fn is_empty(&self) -> bool {
        self.predecessors.is_empty() && self.successors.is_empty()
    }
}

/// Expected, user-facing reasons a dependency operation is refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("{successor} already depends on {predecessor} (edge {existing})")]
    DuplicateEdge {
        predecessor: TaskId,
        successor: TaskId,
        existing: EdgeId,
    },

    #[error("{}", describe_cycle(.predecessor, .successor, .path))]
    CyclicDependency {
        predecessor: TaskId,
        successor: TaskId,
        /// Existing path from successor back to predecessor
        path: Vec<TaskId>,
    },

    #[error("Dependency not found: {0}")]
    NotFound(EdgeId),

    #[error("{predecessor} and {successor} belong to different projects")]
    CrossProject {
        predecessor: TaskId,
        successor: TaskId,
    },
}

impl DependencyError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            DependencyError::UnknownTask(_) => "unknown_task",
            DependencyError::DuplicateEdge { .. } => "duplicate_edge",
            DependencyError::CyclicDependency { .. } => "cyclic_dependency",
            DependencyError::NotFound(_) => "not_found",
            DependencyError::CrossProject { .. } => "cross_project",
        }
    }
}

fn describe_cycle(predecessor: &TaskId, successor: &TaskId, path: &[TaskId]) -> String {
    if predecessor == successor {
        return format!("A task cannot depend on itself: {}", predecessor);
    }

    let chain = path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    format!(
        "Adding {} -> {} would create a cycle: {} already leads back through {}",
        predecessor, successor, successor, chain
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    #[test]
    fn type_parses_short_and_long_forms() {
        assert_eq!("fs".parse(), Ok(DependencyType::FinishToStart));
        assert_eq!("SS".parse(), Ok(DependencyType::StartToStart));
        assert_eq!("finish-to-finish".parse(), Ok(DependencyType::FinishToFinish));
        assert_eq!("start_to_finish".parse(), Ok(DependencyType::StartToFinish));
        assert!("xx".parse::<DependencyType>().is_err());
    }

    #[test]
    fn type_serde_accepts_aliases() {
        let t: DependencyType = serde_json::from_str("\"sf\"").unwrap();
        assert_eq!(t, DependencyType::StartToFinish);

        let json = serde_json::to_string(&DependencyType::FinishToFinish).unwrap();
        assert_eq!(json, "\"finish_to_finish\"");
    }

    #[test]
    fn reference_and_constrained_bounds_follow_name() {
        use Bound::{Finish, Start};

        let cases = [
            (DependencyType::FinishToStart, Finish, Start),
            (DependencyType::StartToStart, Start, Start),
            (DependencyType::FinishToFinish, Finish, Finish),
            (DependencyType::StartToFinish, Start, Finish),
        ];
        for (t, reference, constrained) in cases {
            assert_eq!(t.reference_event(), reference, "{t}");
            assert_eq!(t.constrained_bound(), constrained, "{t}");
        }
    }

    #[test]
    fn apply_change_updates_only_given_fields() {
        let request = NewDependency::finish_to_start(id("t-000000a"), id("t-000000b"));
        let mut edge =
            DependencyEdge::from_request("d-0000001".parse().unwrap(), request, Utc::now());

        assert!(!edge.apply(&EdgeChange::default()));

        let changed = edge.apply(&EdgeChange {
            dep_type: None,
            lag_days: Some(-2),
        });
        assert!(changed);
        assert_eq!(edge.dep_type, DependencyType::FinishToStart);
        assert_eq!(edge.lag_days, -2);
    }

    #[test]
    fn edge_serializes_type_field() {
        let request = NewDependency::new(
            id("t-000000a"),
            id("t-000000b"),
            DependencyType::StartToStart,
            3,
        );
        let edge = DependencyEdge::from_request("d-0000001".parse().unwrap(), request, Utc::now());
        let json = serde_json::to_value(&edge).unwrap();

        assert_eq!(json["type"], "start_to_start");
        assert_eq!(json["lag_days"], 3);
        assert_eq!(json["predecessor"], "t-000000a");
    }

    #[test]
    fn cycle_message_shows_path() {
        let err = DependencyError::CyclicDependency {
            predecessor: id("t-000000c"),
            successor: id("t-000000a"),
            path: vec![id("t-000000a"), id("t-000000b"), id("t-000000c")],
        };

        let message = err.to_string();
        assert!(message.contains("t-000000a -> t-000000b -> t-000000c"));
        assert_eq!(err.code(), "cyclic_dependency");
    }

    #[test]
    fn self_loop_message() {
        let a = id("t-000000a");
        let err = DependencyError::CyclicDependency {
            predecessor: a.clone(),
            successor: a.clone(),
            path: vec![a],
        };

        assert!(err.to_string().contains("cannot depend on itself"));
    }
}
