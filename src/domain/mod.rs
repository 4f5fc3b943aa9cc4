//! Domain models for the dependency core
//!
//! Contains the graph rules and schedule arithmetic without any I/O concerns.

mod dependency;
mod graph;
mod id;
mod schedule;
mod task;

pub use dependency::{
    DependencyEdge, DependencyError, DependencyType, EdgeChange, NewDependency, TaskEdges,
};
pub use graph::{cycle_path, would_create_cycle, DependencyGraph, GraphError};
pub use id::{EdgeId, IdError, TaskId};
pub use schedule::{
    check_edges, incoming_constraints, propagate, shift, Bound, CheckedConstraint, Constraint,
    ConstraintCheck, DayWindow, ScheduleError, ScheduleReport,
};
pub use task::{Task, TaskError, TaskLookup, DEFAULT_PROJECT};
