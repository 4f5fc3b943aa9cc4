//! taskdeps - typed dependencies between tasks
//!
//! Holds finish-to-start, start-to-start, finish-to-finish and
//! start-to-finish edges with a signed day lag, refuses edges that would
//! close a cycle, and derives the date constraint each edge places on its
//! successor.

pub mod cli;
pub mod domain;
pub mod logging;
pub mod manager;
pub mod storage;

pub use domain::{
    DependencyEdge, DependencyError, DependencyType, EdgeId, NewDependency, Task, TaskId,
};
pub use manager::{DependencyManager, DependencyPolicy};
