//! Schedule constraints implied by dependency edges
//!
//! Each edge yields exactly one inequality on its successor:
//!
//! | Type | Constraint |
//! |------|------------|
//! | FS | `succ.start  >= pred.finish + lag` |
//! | SS | `succ.start  >= pred.start  + lag` |
//! | FF | `succ.finish >= pred.finish + lag` |
//! | SF | `succ.finish >= pred.start  + lag` |
//!
//! Dates are whole days. Solving all constraints of a project together
//! (critical path, shifting dates) belongs to a layout engine; this module
//! only derives and evaluates the per-edge inequalities.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::dependency::{DependencyEdge, DependencyType};
use super::id::{EdgeId, TaskId};
use super::task::{Task, TaskLookup};

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("Date out of range: {date} shifted by {lag_days} days")]
    DateOutOfRange { date: NaiveDate, lag_days: i32 },
}

/// Start or finish of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Start,
    Finish,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Start => f.write_str("start"),
            Bound::Finish => f.write_str("finish"),
        }
    }
}

/// Inclusive span of planned days, `start <= finish`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    start: NaiveDate,
    finish: NaiveDate,
}

impl DayWindow {
    /// Returns `None` when `finish` precedes `start`
    pub fn new(start: NaiveDate, finish: NaiveDate) -> Option<Self> {
        (start <= finish).then_some(Self { start, finish })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn finish(&self) -> NaiveDate {
        self.finish
    }

    pub fn get(&self, bound: Bound) -> NaiveDate {
        match bound {
            Bound::Start => self.start,
            Bound::Finish => self.finish,
        }
    }
}

/// The inequality one edge imposes on its successor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constraint {
    pub edge: EdgeId,
    pub predecessor: TaskId,
    pub successor: TaskId,
    pub dep_type: DependencyType,
    pub lag_days: i32,
    /// Which successor date is bounded
    pub bound: Bound,
    /// Earliest permitted value for that date
    pub earliest: NaiveDate,
}

impl Constraint {
    /// Evaluates the constraint against the successor's planned window
    pub fn evaluate(&self, successor: &DayWindow) -> ConstraintCheck {
        let actual = successor.get(self.bound);
        let diff = (actual - self.earliest).num_days();
        if diff >= 0 {
            ConstraintCheck::Satisfied { slack_days: diff }
        } else {
            ConstraintCheck::Violated { by_days: -diff }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} >= {}",
            self.successor, self.bound, self.earliest
        )
    }
}

/// Outcome of checking a constraint against planned dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConstraintCheck {
    Satisfied { slack_days: i64 },
    Violated { by_days: i64 },
}

impl ConstraintCheck {
    pub fn is_violated(&self) -> bool {
        matches!(self, ConstraintCheck::Violated { .. })
    }
}

/// Shifts a date by a signed number of days
pub fn shift(date: NaiveDate, lag_days: i32) -> Result<NaiveDate, ScheduleError> {
    date.checked_add_signed(Duration::days(i64::from(lag_days)))
        .ok_or(ScheduleError::DateOutOfRange { date, lag_days })
}

/// Derives the constraint `edge` imposes given its predecessor's window
pub fn propagate(
    edge: &DependencyEdge,
    predecessor: &DayWindow,
) -> Result<Constraint, ScheduleError> {
    let reference = predecessor.get(edge.dep_type.reference_event());
    let earliest = shift(reference, edge.lag_days)?;

    Ok(Constraint {
        edge: edge.id.clone(),
        predecessor: edge.predecessor.clone(),
        successor: edge.successor.clone(),
        dep_type: edge.dep_type,
        lag_days: edge.lag_days,
        bound: edge.dep_type.constrained_bound(),
        earliest,
    })
}

/// A constraint paired with its evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedConstraint {
    pub constraint: Constraint,
    pub check: ConstraintCheck,
}

/// Result of checking every edge of a project against planned dates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub checked: Vec<CheckedConstraint>,
    /// Edges skipped because an endpoint has no complete window
    pub undated: Vec<EdgeId>,
    /// Edges whose lag shifts the reference date off the calendar
    pub out_of_range: Vec<EdgeId>,
}

impl ScheduleReport {
    pub fn violations(&self) -> impl Iterator<Item = &CheckedConstraint> {
        self.checked.iter().filter(|c| c.check.is_violated())
    }

    pub fn is_consistent(&self) -> bool {
        self.violations().next().is_none()
    }
}

/// Checks each edge against the planned windows of its endpoints
///
/// An edge that cannot be evaluated is listed in the report and the
/// remaining edges are still checked.
pub fn check_edges<'a>(
    tasks: &impl TaskLookup,
    edges: impl IntoIterator<Item = &'a DependencyEdge>,
) -> ScheduleReport {
    let mut report = ScheduleReport::default();

    for edge in edges {
        let windows = (
            tasks.task(&edge.predecessor).and_then(Task::window),
            tasks.task(&edge.successor).and_then(Task::window),
        );
        match windows {
            (Some(pred), Some(succ)) => match propagate(edge, &pred) {
                Ok(constraint) => {
                    let check = constraint.evaluate(&succ);
                    report.checked.push(CheckedConstraint { constraint, check });
                }
                Err(ScheduleError::DateOutOfRange { .. }) => {
                    report.out_of_range.push(edge.id.clone())
                }
            },
            _ => report.undated.push(edge.id.clone()),
        }
    }

    report
}

/// Constraints on one task from its incoming edges, keyed by edge
///
/// Edges with an undated predecessor are absent. Each edge is derived on
/// its own, so one unrepresentable date does not hide the others.
pub fn incoming_constraints<'a>(
    tasks: &impl TaskLookup,
    incoming: impl IntoIterator<Item = &'a DependencyEdge>,
) -> HashMap<EdgeId, Result<Constraint, ScheduleError>> {
    incoming
        .into_iter()
        .filter_map(|edge| {
            let window = tasks.task(&edge.predecessor).and_then(Task::window)?;
            Some((edge.id.clone(), propagate(edge, &window)))
        })
        .collect()
}
