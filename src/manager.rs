//! Dependency operations
//!
//! [`DependencyManager`] is what callers talk to. It checks that both
//! endpoints exist and applies the project's policy, then hands the
//! request to the store's atomic guarded insert. Schedule queries read the
//! stored edges and run them through the propagator.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::domain::{
    check_edges, incoming_constraints, Constraint, DependencyEdge, DependencyError,
    DependencyGraph, EdgeChange, EdgeId, NewDependency, ScheduleReport, Task, TaskEdges, TaskId,
    TaskLookup,
};
use crate::storage::{CrossProjectPolicy, DependencyConfig, EdgeStore, StoreError, StoreResult};

/// Rules applied on top of the store's own checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyPolicy {
    /// Deleting a missing edge succeeds instead of failing with not-found
    pub idempotent_delete: bool,

    /// Whether an edge may link tasks of different projects
    pub cross_project: CrossProjectPolicy,
}

impl From<&DependencyConfig> for DependencyPolicy {
    fn from(config: &DependencyConfig) -> Self {
        Self {
            idempotent_delete: config.idempotent_delete,
            cross_project: config.cross_project,
        }
    }
}

/// Entry point for creating, changing and querying dependencies
pub struct DependencyManager<S: EdgeStore> {
    store: S,
    policy: DependencyPolicy,
}

impl<S: EdgeStore> DependencyManager<S> {
    /// Creates a manager with the default policy
    pub fn new(store: S) -> Self {
        Self::with_policy(store, DependencyPolicy::default())
    }

    pub fn with_policy(store: S, policy: DependencyPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> DependencyPolicy {
        self.policy
    }

    /// Adds a dependency after checking both tasks exist
    ///
    /// The duplicate and cycle checks run inside the store, under the same
    /// lock as the write.
    pub fn add(
        &self,
        tasks: &impl TaskLookup,
        request: NewDependency,
    ) -> StoreResult<DependencyEdge> {
        if let Err(e) = self.precheck(tasks, &request) {
            debug!(code = e.code(), "dependency refused: {}", e);
            return Err(e.into());
        }

        match self.store.insert(request) {
            Ok(edge) => {
                info!(
                    edge = %edge.id,
                    predecessor = %edge.predecessor,
                    successor = %edge.successor,
                    dep_type = %edge.dep_type,
                    lag_days = edge.lag_days,
                    backend = self.store.backend(),
                    "dependency added"
                );
                Ok(edge)
            }
            Err(e) => {
                log_refusal(&e);
                Err(e)
            }
        }
    }

    /// Withdraws a freshly added edge whose endpoint has since been deleted
    ///
    /// `tasks` must be read after the insert. Paired with the second sweep
    /// in task removal, no edge outlives its task.
    pub fn recheck_endpoints(
        &self,
        tasks: &impl TaskLookup,
        edge: &DependencyEdge,
    ) -> StoreResult<()> {
        let missing = [&edge.predecessor, &edge.successor]
            .into_iter()
            .find(|id| !tasks.contains(id));

        match missing {
            None => Ok(()),
            Some(id) => {
                warn!(
                    edge = %edge.id,
                    task = %id,
                    "task removed during insert, dependency withdrawn"
                );
                match self.store.delete(&edge.id) {
                    Ok(_) | Err(StoreError::Dependency(DependencyError::NotFound(_))) => {}
                    Err(e) => return Err(e),
                }
                Err(DependencyError::UnknownTask(id.clone()).into())
            }
        }
    }

    fn precheck(
        &self,
        tasks: &impl TaskLookup,
        request: &NewDependency,
    ) -> Result<(), DependencyError> {
        for id in [&request.predecessor, &request.successor] {
            if !tasks.contains(id) {
                return Err(DependencyError::UnknownTask(id.clone()));
            }
        }

        if self.policy.cross_project == CrossProjectPolicy::Deny
            && tasks.project_of(&request.predecessor) != tasks.project_of(&request.successor)
        {
            return Err(DependencyError::CrossProject {
                predecessor: request.predecessor.clone(),
                successor: request.successor.clone(),
            });
        }

        Ok(())
    }

    /// Removes a dependency
    ///
    /// Returns `None` only when the edge was already gone and the policy
    /// makes deletion idempotent.
    pub fn remove(&self, id: &EdgeId) -> StoreResult<Option<DependencyEdge>> {
        match self.store.delete(id) {
            Ok(edge) => {
                info!(edge = %edge.id, "dependency removed");
                Ok(Some(edge))
            }
            Err(StoreError::Dependency(DependencyError::NotFound(_)))
                if self.policy.idempotent_delete =>
            {
                debug!(edge = %id, "dependency already absent");
                Ok(None)
            }
            Err(e) => {
                log_refusal(&e);
                Err(e)
            }
        }
    }

    /// Changes the type and/or lag of a dependency
    pub fn update(&self, id: &EdgeId, change: EdgeChange) -> StoreResult<DependencyEdge> {
        match self.store.update(id, change) {
            Ok(edge) => {
                info!(
                    edge = %edge.id,
                    dep_type = %edge.dep_type,
                    lag_days = edge.lag_days,
                    "dependency updated"
                );
                Ok(edge)
            }
            Err(e) => {
                log_refusal(&e);
                Err(e)
            }
        }
    }

    /// Returns a dependency by ID
    pub fn get(&self, id: &EdgeId) -> StoreResult<DependencyEdge> {
        self.store
            .get(id)?
            .ok_or_else(|| DependencyError::NotFound(id.clone()).into())
    }

    /// Returns the edges into and out of a task
    pub fn list_by_task(&self, task: &TaskId) -> StoreResult<TaskEdges> {
        debug!(task = %task, "listing dependencies of task");
        self.store.list_by_task(task)
    }

    /// Returns every edge touching a task of `project`
    pub fn list_by_project<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task>,
        project: &str,
    ) -> StoreResult<Vec<DependencyEdge>> {
        let members: HashSet<TaskId> = tasks
            .into_iter()
            .filter(|t| t.in_project(project))
            .map(|t| t.id.clone())
            .collect();

        debug!(project, tasks = members.len(), "listing dependencies of project");
        self.store.list_by_project(&members)
    }

    /// Removes every edge touching a task that is being deleted
    pub fn remove_task_edges(&self, task: &TaskId) -> StoreResult<usize> {
        let removed = self.store.delete_touching(task)?;
        if removed > 0 {
            info!(task = %task, removed, "dependencies of removed task deleted");
        }
        Ok(removed)
    }

    /// Constraints a task's incoming edges impose on it, ordered by edge
    ///
    /// Edges whose predecessor is not fully dated yield no constraint, nor
    /// do edges whose lag pushes the date off the calendar.
    pub fn constraints_for(
        &self,
        tasks: &impl TaskLookup,
        task: &TaskId,
    ) -> Result<Vec<Constraint>> {
        if !tasks.contains(task) {
            return Err(DependencyError::UnknownTask(task.clone()).into());
        }

        let incoming = self
            .store
            .list_by_task(task)
            .map_err(StoreError::into_anyhow)?
            .predecessors;
        let mut constraints = incoming_constraints(tasks, &incoming);

        Ok(incoming
            .iter()
            .filter_map(|edge| match constraints.remove(&edge.id)? {
                Ok(constraint) => Some(constraint),
                Err(e) => {
                    warn!(edge = %edge.id, "constraint skipped: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Checks every edge of a project against its tasks' planned dates
    pub fn check_project(
        &self,
        tasks: &HashMap<TaskId, Task>,
        project: &str,
    ) -> Result<ScheduleReport> {
        let edges = self
            .list_by_project(tasks.values(), project)
            .map_err(StoreError::into_anyhow)?;
        let report = check_edges(tasks, &edges);

        for id in &report.out_of_range {
            warn!(edge = %id, "constraint date out of range, edge not checked");
        }
        debug!(
            project,
            checked = report.checked.len(),
            violations = report.violations().count(),
            undated = report.undated.len(),
            out_of_range = report.out_of_range.len(),
            "schedule checked"
        );
        Ok(report)
    }

    /// Orders a project's tasks so every predecessor comes before its
    /// successors
    pub fn topological_order(
        &self,
        tasks: &HashMap<TaskId, Task>,
        project: &str,
    ) -> Result<Vec<TaskId>> {
        let mut members: Vec<&TaskId> = tasks
            .values()
            .filter(|t| t.in_project(project))
            .map(|t| &t.id)
            .collect();
        members.sort();

        let edges = self
            .list_by_project(tasks.values(), project)
            .map_err(StoreError::into_anyhow)?;

        let mut graph = DependencyGraph::new();
        for id in members {
            graph.add_task(id.clone());
        }
        for edge in &edges {
            graph.add_edge(edge);
        }

        Ok(graph.topological_order()?)
    }
}

fn log_refusal(err: &StoreError) {
    if let Some(e) = err.dependency() {
        debug!(code = e.code(), "dependency refused: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bound, ConstraintCheck, DependencyType, DEFAULT_PROJECT};
    use crate::storage::MemoryEdgeStore;
    use chrono::{Duration, NaiveDate};

    fn tid(n: u32) -> TaskId {
        format!("t-{:07x}", n).parse().unwrap()
    }

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(n)
    }

    fn task(n: u32, project: &str) -> Task {
        Task::new(tid(n), format!("Task {}", n), project).unwrap()
    }

    fn dated(n: u32, start: i64, finish: i64) -> Task {
        let mut t = task(n, DEFAULT_PROJECT);
        t.set_dates(Some(day(start)), Some(day(finish))).unwrap();
        t
    }

    fn tasks(list: impl IntoIterator<Item = Task>) -> HashMap<TaskId, Task> {
        list.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    fn default_tasks(ids: &[u32]) -> HashMap<TaskId, Task> {
        tasks(ids.iter().map(|&n| task(n, DEFAULT_PROJECT)))
    }

    fn manager() -> DependencyManager<MemoryEdgeStore> {
        DependencyManager::new(MemoryEdgeStore::new())
    }

    fn fs(a: u32, b: u32) -> NewDependency {
        NewDependency::finish_to_start(tid(a), tid(b))
    }

    fn code(err: &StoreError) -> &'static str {
        err.dependency().map(DependencyError::code).unwrap_or("backend")
    }

    #[test]
    fn add_rejects_unknown_tasks() {
        let m = manager();
        let tasks = default_tasks(&[1]);

        let err = m.add(&tasks, fs(1, 9)).unwrap_err();
        assert!(matches!(
            err.dependency(),
            Some(DependencyError::UnknownTask(id)) if id == &tid(9)
        ));

        let err = m.add(&tasks, fs(8, 1)).unwrap_err();
        assert!(matches!(
            err.dependency(),
            Some(DependencyError::UnknownTask(id)) if id == &tid(8)
        ));
        assert!(m.store().list_all().unwrap().is_empty());
    }

    #[test]
    fn recheck_withdraws_edge_to_deleted_task() {
        let m = manager();
        let mut tasks = default_tasks(&[1, 2, 3]);
        let kept = m.add(&tasks, fs(1, 3)).unwrap();
        let edge = m.add(&tasks, fs(1, 2)).unwrap();
        m.recheck_endpoints(&tasks, &edge).unwrap();

        tasks.remove(&tid(2));
        let err = m.recheck_endpoints(&tasks, &edge).unwrap_err();

        assert!(matches!(
            err.dependency(),
            Some(DependencyError::UnknownTask(id)) if id == &tid(2)
        ));
        assert_eq!(m.store().list_all().unwrap(), vec![kept]);
    }

    #[test]
    fn add_rejects_duplicate_pair_regardless_of_type() {
        let m = manager();
        let tasks = default_tasks(&[1, 2]);

        m.add(&tasks, fs(1, 2)).unwrap();
        let err = m
            .add(
                &tasks,
                NewDependency::new(tid(1), tid(2), DependencyType::StartToStart, 3),
            )
            .unwrap_err();

        assert_eq!(code(&err), "duplicate_edge");
    }

    #[test]
    fn add_rejects_cycle_and_accepts_extension() {
        let m = manager();
        let tasks = default_tasks(&[1, 2, 3, 4]);

        m.add(&tasks, fs(1, 2)).unwrap();
        m.add(&tasks, fs(2, 3)).unwrap();

        let err = m.add(&tasks, fs(3, 1)).unwrap_err();
        assert_eq!(code(&err), "cyclic_dependency");

        m.add(&tasks, fs(3, 4)).unwrap();
        assert_eq!(m.store().list_all().unwrap().len(), 3);
    }

    #[test]
    fn reverse_edge_is_a_cycle_not_a_duplicate() {
        let m = manager();
        let tasks = default_tasks(&[1, 2]);

        m.add(&tasks, fs(1, 2)).unwrap();
        let err = m.add(&tasks, fs(2, 1)).unwrap_err();

        assert_eq!(code(&err), "cyclic_dependency");
    }

    #[test]
    fn self_loop_is_cyclic() {
        let m = manager();
        let tasks = default_tasks(&[1]);

        let err = m.add(&tasks, fs(1, 1)).unwrap_err();
        match err.dependency() {
            Some(DependencyError::CyclicDependency { path, .. }) => {
                assert_eq!(path, &vec![tid(1)])
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn cross_project_allowed_by_default() {
        let m = manager();
        let tasks = tasks([task(1, "house"), task(2, "web")]);

        assert!(m.add(&tasks, fs(1, 2)).is_ok());
    }

    #[test]
    fn cycle_through_another_project_is_refused() {
        let m = manager();
        let tasks = tasks([task(1, "house"), task(2, "web")]);
        m.add(&tasks, fs(1, 2)).unwrap();

        let err = m.add(&tasks, fs(2, 1)).unwrap_err();
        assert_eq!(code(&err), "cyclic_dependency");
        assert_eq!(m.list_by_project(tasks.values(), "web").unwrap().len(), 1);
    }

    #[test]
    fn cross_project_denied_by_policy() {
        let m = DependencyManager::with_policy(
            MemoryEdgeStore::new(),
            DependencyPolicy {
                cross_project: CrossProjectPolicy::Deny,
                ..Default::default()
            },
        );
        let tasks = tasks([task(1, "house"), task(2, "web"), task(3, "house")]);

        let err = m.add(&tasks, fs(1, 2)).unwrap_err();
        assert_eq!(code(&err), "cross_project");
        assert!(m.add(&tasks, fs(1, 3)).is_ok());
    }

    #[test]
    fn remove_missing_is_not_found_by_default() {
        let m = manager();
        let tasks = default_tasks(&[1, 2]);
        let edge = m.add(&tasks, fs(1, 2)).unwrap();

        assert_eq!(m.remove(&edge.id).unwrap(), Some(edge.clone()));
        let err = m.remove(&edge.id).unwrap_err();
        assert_eq!(code(&err), "not_found");
    }

    #[test]
    fn remove_missing_succeeds_when_idempotent() {
        let m = DependencyManager::with_policy(
            MemoryEdgeStore::new(),
            DependencyPolicy {
                idempotent_delete: true,
                ..Default::default()
            },
        );
        let tasks = default_tasks(&[1, 2]);
        let edge = m.add(&tasks, fs(1, 2)).unwrap();

        assert!(m.remove(&edge.id).unwrap().is_some());
        assert_eq!(m.remove(&edge.id).unwrap(), None);
    }

    #[test]
    fn insert_then_remove_leaves_project_listing_unchanged() {
        let m = manager();
        let tasks = default_tasks(&[1, 2, 3]);
        m.add(&tasks, fs(1, 2)).unwrap();
        let before = m.list_by_project(tasks.values(), DEFAULT_PROJECT).unwrap();

        let edge = m.add(&tasks, fs(2, 3)).unwrap();
        m.remove(&edge.id).unwrap();

        assert_eq!(
            m.list_by_project(tasks.values(), DEFAULT_PROJECT).unwrap(),
            before
        );
    }

    #[test]
    fn list_by_project_scopes_to_project() {
        let m = manager();
        let tasks = tasks([task(1, "house"), task(2, "house"), task(3, "web"), task(4, "web")]);
        let house = m.add(&tasks, fs(1, 2)).unwrap();
        m.add(&tasks, fs(3, 4)).unwrap();

        assert_eq!(m.list_by_project(tasks.values(), "house").unwrap(), vec![house]);
        assert!(m.list_by_project(tasks.values(), "empty").unwrap().is_empty());
    }

    #[test]
    fn update_changes_type_and_lag() {
        let m = manager();
        let tasks = default_tasks(&[1, 2]);
        let edge = m.add(&tasks, fs(1, 2)).unwrap();

        let updated = m
            .update(
                &edge.id,
                EdgeChange {
                    dep_type: Some(DependencyType::StartToStart),
                    lag_days: Some(4),
                },
            )
            .unwrap();

        assert_eq!(m.get(&edge.id).unwrap(), updated);
        assert_eq!(updated.dep_type, DependencyType::StartToStart);
        assert_eq!(updated.lag_days, 4);
    }

    #[test]
    fn get_missing_is_not_found() {
        let m = manager();
        let err = m.get(&"d-0000abc".parse().unwrap()).unwrap_err();
        assert_eq!(code(&err), "not_found");
    }

    #[test]
    fn remove_task_edges_cascades() {
        let m = manager();
        let tasks = default_tasks(&[1, 2, 3]);
        m.add(&tasks, fs(1, 2)).unwrap();
        m.add(&tasks, fs(2, 3)).unwrap();

        assert_eq!(m.remove_task_edges(&tid(2)).unwrap(), 2);
        assert!(m.list_by_task(&tid(1)).unwrap().is_empty());
    }

    #[test]
    fn finish_to_start_lag_moves_successor_start() {
        let m = manager();
        let tasks = tasks([dated(1, 5, 10), dated(2, 20, 25)]);
        let edge = m
            .add(
                &tasks,
                NewDependency::new(tid(1), tid(2), DependencyType::FinishToStart, 2),
            )
            .unwrap();

        let constraints = m.constraints_for(&tasks, &tid(2)).unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].bound, Bound::Start);
        assert_eq!(constraints[0].earliest, day(12));

        m.update(
            &edge.id,
            EdgeChange {
                dep_type: None,
                lag_days: Some(-3),
            },
        )
        .unwrap();
        let constraints = m.constraints_for(&tasks, &tid(2)).unwrap();
        assert_eq!(constraints[0].earliest, day(7));
    }

    #[test]
    fn constraints_skip_undated_predecessors() {
        let m = manager();
        let tasks = tasks([task(1, DEFAULT_PROJECT), dated(2, 0, 3), dated(3, 10, 12)]);
        m.add(&tasks, fs(1, 3)).unwrap();
        m.add(&tasks, fs(2, 3)).unwrap();

        let constraints = m.constraints_for(&tasks, &tid(3)).unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].predecessor, tid(2));
    }

    #[test]
    fn constraints_for_unknown_task_fails() {
        let m = manager();
        let err = m.constraints_for(&default_tasks(&[]), &tid(1)).unwrap_err();
        assert!(err.downcast_ref::<DependencyError>().is_some());
    }

    #[test]
    fn check_project_reports_violations() {
        let m = manager();
        let tasks = tasks([
            dated(1, 0, 10),
            dated(2, 8, 12),
            dated(3, 11, 14),
            task(4, DEFAULT_PROJECT),
        ]);
        m.add(&tasks, fs(1, 2)).unwrap();
        m.add(&tasks, fs(1, 3)).unwrap();
        m.add(&tasks, fs(3, 4)).unwrap();

        let report = m.check_project(&tasks, DEFAULT_PROJECT).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.checked.len(), 2);
        assert_eq!(report.undated.len(), 1);

        let violations: Vec<_> = report.violations().collect();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].constraint.successor, tid(2));
        assert_eq!(violations[0].check, ConstraintCheck::Violated { by_days: 2 });
    }

    #[test]
    fn out_of_range_lag_does_not_hide_other_constraints() {
        let m = manager();
        let tasks = tasks([dated(1, 0, 4), dated(2, 9, 11), dated(3, 0, 1)]);
        let far = m
            .add(
                &tasks,
                NewDependency::new(tid(1), tid(2), DependencyType::FinishToStart, i32::MAX),
            )
            .unwrap();
        m.add(&tasks, fs(1, 3)).unwrap();
        m.add(&tasks, fs(3, 2)).unwrap();

        let report = m.check_project(&tasks, DEFAULT_PROJECT).unwrap();
        assert_eq!(report.out_of_range, vec![far.id]);
        assert_eq!(report.checked.len(), 2);
        assert_eq!(report.violations().count(), 1);

        let constraints = m.constraints_for(&tasks, &tid(2)).unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].predecessor, tid(3));
    }

    #[test]
    fn topological_order_puts_predecessors_first() {
        let m = manager();
        let tasks = default_tasks(&[1, 2, 3, 4]);
        m.add(&tasks, fs(3, 1)).unwrap();
        m.add(&tasks, fs(1, 2)).unwrap();

        let order = m.topological_order(&tasks, DEFAULT_PROJECT).unwrap();
        assert_eq!(order.len(), 4);

        let pos = |n: u32| order.iter().position(|id| id == &tid(n)).unwrap();
        assert!(pos(3) < pos(1));
        assert!(pos(1) < pos(2));
    }
}
