//! Edge store interface
//!
//! Every backend must make [`EdgeStore::insert`] a single atomic step:
//! the duplicate check, the cycle check and the write happen while the
//! backend's lock or transaction is held, so two racing inserts can never
//! both pass the guard against stale snapshots.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    cycle_path, DependencyEdge, DependencyError, EdgeChange, EdgeId, NewDependency, TaskEdges,
    TaskId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The request broke a dependency rule
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// The backend itself failed (I/O, parsing, SQLite)
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Returns the rule violation, if this is one
    pub fn dependency(&self) -> Option<&DependencyError> {
        match self {
            StoreError::Dependency(e) => Some(e),
            StoreError::Backend(_) => None,
        }
    }

    /// Converts into an `anyhow::Error` that still downcasts to
    /// [`DependencyError`] for rule violations
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            StoreError::Dependency(e) => anyhow::Error::new(e),
            StoreError::Backend(e) => e,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable holder of dependency edges
pub trait EdgeStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Returns every stored edge, ordered by ID
    fn list_all(&self) -> StoreResult<Vec<DependencyEdge>>;

    /// Inserts a new edge if it is neither a duplicate nor closes a cycle
    ///
    /// Endpoint existence is the caller's responsibility.
    fn insert(&self, request: NewDependency) -> StoreResult<DependencyEdge>;

    /// Changes the type and/or lag of an edge
    fn update(&self, id: &EdgeId, change: EdgeChange) -> StoreResult<DependencyEdge>;

    /// Deletes an edge, returning it
    fn delete(&self, id: &EdgeId) -> StoreResult<DependencyEdge>;

    /// Deletes every edge touching `task`, returning how many were removed
    fn delete_touching(&self, task: &TaskId) -> StoreResult<usize>;

    /// Returns a single edge by ID
    fn get(&self, id: &EdgeId) -> StoreResult<Option<DependencyEdge>> {
        Ok(self.list_all()?.into_iter().find(|e| &e.id == id))
    }

    /// Returns the edge linking this ordered pair, if any
    ///
    /// Use this before retrying an insert whose outcome is unknown.
    fn find_between(
        &self,
        predecessor: &TaskId,
        successor: &TaskId,
    ) -> StoreResult<Option<DependencyEdge>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|e| e.links(predecessor, successor)))
    }

    /// Returns the edges where `task` is successor and where it is predecessor
    fn list_by_task(&self, task: &TaskId) -> StoreResult<TaskEdges> {
        Ok(split_by_task(self.list_all()?, task))
    }

    /// Returns every edge with at least one endpoint in `tasks`
    fn list_by_project(&self, tasks: &HashSet<TaskId>) -> StoreResult<Vec<DependencyEdge>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|e| tasks.contains(&e.predecessor) || tasks.contains(&e.successor))
            .collect())
    }
}

impl<T: EdgeStore + ?Sized> EdgeStore for Box<T> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn list_all(&self) -> StoreResult<Vec<DependencyEdge>> {
        (**self).list_all()
    }

    fn insert(&self, request: NewDependency) -> StoreResult<DependencyEdge> {
        (**self).insert(request)
    }

    fn update(&self, id: &EdgeId, change: EdgeChange) -> StoreResult<DependencyEdge> {
        (**self).update(id, change)
    }

    fn delete(&self, id: &EdgeId) -> StoreResult<DependencyEdge> {
        (**self).delete(id)
    }

    fn delete_touching(&self, task: &TaskId) -> StoreResult<usize> {
        (**self).delete_touching(task)
    }

    fn get(&self, id: &EdgeId) -> StoreResult<Option<DependencyEdge>> {
        (**self).get(id)
    }

    fn find_between(
        &self,
        predecessor: &TaskId,
        successor: &TaskId,
    ) -> StoreResult<Option<DependencyEdge>> {
        (**self).find_between(predecessor, successor)
    }

    fn list_by_task(&self, task: &TaskId) -> StoreResult<TaskEdges> {
        (**self).list_by_task(task)
    }

    fn list_by_project(&self, tasks: &HashSet<TaskId>) -> StoreResult<Vec<DependencyEdge>> {
        (**self).list_by_project(tasks)
    }
}

/// Splits edges into those entering and those leaving `task`
pub(crate) fn split_by_task(
    edges: impl IntoIterator<Item = DependencyEdge>,
    task: &TaskId,
) -> TaskEdges {
    let mut split = TaskEdges::default();
    for edge in edges {
        if &edge.successor == task {
            split.predecessors.push(edge);
        } else if &edge.predecessor == task {
            split.successors.push(edge);
        }
    }
    split
}

/// Decides whether `request` may join `existing` and builds the new edge
///
/// Callers hold their backend's write lock around this and the write.
pub(crate) fn admit(
    existing: &[DependencyEdge],
    request: NewDependency,
    now: DateTime<Utc>,
) -> Result<DependencyEdge, DependencyError> {
    let NewDependency {
        predecessor,
        successor,
        ..
    } = &request;

    if predecessor == successor {
        return Err(DependencyError::CyclicDependency {
            predecessor: predecessor.clone(),
            successor: successor.clone(),
            path: vec![predecessor.clone()],
        });
    }

    if let Some(edge) = existing.iter().find(|e| e.links(predecessor, successor)) {
        return Err(DependencyError::DuplicateEdge {
            predecessor: predecessor.clone(),
            successor: successor.clone(),
            existing: edge.id.clone(),
        });
    }

    if let Some(path) = cycle_path(predecessor, successor, existing) {
        return Err(DependencyError::CyclicDependency {
            predecessor: predecessor.clone(),
            successor: successor.clone(),
            path,
        });
    }

    let id = allocate_id(existing, &request, now);
    Ok(DependencyEdge::from_request(id, request, now))
}

/// Picks an edge ID not used by `existing`
pub(crate) fn allocate_id(
    existing: &[DependencyEdge],
    request: &NewDependency,
    now: DateTime<Utc>,
) -> EdgeId {
    let taken: HashSet<&EdgeId> = existing.iter().map(|e| &e.id).collect();
    let mut nonce = 0;
    loop {
        let id = EdgeId::new(&request.predecessor, &request.successor, now, nonce);
        if !taken.contains(&id) {
            return id;
        }
        nonce += 1;
    }
}

/// Applies `change` to the edge with `id` inside `edges`
pub(crate) fn apply_change(
    edges: &mut [DependencyEdge],
    id: &EdgeId,
    change: &EdgeChange,
) -> Result<DependencyEdge, DependencyError> {
    let edge = edges
        .iter_mut()
        .find(|e| &e.id == id)
        .ok_or_else(|| DependencyError::NotFound(id.clone()))?;
    edge.apply(change);
    Ok(edge.clone())
}

/// Removes the edge with `id` from `edges`
pub(crate) fn remove_edge(
    edges: &mut Vec<DependencyEdge>,
    id: &EdgeId,
) -> Result<DependencyEdge, DependencyError> {
    let pos = edges
        .iter()
        .position(|e| &e.id == id)
        .ok_or_else(|| DependencyError::NotFound(id.clone()))?;
    Ok(edges.remove(pos))
}

/// Shared behavioural checks every backend must pass
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::domain::DependencyType;

    pub fn tid(n: u32) -> TaskId {
        format!("t-{:07x}", n).parse().unwrap()
    }

    fn fs(a: u32, b: u32) -> NewDependency {
        NewDependency::finish_to_start(tid(a), tid(b))
    }

    pub fn insert_and_list(store: &dyn EdgeStore) {
        let edge = store.insert(fs(1, 2)).unwrap();

        assert_eq!(store.list_all().unwrap(), vec![edge.clone()]);
        assert_eq!(store.get(&edge.id).unwrap(), Some(edge.clone()));
        assert_eq!(store.find_between(&tid(1), &tid(2)).unwrap(), Some(edge));
        assert_eq!(store.find_between(&tid(2), &tid(1)).unwrap(), None);
    }

    pub fn duplicate_rejected(store: &dyn EdgeStore) {
        let first = store.insert(fs(1, 2)).unwrap();
        let second = store.insert(NewDependency::new(
            tid(1),
            tid(2),
            DependencyType::StartToStart,
            3,
        ));

        match second {
            Err(StoreError::Dependency(DependencyError::DuplicateEdge { existing, .. })) => {
                assert_eq!(existing, first.id)
            }
            other => panic!("expected DuplicateEdge, got {:?}", other),
        }
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    pub fn cycle_rejected(store: &dyn EdgeStore) {
        store.insert(fs(1, 2)).unwrap();
        store.insert(fs(2, 3)).unwrap();

        let err = store.insert(fs(3, 1)).unwrap_err();
        match err.dependency() {
            Some(DependencyError::CyclicDependency { path, .. }) => {
                assert_eq!(path, &vec![tid(1), tid(2), tid(3)]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }

        store.insert(fs(3, 4)).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 3);
    }

    pub fn self_loop_rejected(store: &dyn EdgeStore) {
        let err = store.insert(fs(1, 1)).unwrap_err();
        assert!(matches!(
            err.dependency(),
            Some(DependencyError::CyclicDependency { .. })
        ));
        assert!(store.list_all().unwrap().is_empty());
    }

    pub fn list_by_task_splits_directions(store: &dyn EdgeStore) {
        let into = store.insert(fs(1, 2)).unwrap();
        let out = store.insert(fs(2, 3)).unwrap();
        store.insert(fs(4, 5)).unwrap();

        let edges = store.list_by_task(&tid(2)).unwrap();
        assert_eq!(edges.predecessors, vec![into]);
        assert_eq!(edges.successors, vec![out]);

        // Reads are idempotent
        assert_eq!(store.list_by_task(&tid(2)).unwrap(), edges);
    }

    pub fn list_by_project_filters(store: &dyn EdgeStore) {
        store.insert(fs(1, 2)).unwrap();
        store.insert(fs(3, 4)).unwrap();
        store.insert(fs(2, 5)).unwrap();

        let project = HashSet::from([tid(1), tid(2)]);
        let edges = store.list_by_project(&project).unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.touches(&tid(1)) || e.touches(&tid(2))));
    }

    pub fn insert_delete_roundtrip(store: &dyn EdgeStore) {
        store.insert(fs(1, 2)).unwrap();
        let project = HashSet::from([tid(1), tid(2), tid(3)]);
        let before = store.list_by_project(&project).unwrap();

        let edge = store.insert(fs(2, 3)).unwrap();
        store.delete(&edge.id).unwrap();

        assert_eq!(store.list_by_project(&project).unwrap(), before);
    }

    pub fn delete_missing_is_not_found(store: &dyn EdgeStore) {
        let edge = store.insert(fs(1, 2)).unwrap();
        store.delete(&edge.id).unwrap();

        let err = store.delete(&edge.id).unwrap_err();
        assert!(matches!(
            err.dependency(),
            Some(DependencyError::NotFound(id)) if id == &edge.id
        ));
    }

    pub fn update_changes_type_and_lag(store: &dyn EdgeStore) {
        let edge = store.insert(fs(1, 2)).unwrap();
        let updated = store
            .update(
                &edge.id,
                EdgeChange {
                    dep_type: Some(DependencyType::FinishToFinish),
                    lag_days: Some(-2),
                },
            )
            .unwrap();

        assert_eq!(updated.id, edge.id);
        assert_eq!(updated.predecessor, edge.predecessor);
        assert_eq!(updated.dep_type, DependencyType::FinishToFinish);
        assert_eq!(updated.lag_days, -2);
        assert_eq!(store.get(&edge.id).unwrap(), Some(updated));

        let missing: EdgeId = "d-fffffff".parse().unwrap();
        assert!(matches!(
            store.update(&missing, EdgeChange::default()).unwrap_err().dependency(),
            Some(DependencyError::NotFound(_))
        ));
    }

    pub fn delete_touching_cascades(store: &dyn EdgeStore) {
        store.insert(fs(1, 2)).unwrap();
        store.insert(fs(2, 3)).unwrap();
        store.insert(fs(3, 4)).unwrap();

        assert_eq!(store.delete_touching(&tid(2)).unwrap(), 2);
        let remaining = store.list_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].links(&tid(3), &tid(4)));
    }

    /// Runs every check against fresh stores from `make`
    pub fn run_all(make: impl Fn() -> Box<dyn EdgeStore>) {
        insert_and_list(make().as_ref());
        duplicate_rejected(make().as_ref());
        cycle_rejected(make().as_ref());
        self_loop_rejected(make().as_ref());
        list_by_task_splits_directions(make().as_ref());
        list_by_project_filters(make().as_ref());
        insert_delete_roundtrip(make().as_ref());
        delete_missing_is_not_found(make().as_ref());
        update_changes_type_and_lag(make().as_ref());
        delete_touching_cascades(make().as_ref());
    }
}
