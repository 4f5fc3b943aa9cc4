//! In-memory edge store
//!
//! Used by tests and by embedders that keep the graph in process. A single
//! mutex serializes all mutations, which makes every insert atomic with
//! respect to its cycle check.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use super::edge_store::{admit, apply_change, remove_edge, EdgeStore, StoreResult};
use crate::domain::{DependencyEdge, EdgeChange, EdgeId, NewDependency, TaskId};

/// Edge store backed by a mutex-guarded vector sorted by edge ID
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    edges: Mutex<Vec<DependencyEdge>>,
}

impl MemoryEdgeStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `edges` as-is, without any checks
    pub fn with_edges(mut edges: Vec<DependencyEdge>) -> Self {
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            edges: Mutex::new(edges),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DependencyEdge>> {
        // Mutations never panic part-way, so a poisoned vector is still consistent
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EdgeStore for MemoryEdgeStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn list_all(&self) -> StoreResult<Vec<DependencyEdge>> {
        Ok(self.lock().clone())
    }

    fn insert(&self, request: NewDependency) -> StoreResult<DependencyEdge> {
        let mut edges = self.lock();
        let edge = admit(&edges, request, Utc::now())?;

        let pos = edges
            .binary_search_by(|e| e.id.cmp(&edge.id))
            .unwrap_or_else(|pos| pos);
        edges.insert(pos, edge.clone());

        debug!(edge = %edge.id, total = edges.len(), "memory store: inserted edge");
        Ok(edge)
    }

    fn update(&self, id: &EdgeId, change: EdgeChange) -> StoreResult<DependencyEdge> {
        let mut edges = self.lock();
        Ok(apply_change(&mut edges, id, &change)?)
    }

    fn delete(&self, id: &EdgeId) -> StoreResult<DependencyEdge> {
        let mut edges = self.lock();
        Ok(remove_edge(&mut edges, id)?)
    }

    fn delete_touching(&self, task: &TaskId) -> StoreResult<usize> {
        let mut edges = self.lock();
        let before = edges.len();
        edges.retain(|e| !e.touches(task));
        Ok(before - edges.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::edge_store::contract;

    #[test]
    fn satisfies_store_contract() {
        contract::run_all(|| -> Box<dyn EdgeStore> { Box::new(MemoryEdgeStore::new()) });
    }

    #[test]
    fn with_edges_keeps_order_by_id() {
        let source = MemoryEdgeStore::new();
        source
            .insert(NewDependency::finish_to_start(contract::tid(1), contract::tid(2)))
            .unwrap();
        source
            .insert(NewDependency::finish_to_start(contract::tid(2), contract::tid(3)))
            .unwrap();

        let mut edges = source.list_all().unwrap();
        edges.reverse();
        let copy = MemoryEdgeStore::with_edges(edges);

        assert_eq!(copy.list_all().unwrap(), source.list_all().unwrap());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            #[test]
            fn insert_then_delete_leaves_project_unchanged(
                pairs in prop::collection::vec((1..8u32, 1..8u32), 0..20),
                extra in (1..8u32, 1..8u32),
            ) {
                let store = MemoryEdgeStore::new();
                for (a, b) in pairs {
                    // Refusals are fine here; only the accepted set matters
                    let request =
                        NewDependency::finish_to_start(contract::tid(a), contract::tid(b));
                    let _ = store.insert(request);
                }

                let project: HashSet<TaskId> = (1..8).map(contract::tid).collect();
                let before = store.list_by_project(&project).unwrap();

                let request =
                    NewDependency::finish_to_start(contract::tid(extra.0), contract::tid(extra.1));
                if let Ok(edge) = store.insert(request) {
                    store.delete(&edge.id).unwrap();
                }

                prop_assert_eq!(store.list_by_project(&project).unwrap(), before);
            }
        }
    }
}
