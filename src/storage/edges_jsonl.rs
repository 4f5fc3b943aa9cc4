//! JSONL edge store
//!
//! The default, git-friendly backend. Guard and write share one exclusive
//! file lock, so separate processes (or separate handles in one process)
//! cannot interleave an insert between another insert's check and write.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use super::edge_store::{admit, apply_change, remove_edge, EdgeStore, StoreError, StoreResult};
use super::jsonl::JsonlFile;
use crate::domain::{DependencyEdge, EdgeChange, EdgeId, NewDependency, TaskId};

/// Edge store persisted as `dependencies.jsonl`
#[derive(Debug, Clone)]
pub struct JsonlEdgeStore {
    file: JsonlFile,
}

impl JsonlEdgeStore {
    /// Creates a store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonlFile::new(path),
        }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".taskdeps").join("dependencies.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl EdgeStore for JsonlEdgeStore {
    fn backend(&self) -> &'static str {
        "jsonl"
    }

    fn list_all(&self) -> StoreResult<Vec<DependencyEdge>> {
        Ok(self.file.read_all()?)
    }

    fn insert(&self, request: NewDependency) -> StoreResult<DependencyEdge> {
        self.file.modify(|edges: &mut Vec<DependencyEdge>| {
            let edge = admit(edges, request, Utc::now())?;
            edges.push(edge.clone());
            edges.sort_by(|a, b| a.id.cmp(&b.id));
            debug!(edge = %edge.id, path = %self.path().display(), "jsonl store: inserted edge");
            Ok::<_, StoreError>(edge)
        })
    }

    fn update(&self, id: &EdgeId, change: EdgeChange) -> StoreResult<DependencyEdge> {
        self.file.modify(|edges: &mut Vec<DependencyEdge>| {
            Ok::<_, StoreError>(apply_change(edges, id, &change)?)
        })
    }

    fn delete(&self, id: &EdgeId) -> StoreResult<DependencyEdge> {
        self.file.modify(|edges: &mut Vec<DependencyEdge>| {
            Ok::<_, StoreError>(remove_edge(edges, id)?)
        })
    }

    fn delete_touching(&self, task: &TaskId) -> StoreResult<usize> {
        self.file.modify(|edges: &mut Vec<DependencyEdge>| {
            let before = edges.len();
            edges.retain(|e| !e.touches(task));
            Ok::<_, StoreError>(before - edges.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::edge_store::contract;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn satisfies_store_contract() {
        let dir = TempDir::new().unwrap();
        let counter = std::cell::Cell::new(0);
        contract::run_all(|| -> Box<dyn EdgeStore> {
            counter.set(counter.get() + 1);
            let path = dir.path().join(format!("deps-{}.jsonl", counter.get()));
            Box::new(JsonlEdgeStore::new(path))
        });
    }

    #[test]
    fn edges_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dependencies.jsonl");

        let edge = JsonlEdgeStore::new(&path)
            .insert(NewDependency::finish_to_start(contract::tid(1), contract::tid(2)))
            .unwrap();

        let reopened = JsonlEdgeStore::new(&path);
        assert_eq!(reopened.list_all().unwrap(), vec![edge]);
    }

    #[test]
    fn rejected_insert_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = JsonlEdgeStore::new(dir.path().join("dependencies.jsonl"));
        store
            .insert(NewDependency::finish_to_start(contract::tid(1), contract::tid(2)))
            .unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        assert!(store
            .insert(NewDependency::finish_to_start(contract::tid(2), contract::tid(1)))
            .is_err());

        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn one_edge_per_line() {
        let dir = TempDir::new().unwrap();
        let store = JsonlEdgeStore::new(dir.path().join("dependencies.jsonl"));
        for (a, b) in [(1, 2), (2, 3), (1, 3)] {
            store
                .insert(NewDependency::finish_to_start(contract::tid(a), contract::tid(b)))
                .unwrap();
        }

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().all(|l| l.contains("\"type\":\"finish_to_start\"")));
    }
}
