//! Dependency graph and cycle guard
//!
//! Edges are kept as plain data in a petgraph arena keyed by task ID, so
//! the graph never owns tasks and never holds back-pointers.
//!
//! A new edge `pred -> succ` closes a cycle exactly when `pred` is already
//! reachable from `succ`. The guard answers that with one breadth-first
//! search from `succ` instead of re-checking the whole graph.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use super::dependency::DependencyEdge;
use super::id::{EdgeId, TaskId};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Dependency graph contains a cycle through {0}")]
    CycleDetected(TaskId),
}

/// Directed graph over task IDs, edges pointing predecessor -> successor
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<TaskId, EdgeId>,

    /// Map from TaskId to node index
    node_map: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from stored edges
    ///
    /// Stored edges are trusted to be acyclic; no check is made here.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a DependencyEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(edge);
        }
        graph
    }

    /// Adds a task node if not already present
    pub fn add_task(&mut self, task_id: TaskId) -> NodeIndex {
        if let Some(idx) = self.node_map.get(&task_id) {
            return *idx;
        }
        let idx = self.graph.add_node(task_id.clone());
        self.node_map.insert(task_id, idx);
        idx
    }

    /// Adds an edge without any guard
    pub fn add_edge(&mut self, edge: &DependencyEdge) {
        let from = self.add_task(edge.predecessor.clone());
        let to = self.add_task(edge.successor.clone());
        self.graph.add_edge(from, to, edge.id.clone());
    }

    /// Returns true if a directed path leads from `from` to `to`
    pub fn can_reach(&self, from: &TaskId, to: &TaskId) -> bool {
        self.path(from, to).is_some()
    }

    /// Finds a shortest directed path `from ... to`, both ends included
    ///
    /// The visited set keeps the search finite even if the graph was
    /// loaded from a store that somehow holds a cycle.
    pub fn path(&self, from: &TaskId, to: &TaskId) -> Option<Vec<TaskId>> {
        let start = *self.node_map.get(from)?;
        let goal = *self.node_map.get(to)?;

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                return Some(self.unwind(&parent, start, goal));
            }

            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        None
    }

    fn unwind(
        &self,
        parent: &HashMap<NodeIndex, NodeIndex>,
        start: NodeIndex,
        goal: NodeIndex,
    ) -> Vec<TaskId> {
        let mut nodes = vec![goal];
        let mut current = goal;
        while current != start {
            match parent.get(&current) {
                Some(prev) => {
                    current = *prev;
                    nodes.push(current);
                }
                None => break,
            }
        }
        nodes.reverse();
        nodes
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Returns the existing path that adding `pred -> succ` would close
    ///
    /// A self-loop yields `[pred]` without traversing anything.
    pub fn cycle_path(&self, pred: &TaskId, succ: &TaskId) -> Option<Vec<TaskId>> {
        if pred == succ {
            return Some(vec![pred.clone()]);
        }
        self.path(succ, pred)
    }

    /// Returns all tasks reachable from `task`, excluding itself
    pub fn reachable_from(&self, task: &TaskId) -> HashSet<TaskId> {
        let Some(&start) = self.node_map.get(task) else {
            return HashSet::new();
        };

        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.remove(&start);

        seen.into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Returns the direct predecessors of a task
    pub fn predecessors_of(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.neighbors(task_id, Direction::Incoming)
    }

    /// Returns the direct successors of a task
    pub fn successors_of(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.neighbors(task_id, Direction::Outgoing)
    }

    fn neighbors(&self, task_id: &TaskId, direction: Direction) -> Vec<TaskId> {
        let Some(&idx) = self.node_map.get(task_id) else {
            return vec![];
        };

        let mut ids: Vec<TaskId> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        ids.sort();
        ids
    }

    /// Returns all tasks in topological order (predecessors first)
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => Err(GraphError::CycleDetected(
                self.graph[cycle.node_id()].clone(),
            )),
        }
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.node_map.contains_key(task_id)
    }

    /// Returns the number of tasks in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Returns the number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Returns true if adding `pred -> succ` to `existing` would create a cycle
///
/// Pure: builds a throwaway graph from `existing` and runs one search.
pub fn would_create_cycle(pred: &TaskId, succ: &TaskId, existing: &[DependencyEdge]) -> bool {
    cycle_path(pred, succ, existing).is_some()
}

/// Like [`would_create_cycle`], returning the offending path `succ ... pred`
pub fn cycle_path(
    pred: &TaskId,
    succ: &TaskId,
    existing: &[DependencyEdge],
) -> Option<Vec<TaskId>> {
    if pred == succ {
        return Some(vec![pred.clone()]);
    }
    DependencyGraph::from_edges(existing).cycle_path(pred, succ)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::domain::dependency::{DependencyType, NewDependency};
    use chrono::Utc;
    use proptest::prelude::*;

    const NODES: u32 = 12;

    fn tid(n: u32) -> TaskId {
        format!("t-{:07x}", n).parse().unwrap()
    }

    /// Random DAG: only edges from lower to higher node numbers
    fn dag() -> impl Strategy<Value = Vec<(u32, u32)>> {
        prop::collection::vec((0..NODES, 0..NODES), 0..40).prop_map(|pairs| {
            let mut edges: Vec<(u32, u32)> = pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect();
            edges.sort_unstable();
            edges.dedup();
            edges
        })
    }

    fn materialize(pairs: &[(u32, u32)]) -> Vec<DependencyEdge> {
        let now = Utc::now();
        pairs
            .iter()
            .map(|&(a, b)| {
                let request = NewDependency::new(tid(a), tid(b), DependencyType::FinishToStart, 0);
                DependencyEdge::from_request(EdgeId::new(&tid(a), &tid(b), now, 0), request, now)
            })
            .collect()
    }

    /// Reference reachability via transitive closure
    fn reaches(pairs: &[(u32, u32)], from: u32, to: u32) -> bool {
        let n = NODES as usize;
        let mut m = vec![vec![false; n]; n];
        for &(a, b) in pairs {
            m[a as usize][b as usize] = true;
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if m[i][k] && m[k][j] {
                        m[i][j] = true;
                    }
                }
            }
        }
        m[from as usize][to as usize]
    }

    proptest! {
        #[test]
        fn guard_matches_reachability(pairs in dag(), a in 0..NODES, b in 0..NODES) {
            prop_assume!(a != b);
            let edges = materialize(&pairs);
            prop_assert_eq!(would_create_cycle(&tid(a), &tid(b), &edges), reaches(&pairs, b, a));
        }

        #[test]
        fn self_loop_always_cyclic(pairs in dag(), a in 0..NODES) {
            let edges = materialize(&pairs);
            prop_assert!(would_create_cycle(&tid(a), &tid(a), &edges));
        }

        #[test]
        fn reported_path_is_real(pairs in dag(), a in 0..NODES, b in 0..NODES) {
            prop_assume!(a != b);
            let edges = materialize(&pairs);
            if let Some(path) = cycle_path(&tid(a), &tid(b), &edges) {
                prop_assert_eq!(path.first(), Some(&tid(b)));
                prop_assert_eq!(path.last(), Some(&tid(a)));
                for step in path.windows(2) {
                    prop_assert!(edges.iter().any(|e| e.links(&step[0], &step[1])));
                }
            }
        }
    }
}
