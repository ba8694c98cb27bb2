//! Static execution plan over a data graph.
//!
//! [`DataGraph`] resolves dependencies lazily during traversal; this module
//! builds an explicit DAG view of the same structure for ahead-of-time
//! inspection: full topological ordering, structural cycle rejection, and
//! DOT export for debugging graph configurations.

use crate::graph::{DataGraph, GraphError};
use daggy::{Dag, NodeIndex, Walker};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

/// Immutable DAG view of a [`DataGraph`], edges pointing dependency to
/// dependent.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    dag: Dag<String, ()>,
    id_to_index: HashMap<String, NodeIndex>,
    index_to_id: HashMap<NodeIndex, String>,
}

impl ExecutionPlan {
    /// Builds the plan from a graph's registered nodes.
    ///
    /// # Errors
    /// - `Lookup` when a node references an unregistered dependency
    /// - `CircularDependency` when an edge would close a loop
    pub fn from_graph(graph: &DataGraph) -> Result<Self, GraphError> {
        let mut dag: Dag<String, ()> = Dag::new();
        let mut id_to_index = HashMap::new();
        let mut index_to_id = HashMap::new();

        for id in graph.ids() {
            let index = dag.add_node(id.clone());
            id_to_index.insert(id.clone(), index);
            index_to_id.insert(index, id.clone());
        }

        for id in graph.ids() {
            let node = graph
                .node(id)
                .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
            let to = id_to_index[id];
            for dependency in node.dependencies() {
                let from = *id_to_index.get(dependency).ok_or_else(|| {
                    GraphError::Lookup(format!("Unknown node: {}", dependency))
                })?;
                dag.add_edge(from, to, ())
                    .map_err(|_| GraphError::CircularDependency(id.clone()))?;
            }
        }

        Ok(ExecutionPlan {
            dag,
            id_to_index,
            index_to_id,
        })
    }

    pub fn node_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.dag.edge_count()
    }

    /// Whether `id` has any dependents in the plan.
    pub fn has_dependents(&self, id: &str) -> bool {
        match self.id_to_index.get(id) {
            Some(&index) => self.dag.children(index).iter(&self.dag).next().is_some(),
            None => false,
        }
    }

    /// Full topological ordering via Kahn's algorithm, dependencies first.
    pub fn execution_order(&self) -> Result<Vec<String>, GraphError> {
        if self.dag.node_count() == 0 {
            return Ok(Vec::new());
        }

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for index in self.dag.graph().node_indices() {
            in_degree.insert(index, 0);
        }
        for edge in self.dag.raw_edges() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        // Seed the queue in insertion order so the ordering is stable for
        // equal-rank nodes.
        for index in self.dag.graph().node_indices() {
            if in_degree[&index] == 0 {
                queue.push_back(index);
            }
        }

        let mut result = Vec::with_capacity(self.dag.node_count());
        while let Some(index) = queue.pop_front() {
            if let Some(id) = self.index_to_id.get(&index) {
                result.push(id.clone());
            }
            for (_, child) in self.dag.children(index).iter(&self.dag) {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if result.len() != self.dag.node_count() {
            return Err(GraphError::CircularDependency(
                "Topological sort did not cover every node".to_string(),
            ));
        }
        Ok(result)
    }

    /// Renders the plan in DOT format for graphviz.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph data_graph {\n");
        for index in self.dag.graph().node_indices() {
            if let Some(id) = self.index_to_id.get(&index) {
                let _ = writeln!(out, "    \"{}\";", id);
            }
        }
        for edge in self.dag.raw_edges() {
            if let (Some(from), Some(to)) = (
                self.index_to_id.get(&edge.source()),
                self.index_to_id.get(&edge.target()),
            ) {
                let _ = writeln!(out, "    \"{}\" -> \"{}\";", from, to);
            }
        }
        out.push_str("}\n");
        out
    }
}
