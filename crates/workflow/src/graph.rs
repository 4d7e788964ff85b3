//! Host-level dependency graph derived from snapshot edges.
//!
//! Edges that bind into a middleware handle still create a dependency on the
//! middleware's host node; the graph works at host granularity.

use std::collections::HashMap;

use meridian_core::NodeKey;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use crate::error::WorkflowError;
use crate::snapshot::WorkflowSnapshot;

/// Directed dependency graph over a snapshot's top-level nodes.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeKey, ()>,
    indices: HashMap<NodeKey, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph and reject cycles.
    ///
    /// Assumes edge endpoints have already been validated to exist.
    pub fn from_snapshot(snapshot: &WorkflowSnapshot) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for node in &snapshot.nodes {
            let idx = graph.add_node(node.id.clone());
            indices.insert(node.id.clone(), idx);
        }
        for edge in &snapshot.edges {
            if let (Some(&src), Some(&dst)) = (
                indices.get(&edge.source.node),
                indices.get(&edge.target.node),
            ) {
                graph.update_edge(src, dst, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let node = graph[cycle.node_id()].clone();
            return Err(WorkflowError::Cycle(node));
        }

        Ok(Self { graph, indices })
    }

    /// Nodes with no incoming data edges.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeKey> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Nodes with no outgoing data edges.
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<NodeKey> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Direct upstream dependencies of a node.
    #[must_use]
    pub fn dependencies(&self, node: &NodeKey) -> Vec<NodeKey> {
        let Some(&idx) = self.indices.get(node) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|i| self.graph[i].clone())
            .collect()
    }

    /// Every node transitively downstream of the given node.
    #[must_use]
    pub fn transitive_dependents(&self, node: &NodeKey) -> Vec<NodeKey> {
        let Some(&start) = self.indices.get(node) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != start {
                out.push(self.graph[idx].clone());
            }
        }
        out
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        Edge, EdgeEndpoint, NodeSpec, PackageRef, WorkflowMetadata, WorkflowSnapshot,
    };
    use pretty_assertions::assert_eq;

    fn node(id: &str) -> NodeSpec {
        NodeSpec {
            id: NodeKey::new(id).unwrap(),
            node_type: "example.pkg.op".into(),
            package: PackageRef {
                name: "example.pkg".into(),
                version: semver::Version::new(1, 0, 0),
            },
            status: "published".into(),
            category: "test".into(),
            label: id.to_uppercase(),
            position: None,
            parameters: serde_json::Map::new(),
            ui: None,
            middlewares: Vec::new(),
            container: None,
            optional: false,
        }
    }

    fn edge(id: &str, from: &str, to: &str) -> Edge {
        Edge {
            id: id.into(),
            source: EdgeEndpoint {
                node: NodeKey::new(from).unwrap(),
                port: "out".into(),
            },
            target: EdgeEndpoint {
                node: NodeKey::new(to).unwrap(),
                port: "in".into(),
            },
        }
    }

    fn snapshot(nodes: Vec<NodeSpec>, edges: Vec<Edge>) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: "wf".into(),
            schema_version: "2025-10".into(),
            metadata: WorkflowMetadata {
                name: "t".into(),
                namespace: "default".into(),
                origin_id: "wf".into(),
                description: None,
                environment: None,
                tags: Vec::new(),
            },
            nodes,
            edges,
            subgraphs: Vec::new(),
        }
    }

    #[test]
    fn linear_graph() {
        let snap = snapshot(
            vec![node("a"), node("b"), node("c")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "c")],
        );
        let graph = DependencyGraph::from_snapshot(&snap).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.entry_nodes(), vec![NodeKey::new("a").unwrap()]);
        assert_eq!(graph.exit_nodes(), vec![NodeKey::new("c").unwrap()]);
        assert_eq!(
            graph.dependencies(&NodeKey::new("b").unwrap()),
            vec![NodeKey::new("a").unwrap()]
        );
    }

    #[test]
    fn diamond_dependents() {
        let snap = snapshot(
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![
                edge("e1", "a", "b"),
                edge("e2", "a", "c"),
                edge("e3", "b", "d"),
                edge("e4", "c", "d"),
            ],
        );
        let graph = DependencyGraph::from_snapshot(&snap).unwrap();

        let mut downstream = graph.transitive_dependents(&NodeKey::new("a").unwrap());
        downstream.sort();
        assert_eq!(
            downstream,
            vec![
                NodeKey::new("b").unwrap(),
                NodeKey::new("c").unwrap(),
                NodeKey::new("d").unwrap()
            ]
        );
    }

    #[test]
    fn cycle_rejected() {
        let snap = snapshot(
            vec![node("a"), node("b")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "a")],
        );
        let err = DependencyGraph::from_snapshot(&snap).unwrap_err();
        assert!(matches!(err, WorkflowError::Cycle(_)));
    }

    #[test]
    fn parallel_edges_collapse() {
        let snap = snapshot(
            vec![node("a"), node("b")],
            vec![edge("e1", "a", "b"), edge("e2", "a", "b")],
        );
        let graph = DependencyGraph::from_snapshot(&snap).unwrap();
        assert_eq!(
            graph.dependencies(&NodeKey::new("b").unwrap()),
            vec![NodeKey::new("a").unwrap()]
        );
    }

    #[test]
    fn isolated_node_is_entry_and_exit() {
        let snap = snapshot(vec![node("solo")], vec![]);
        let graph = DependencyGraph::from_snapshot(&snap).unwrap();
        assert_eq!(graph.entry_nodes(), vec![NodeKey::new("solo").unwrap()]);
        assert_eq!(graph.exit_nodes(), vec![NodeKey::new("solo").unwrap()]);
    }
}
