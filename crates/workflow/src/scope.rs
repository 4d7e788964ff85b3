//! Scope index: which container/subgraph scope each node belongs to.
//!
//! Top-level nodes live in the root scope. A container node's subgraph nodes
//! live in that container's scope; scopes nest when subgraphs contain further
//! containers. Middleware entries share their host's scope.

use indexmap::IndexMap;
use meridian_core::NodeKey;

use crate::snapshot::WorkflowSnapshot;

/// The scope a node executes in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeScope {
    /// Top level of the run's snapshot.
    Root,
    /// Inside the subgraph run by the given container node.
    Container {
        /// The container node owning the scope.
        container: NodeKey,
        /// The subgraph definition id.
        subgraph_id: String,
    },
}

impl NodeScope {
    /// Returns `true` for the root scope.
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

/// Node → scope mapping, computed once per snapshot before execution.
#[derive(Debug, Clone, Default)]
pub struct ScopeIndex {
    scopes: IndexMap<NodeKey, NodeScope>,
}

impl ScopeIndex {
    /// Build the index from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &WorkflowSnapshot) -> Self {
        let mut scopes = IndexMap::new();
        Self::index_level(snapshot, NodeScope::Root, &mut scopes);
        Self { scopes }
    }

    fn index_level(
        snapshot: &WorkflowSnapshot,
        scope: NodeScope,
        scopes: &mut IndexMap<NodeKey, NodeScope>,
    ) {
        for node in &snapshot.nodes {
            scopes.insert(node.id.clone(), scope.clone());
            for mw in &node.middlewares {
                scopes.insert(mw.id.clone(), scope.clone());
            }
            if let Some(container) = &node.container {
                if let Some(subgraph) = snapshot.subgraph(&container.subgraph_id) {
                    Self::index_level(
                        &subgraph.definition,
                        NodeScope::Container {
                            container: node.id.clone(),
                            subgraph_id: subgraph.id.clone(),
                        },
                        scopes,
                    );
                }
            }
        }
    }

    /// Scope of a node, if the node is known.
    #[must_use]
    pub fn scope(&self, node: &NodeKey) -> Option<&NodeScope> {
        self.scopes.get(node)
    }

    /// The container a node runs under, if any.
    #[must_use]
    pub fn container_of(&self, node: &NodeKey) -> Option<&NodeKey> {
        match self.scopes.get(node)? {
            NodeScope::Root => None,
            NodeScope::Container { container, .. } => Some(container),
        }
    }

    /// Number of indexed nodes (hosts + middlewares, all levels).
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        ContainerConfig, NodeSpec, PackageRef, WorkflowMetadata, WorkflowSnapshot,
        WorkflowSubgraph,
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
            label: id.into(),
            position: None,
            parameters: serde_json::Map::new(),
            ui: None,
            middlewares: Vec::new(),
            container: None,
            optional: false,
        }
    }

    fn snapshot(nodes: Vec<NodeSpec>, subgraphs: Vec<WorkflowSubgraph>) -> WorkflowSnapshot {
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
            edges: Vec::new(),
            subgraphs,
        }
    }

    #[test]
    fn top_level_nodes_are_root_scoped() {
        let index = ScopeIndex::from_snapshot(&snapshot(vec![node("a"), node("b")], vec![]));
        assert_eq!(index.len(), 2);
        assert!(index.scope(&NodeKey::new("a").unwrap()).unwrap().is_root());
        assert_eq!(index.container_of(&NodeKey::new("a").unwrap()), None);
    }

    #[test]
    fn middleware_shares_host_scope() {
        let mut host = node("host");
        host.middlewares.push(node("mw-1"));
        let index = ScopeIndex::from_snapshot(&snapshot(vec![host], vec![]));
        assert!(index.scope(&NodeKey::new("mw-1").unwrap()).unwrap().is_root());
    }

    #[test]
    fn subgraph_nodes_scoped_to_container() {
        let mut container = node("loop");
        container.container = Some(ContainerConfig {
            subgraph_id: "sg-1".into(),
            loop_policy: None,
            retry_policy: None,
            timeout_seconds: None,
        });
        let inner = snapshot(vec![node("inner")], vec![]);
        let snap = snapshot(
            vec![container],
            vec![WorkflowSubgraph {
                id: "sg-1".into(),
                definition: Box::new(inner),
            }],
        );

        let index = ScopeIndex::from_snapshot(&snap);
        assert_eq!(
            index.container_of(&NodeKey::new("inner").unwrap()),
            Some(&NodeKey::new("loop").unwrap())
        );
        match index.scope(&NodeKey::new("inner").unwrap()).unwrap() {
            NodeScope::Container { subgraph_id, .. } => assert_eq!(subgraph_id, "sg-1"),
            NodeScope::Root => panic!("expected container scope"),
        }
    }

    #[test]
    fn unknown_node_has_no_scope() {
        let index = ScopeIndex::from_snapshot(&snapshot(vec![node("a")], vec![]));
        assert_eq!(index.scope(&NodeKey::new("zzz").unwrap()), None);
    }
}
