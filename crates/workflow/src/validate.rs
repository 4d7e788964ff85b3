//! Snapshot validation.
//!
//! Everything a snapshot must satisfy before a run is created. Validation
//! failures surface as `invalid_workflow` to the caller; no run record is
//! written.

use std::collections::HashSet;

use meridian_core::NodeKey;

use crate::error::WorkflowError;
use crate::graph::DependencyGraph;
use crate::handle::MiddlewareHandle;
use crate::path::BindingRoot;
use crate::snapshot::{BindingMode, NodeSpec, WorkflowSnapshot};

/// Validate a snapshot structurally.
///
/// Checks, in order: node presence, id uniqueness (hosts and middlewares,
/// recursing into subgraphs), port binding roots, edge endpoint existence,
/// middleware handle references, container subgraph references, and
/// acyclicity of the host-level graph.
pub fn validate_snapshot(snapshot: &WorkflowSnapshot) -> Result<(), WorkflowError> {
    if snapshot.nodes.is_empty() {
        return Err(WorkflowError::Empty);
    }

    let mut seen = HashSet::new();
    check_unique_ids(snapshot, &mut seen)?;

    for node in &snapshot.nodes {
        check_port_roots(node)?;
        for mw in &node.middlewares {
            check_port_roots(mw)?;
        }
        if let Some(container) = &node.container {
            if snapshot.subgraph(&container.subgraph_id).is_none() {
                return Err(WorkflowError::UnknownSubgraph {
                    node: node.id.clone(),
                    subgraph: container.subgraph_id.clone(),
                });
            }
        }
    }

    for edge in &snapshot.edges {
        check_edge(snapshot, edge)?;
    }

    DependencyGraph::from_snapshot(snapshot)?;

    for subgraph in &snapshot.subgraphs {
        validate_snapshot(&subgraph.definition)?;
    }

    Ok(())
}

fn check_unique_ids(
    snapshot: &WorkflowSnapshot,
    seen: &mut HashSet<NodeKey>,
) -> Result<(), WorkflowError> {
    for node in &snapshot.nodes {
        if !seen.insert(node.id.clone()) {
            return Err(WorkflowError::DuplicateNode(node.id.clone()));
        }
        for mw in &node.middlewares {
            if !seen.insert(mw.id.clone()) {
                return Err(WorkflowError::DuplicateNode(mw.id.clone()));
            }
        }
    }
    for subgraph in &snapshot.subgraphs {
        check_unique_ids(&subgraph.definition, seen)?;
    }
    Ok(())
}

fn check_port_roots(node: &NodeSpec) -> Result<(), WorkflowError> {
    let Some(ui) = &node.ui else { return Ok(()) };
    for port in &ui.output_ports {
        if port.binding.mode != BindingMode::Read || port.binding.path.root != BindingRoot::Results
        {
            return Err(WorkflowError::WrongRoot {
                path: port.binding.path.to_string(),
                expected: "results",
            });
        }
    }
    for port in &ui.input_ports {
        if port.binding.mode != BindingMode::Write
            || port.binding.path.root != BindingRoot::Parameters
        {
            return Err(WorkflowError::WrongRoot {
                path: port.binding.path.to_string(),
                expected: "parameters",
            });
        }
    }
    Ok(())
}

fn check_edge(snapshot: &WorkflowSnapshot, edge: &crate::snapshot::Edge) -> Result<(), WorkflowError> {
    let source = snapshot
        .node(edge.source.node.as_str())
        .ok_or_else(|| WorkflowError::UnknownNode {
            edge: edge.id.clone(),
            node: edge.source.node.clone(),
        })?;
    let target = snapshot
        .node(edge.target.node.as_str())
        .ok_or_else(|| WorkflowError::UnknownNode {
            edge: edge.id.clone(),
            node: edge.target.node.clone(),
        })?;

    if source.output_port(&edge.source.port).is_none() {
        return Err(WorkflowError::UnknownPort {
            edge: edge.id.clone(),
            node: source.id.clone(),
            port: edge.source.port.clone(),
        });
    }

    if let Some(handle) = MiddlewareHandle::parse(&edge.target.port) {
        let Some(mw) = target.middleware(handle.middleware.as_str()) else {
            return Err(WorkflowError::UnknownMiddleware {
                edge: edge.id.clone(),
                host: target.id.clone(),
                middleware: handle.middleware.clone(),
            });
        };
        if mw.input_port(handle.port.as_str()).is_none() {
            return Err(WorkflowError::UnknownPort {
                edge: edge.id.clone(),
                node: mw.id.clone(),
                port: handle.port.as_str().to_string(),
            });
        }
    } else if target.input_port(&edge.target.port).is_none() {
        return Err(WorkflowError::UnknownPort {
            edge: edge.id.clone(),
            node: target.id.clone(),
            port: edge.target.port.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        Edge, EdgeEndpoint, NodeUi, PackageRef, Port, PortBinding, WorkflowMetadata,
    };
    use crate::path::BindingPath;
    use meridian_core::PortKey;

    fn out_port(key: &str, path: &str) -> Port {
        Port {
            key: PortKey::new(key).unwrap(),
            label: key.to_uppercase(),
            binding: PortBinding {
                path: BindingPath::parse(path).unwrap(),
                mode: BindingMode::Read,
            },
        }
    }

    fn in_port(key: &str, path: &str) -> Port {
        Port {
            key: PortKey::new(key).unwrap(),
            label: key.to_uppercase(),
            binding: PortBinding {
                path: BindingPath::parse(path).unwrap(),
                mode: BindingMode::Write,
            },
        }
    }

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

    fn edge(id: &str, from: (&str, &str), to: (&str, &str)) -> Edge {
        Edge {
            id: id.into(),
            source: EdgeEndpoint {
                node: NodeKey::new(from.0).unwrap(),
                port: from.1.into(),
            },
            target: EdgeEndpoint {
                node: NodeKey::new(to.0).unwrap(),
                port: to.1.into(),
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

    fn linear() -> WorkflowSnapshot {
        let mut a = node("a");
        a.ui = Some(NodeUi {
            input_ports: vec![],
            output_ports: vec![out_port("out", "/results/value")],
        });
        let mut b = node("b");
        b.ui = Some(NodeUi {
            input_ports: vec![in_port("in", "/parameters/v")],
            output_ports: vec![],
        });
        snapshot(vec![a, b], vec![edge("e1", ("a", "out"), ("b", "in"))])
    }

    #[test]
    fn accepts_valid_snapshot() {
        assert!(validate_snapshot(&linear()).is_ok());
    }

    #[test]
    fn rejects_empty_snapshot() {
        let snap = snapshot(vec![], vec![]);
        assert_eq!(validate_snapshot(&snap).unwrap_err(), WorkflowError::Empty);
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let snap = snapshot(vec![node("a"), node("a")], vec![]);
        assert_eq!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::DuplicateNode(NodeKey::new("a").unwrap())
        );
    }

    #[test]
    fn rejects_middleware_id_colliding_with_node() {
        let mut host = node("host");
        host.middlewares.push(node("a"));
        let snap = snapshot(vec![node("a"), host], vec![]);
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::DuplicateNode(_)
        ));
    }

    #[test]
    fn rejects_edge_to_missing_node() {
        let mut snap = linear();
        snap.edges.push(edge("e2", ("a", "out"), ("ghost", "in")));
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::UnknownNode { .. }
        ));
    }

    #[test]
    fn rejects_edge_to_missing_port() {
        let mut snap = linear();
        snap.edges[0].target.port = "nope".into();
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::UnknownPort { .. }
        ));
    }

    #[test]
    fn rejects_handle_to_undeclared_middleware() {
        let mut snap = linear();
        snap.edges[0].target.port = "mw:ghost:input:times".into();
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::UnknownMiddleware { .. }
        ));
    }

    #[test]
    fn accepts_handle_to_declared_middleware() {
        let mut snap = linear();
        let mut mw = node("mw-1");
        mw.ui = Some(NodeUi {
            input_ports: vec![in_port("times", "/parameters/times")],
            output_ports: vec![],
        });
        snap.nodes[1].middlewares.push(mw);
        snap.edges[0].target.port = "mw:mw-1:input:times".into();
        assert!(validate_snapshot(&snap).is_ok());
    }

    #[test]
    fn rejects_output_port_rooted_at_parameters() {
        let mut snap = linear();
        snap.nodes[0].ui = Some(NodeUi {
            input_ports: vec![],
            output_ports: vec![Port {
                key: PortKey::new("out").unwrap(),
                label: "OUT".into(),
                binding: PortBinding {
                    path: BindingPath::parse("/parameters/value").unwrap(),
                    mode: BindingMode::Read,
                },
            }],
        });
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::WrongRoot { expected: "results", .. }
        ));
    }

    #[test]
    fn rejects_cycle() {
        let mut snap = linear();
        snap.nodes[1].ui.as_mut().unwrap().output_ports = vec![out_port("out", "/results/x")];
        snap.nodes[0].ui.as_mut().unwrap().input_ports = vec![in_port("in", "/parameters/x")];
        snap.edges.push(edge("e2", ("b", "out"), ("a", "in")));
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::Cycle(_)
        ));
    }

    #[test]
    fn rejects_container_with_unknown_subgraph() {
        let mut snap = linear();
        snap.nodes[0].container = Some(crate::snapshot::ContainerConfig {
            subgraph_id: "sg-missing".into(),
            loop_policy: None,
            retry_policy: None,
            timeout_seconds: None,
        });
        assert!(matches!(
            validate_snapshot(&snap).unwrap_err(),
            WorkflowError::UnknownSubgraph { .. }
        ));
    }
}
