//! The immutable workflow snapshot.
//!
//! A snapshot is what `StartRun` carries: the full graph the run will
//! execute, frozen. Snapshot JSON is camelCase (`schemaVersion`,
//! `outputPorts`, `subgraphId`); node, edge, and middleware ids are
//! author-chosen strings.

use meridian_core::{NodeKey, PortKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::BindingPath;

/// Descriptive metadata attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    /// Display name.
    pub name: String,
    /// Namespace the workflow lives in.
    pub namespace: String,
    /// Identifier of the stored definition this snapshot was taken from.
    pub origin_id: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional environment label (e.g. `staging`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Optional tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// The package a node's implementation comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    /// Package name.
    pub name: String,
    /// Package version (semver).
    pub version: semver::Version,
}

impl PackageRef {
    /// The `name:version` form used in capability matching.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// How a port binds into its node's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    /// The port reads from the node's results.
    Read,
    /// The port writes into the node's parameters.
    Write,
}

/// A port's binding: where in the node's documents it points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Path rooted at `/results/…` (read) or `/parameters/…` (write).
    pub path: BindingPath,
    /// Read or write side.
    pub mode: BindingMode,
}

/// An input or output port on a node or middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port key, unique per side per node.
    pub key: PortKey,
    /// Display label.
    pub label: String,
    /// Document binding.
    pub binding: PortBinding,
}

/// Declared ports of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUi {
    /// Input ports (write bindings).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_ports: Vec<Port>,
    /// Output ports (read bindings).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_ports: Vec<Port>,
}

/// Loop policy of a container node's subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopPolicy {
    /// Whether loop execution is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum number of iterations to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Expression evaluated against container results/parameters to exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Retry policy applied when a container subgraph node fails.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Backoff delay in seconds between attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_seconds: Option<u64>,
}

/// Configuration of a container node running a subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    /// Identifier of the subgraph definition to run.
    pub subgraph_id: String,
    /// Loop policy.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "loop")]
    pub loop_policy: Option<LoopPolicy>,
    /// Retry policy.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "retry")]
    pub retry_policy: Option<RetryPolicy>,
    /// Wall-clock budget for one subgraph pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// One node of the graph. Middlewares reuse this shape (without position).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Author-chosen node id, unique within the snapshot.
    pub id: NodeKey,
    /// Node type, e.g. `example.pkg.source`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Implementation package.
    pub package: PackageRef,
    /// Catalog status of the node type (e.g. `published`).
    pub status: String,
    /// Catalog category.
    pub category: String,
    /// Display label.
    pub label: String,
    /// Canvas position. Middleware entries omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Seed parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Declared ports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<NodeUi>,
    /// Middleware chain executed before this node, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<NodeSpec>,
    /// Container configuration, when this node runs a subgraph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerConfig>,
    /// Whether the run may continue when this node fails.
    #[serde(default)]
    pub optional: bool,
}

impl NodeSpec {
    /// Declared output port with the given key.
    #[must_use]
    pub fn output_port(&self, key: &str) -> Option<&Port> {
        self.ui
            .as_ref()?
            .output_ports
            .iter()
            .find(|p| p.key.as_str() == key)
    }

    /// Declared input port with the given key.
    #[must_use]
    pub fn input_port(&self, key: &str) -> Option<&Port> {
        self.ui
            .as_ref()?
            .input_ports
            .iter()
            .find(|p| p.key.as_str() == key)
    }

    /// Middleware declared on this node with the given id.
    #[must_use]
    pub fn middleware(&self, id: &str) -> Option<&NodeSpec> {
        self.middlewares.iter().find(|m| m.id.as_str() == id)
    }
}

/// One end of an edge. The port is kept raw because target ports may use
/// the `mw:<id>:input:<key>` handle syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoint {
    /// Node the endpoint attaches to.
    pub node: NodeKey,
    /// Port key, or a middleware handle on the target side.
    pub port: String,
}

/// A data-flow edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id, unique within the snapshot.
    pub id: String,
    /// Source endpoint (an output port).
    pub source: EdgeEndpoint,
    /// Target endpoint (an input port or middleware handle).
    pub target: EdgeEndpoint,
}

/// A reusable localized snapshot referenced by container nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSubgraph {
    /// Stable identifier referenced by container nodes.
    pub id: String,
    /// Localized workflow snapshot backing this subgraph.
    pub definition: Box<WorkflowSnapshot>,
}

/// The immutable workflow snapshot carried by `StartRun`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    /// Workflow identifier (origin-scoped, author-chosen).
    pub id: String,
    /// Snapshot schema version.
    pub schema_version: String,
    /// Descriptive metadata.
    pub metadata: WorkflowMetadata,
    /// Nodes in author order.
    pub nodes: Vec<NodeSpec>,
    /// Data-flow edges.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Reusable subgraphs referenced by container nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subgraphs: Vec<WorkflowSubgraph>,
}

impl WorkflowSnapshot {
    /// Node with the given id, if present.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    /// Subgraph with the given id, if present.
    #[must_use]
    pub fn subgraph(&self, id: &str) -> Option<&WorkflowSubgraph> {
        self.subgraphs.iter().find(|s| s.id == id)
    }

    /// Edges whose source is the given node.
    pub fn edges_from(&self, node: &str) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source.node.as_str() == node)
    }

    /// Edges whose target is the given node.
    pub fn edges_into(&self, node: &str) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target.node.as_str() == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot_json() -> Value {
        json!({
            "id": "wf-1",
            "schemaVersion": "2025-10",
            "metadata": {
                "name": "demo",
                "namespace": "default",
                "originId": "wf-1"
            },
            "nodes": [
                {
                    "id": "source-node",
                    "type": "example.pkg.source",
                    "package": {"name": "example.pkg", "version": "1.0.0"},
                    "status": "published",
                    "category": "test",
                    "label": "Source",
                    "position": {"x": 0.0, "y": 0.0},
                    "ui": {
                        "outputPorts": [
                            {"key": "out", "label": "Out", "binding": {"path": "/results/value", "mode": "read"}}
                        ]
                    }
                },
                {
                    "id": "host-node",
                    "type": "example.pkg.host",
                    "package": {"name": "example.pkg", "version": "1.0.0"},
                    "status": "published",
                    "category": "test",
                    "label": "Host",
                    "position": {"x": 1.0, "y": 0.0},
                    "middlewares": [
                        {
                            "id": "mw-1",
                            "type": "system.loop_middleware",
                            "package": {"name": "system", "version": "1.0.0"},
                            "status": "published",
                            "category": "system",
                            "label": "Loop",
                            "parameters": {"times": 1},
                            "ui": {
                                "inputPorts": [
                                    {"key": "times", "label": "Times", "binding": {"path": "/parameters/times", "mode": "write"}}
                                ]
                            }
                        }
                    ]
                }
            ],
            "edges": [
                {
                    "id": "edge-1",
                    "source": {"node": "source-node", "port": "out"},
                    "target": {"node": "host-node", "port": "mw:mw-1:input:times"}
                }
            ]
        })
    }

    #[test]
    fn deserializes_camel_case_snapshot() {
        let snapshot: WorkflowSnapshot = serde_json::from_value(snapshot_json()).unwrap();
        assert_eq!(snapshot.id, "wf-1");
        assert_eq!(snapshot.schema_version, "2025-10");
        assert_eq!(snapshot.metadata.origin_id, "wf-1");
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
    }

    #[test]
    fn middleware_entries_parse_without_position() {
        let snapshot: WorkflowSnapshot = serde_json::from_value(snapshot_json()).unwrap();
        let host = snapshot.node("host-node").unwrap();
        let mw = host.middleware("mw-1").unwrap();
        assert!(mw.position.is_none());
        assert_eq!(mw.parameters.get("times"), Some(&json!(1)));
    }

    #[test]
    fn port_lookup() {
        let snapshot: WorkflowSnapshot = serde_json::from_value(snapshot_json()).unwrap();
        let source = snapshot.node("source-node").unwrap();
        let port = source.output_port("out").unwrap();
        assert_eq!(port.binding.mode, BindingMode::Read);
        assert_eq!(port.binding.path.to_string(), "/results/value");
        assert!(source.output_port("missing").is_none());
    }

    #[test]
    fn edge_iteration() {
        let snapshot: WorkflowSnapshot = serde_json::from_value(snapshot_json()).unwrap();
        assert_eq!(snapshot.edges_from("source-node").count(), 1);
        assert_eq!(snapshot.edges_into("host-node").count(), 1);
        assert_eq!(snapshot.edges_from("host-node").count(), 0);
    }

    #[test]
    fn package_qualified_form() {
        let package = PackageRef {
            name: "example.pkg".into(),
            version: semver::Version::new(1, 0, 0),
        };
        assert_eq!(package.qualified(), "example.pkg:1.0.0");
    }

    #[test]
    fn invalid_package_version_fails_parse() {
        let mut raw = snapshot_json();
        raw["nodes"][0]["package"]["version"] = json!("not-semver");
        assert!(serde_json::from_value::<WorkflowSnapshot>(raw).is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let snapshot: WorkflowSnapshot = serde_json::from_value(snapshot_json()).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: WorkflowSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
