//! Edge bindings — derived from graph edges and per-port bindings.
//!
//! Built once at run creation, indexed by source node so that completing a
//! node resolves its outgoing writes in O(deg).

use std::collections::HashMap;

use meridian_core::NodeKey;
use meridian_workflow::{BindingPath, MiddlewareHandle, WorkflowError, WorkflowSnapshot};
use smallvec::SmallVec;

/// A list of bindings fanning out of one source node.
pub type BindingList = SmallVec<[EdgeBinding; 2]>;

/// One derived edge binding: read `source_path` from the source node's
/// results, write it at `target_path` into the target's parameters.
///
/// `target_node` is the middleware id when the edge used a
/// `mw:<id>:input:<key>` handle, otherwise the host node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeBinding {
    /// Node whose results feed this binding.
    pub source_node: NodeKey,
    /// Path below `/results/` on the source.
    pub source_path: BindingPath,
    /// Node (or middleware) whose parameters receive the value.
    pub target_node: NodeKey,
    /// Path below `/parameters/` on the target.
    pub target_path: BindingPath,
}

/// Build the `source_node → [EdgeBinding]` index for a snapshot.
///
/// Assumes the snapshot already passed validation; missing ports still
/// surface as errors rather than silent drops.
pub fn build_edge_bindings(
    snapshot: &WorkflowSnapshot,
) -> Result<HashMap<NodeKey, BindingList>, WorkflowError> {
    let mut bindings: HashMap<NodeKey, BindingList> = HashMap::new();

    for edge in &snapshot.edges {
        let source =
            snapshot
                .node(edge.source.node.as_str())
                .ok_or_else(|| WorkflowError::UnknownNode {
                    edge: edge.id.clone(),
                    node: edge.source.node.clone(),
                })?;
        let source_port =
            source
                .output_port(&edge.source.port)
                .ok_or_else(|| WorkflowError::UnknownPort {
                    edge: edge.id.clone(),
                    node: source.id.clone(),
                    port: edge.source.port.clone(),
                })?;

        let host =
            snapshot
                .node(edge.target.node.as_str())
                .ok_or_else(|| WorkflowError::UnknownNode {
                    edge: edge.id.clone(),
                    node: edge.target.node.clone(),
                })?;

        let (target_node, target_port) = match MiddlewareHandle::parse(&edge.target.port) {
            Some(handle) => {
                let mw = host.middleware(handle.middleware.as_str()).ok_or_else(|| {
                    WorkflowError::UnknownMiddleware {
                        edge: edge.id.clone(),
                        host: host.id.clone(),
                        middleware: handle.middleware.clone(),
                    }
                })?;
                let port = mw.input_port(handle.port.as_str()).ok_or_else(|| {
                    WorkflowError::UnknownPort {
                        edge: edge.id.clone(),
                        node: mw.id.clone(),
                        port: handle.port.as_str().to_string(),
                    }
                })?;
                (mw.id.clone(), port)
            }
            None => {
                let port = host.input_port(&edge.target.port).ok_or_else(|| {
                    WorkflowError::UnknownPort {
                        edge: edge.id.clone(),
                        node: host.id.clone(),
                        port: edge.target.port.clone(),
                    }
                })?;
                (host.id.clone(), port)
            }
        };

        bindings
            .entry(source.id.clone())
            .or_default()
            .push(EdgeBinding {
                source_node: source.id.clone(),
                source_path: source_port.binding.path.clone(),
                target_node,
                target_path: target_port.binding.path.clone(),
            });
    }

    Ok(bindings)
}
