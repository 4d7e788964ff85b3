//! Workflow snapshot error types.

use meridian_core::NodeKey;
use thiserror::Error;

/// Errors raised while parsing or validating a workflow snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// Two nodes (or a node and a middleware) share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeKey),

    /// An edge references a node that does not exist.
    #[error("edge {edge} references unknown node: {node}")]
    UnknownNode {
        /// Offending edge id.
        edge: String,
        /// The missing node id.
        node: NodeKey,
    },

    /// An edge references a port its endpoint node does not declare.
    #[error("edge {edge} references unknown port {port} on node {node}")]
    UnknownPort {
        /// Offending edge id.
        edge: String,
        /// Endpoint node.
        node: NodeKey,
        /// The missing port key.
        port: String,
    },

    /// A `mw:<id>:input:<key>` target names a middleware absent from the host.
    #[error("edge {edge} targets middleware {middleware} not declared on host {host}")]
    UnknownMiddleware {
        /// Offending edge id.
        edge: String,
        /// Host node the edge targets.
        host: NodeKey,
        /// The missing middleware id.
        middleware: NodeKey,
    },

    /// A binding path has the wrong root for its side of the edge.
    #[error("binding path {path} must be rooted at /{expected}/")]
    WrongRoot {
        /// The offending path.
        path: String,
        /// The root required here (`results` or `parameters`).
        expected: &'static str,
    },

    /// A binding path failed to parse.
    #[error("malformed binding path: {0}")]
    MalformedPath(String),

    /// The data-flow graph contains a cycle.
    #[error("workflow graph contains a cycle through node {0}")]
    Cycle(NodeKey),

    /// A container node references a subgraph the snapshot does not carry.
    #[error("container {node} references unknown subgraph {subgraph}")]
    UnknownSubgraph {
        /// Offending container node.
        node: NodeKey,
        /// The missing subgraph id.
        subgraph: String,
    },

    /// The snapshot has no nodes.
    #[error("workflow has no nodes")]
    Empty,
}
