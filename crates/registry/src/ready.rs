//! Readiness detection.
//!
//! A host node is ready when the run is live, the node is queued, its retry
//! backoff has elapsed, and every incoming edge's source has succeeded with
//! the edge's source path resolving in that source's results. For hosts with
//! middleware chains, the ready unit is the next queued hop; the host itself
//! only becomes the unit once the cursor has walked the whole chain.

use chrono::{DateTime, Utc};
use meridian_core::NodeKey;
use serde_json::{Map, Value};

use crate::record::RunRecord;
use crate::status::NodeRunStatus;

/// A dispatchable unit: a host node or one middleware hop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyNode {
    /// The node (or middleware) to dispatch.
    pub node_id: NodeKey,
    /// The owning host, set whenever the host carries a middleware chain.
    pub host_node_id: Option<NodeKey>,
    /// Chain position when dispatching a middleware hop; absent for hosts.
    pub chain_index: Option<usize>,
    /// The host's full middleware chain (empty for plain nodes).
    pub middleware_chain: Vec<NodeKey>,
    /// Node type to execute.
    pub node_type: String,
    /// Implementation package name.
    pub package_name: String,
    /// Implementation package version.
    pub package_version: String,
    /// Effective parameters at readiness time.
    pub parameters: Map<String, Value>,
    /// Dispatch attempts already made for this unit.
    pub attempt: u32,
}

/// Collect every currently dispatchable unit of a run.
#[must_use]
pub fn collect_ready(record: &RunRecord, now: DateTime<Utc>) -> Vec<ReadyNode> {
    if record.is_finalised() {
        return Vec::new();
    }

    let mut ready = Vec::new();
    for spec in &record.workflow.nodes {
        let Some(state) = record.node(&spec.id) else {
            continue;
        };
        if state.status != NodeRunStatus::Queued || !state.backoff_elapsed(now) {
            continue;
        }
        if !inputs_satisfied(record, spec.id.as_str()) {
            continue;
        }

        let chain = &state.middleware_chain;
        if state.chain_cursor < chain.len() {
            let hop_id = &chain[state.chain_cursor];
            let Some(hop_state) = record.node(hop_id) else {
                continue;
            };
            // A running (or terminal) hop means the chain is in flight.
            if hop_state.status != NodeRunStatus::Queued || !hop_state.backoff_elapsed(now) {
                continue;
            }
            let Some(hop_spec) = spec.middleware(hop_id.as_str()) else {
                continue;
            };
            ready.push(ReadyNode {
                node_id: hop_id.clone(),
                host_node_id: Some(spec.id.clone()),
                chain_index: Some(state.chain_cursor),
                middleware_chain: chain.clone(),
                node_type: hop_spec.node_type.clone(),
                package_name: hop_spec.package.name.clone(),
                package_version: hop_spec.package.version.to_string(),
                parameters: hop_state.parameters.clone(),
                attempt: hop_state.attempt,
            });
        } else {
            ready.push(ReadyNode {
                node_id: spec.id.clone(),
                host_node_id: if chain.is_empty() {
                    None
                } else {
                    Some(spec.id.clone())
                },
                chain_index: None,
                middleware_chain: chain.clone(),
                node_type: spec.node_type.clone(),
                package_name: spec.package.name.clone(),
                package_version: spec.package.version.to_string(),
                parameters: state.parameters.clone(),
                attempt: state.attempt,
            });
        }
    }
    ready
}

/// Whether every incoming edge of `host` has a succeeded source whose
/// source path resolves.
fn inputs_satisfied(record: &RunRecord, host: &str) -> bool {
    for edge in record.workflow.edges_into(host) {
        let Some(source_state) = record.node(&edge.source.node) else {
            return false;
        };
        if source_state.status != NodeRunStatus::Succeeded {
            return false;
        }
        let Some(results) = &source_state.results else {
            return false;
        };
        let Some(source_spec) = record.workflow.node(edge.source.node.as_str()) else {
            return false;
        };
        let Some(port) = source_spec.output_port(&edge.source.port) else {
            return false;
        };
        if port.binding.path.resolve(results).is_none() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StartRunRequest;
    use meridian_core::{RunId, TenantId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn linear_request() -> StartRunRequest {
        serde_json::from_value(json!({
            "clientId": "c",
            "workflow": {
                "id": "wf",
                "schemaVersion": "2025-10",
                "metadata": {"name": "t", "namespace": "default", "originId": "wf"},
                "nodes": [
                    {
                        "id": "a",
                        "type": "example.pkg.source",
                        "package": {"name": "example.pkg", "version": "1.0.0"},
                        "status": "published", "category": "test", "label": "A",
                        "ui": {"outputPorts": [{"key": "out", "label": "O", "binding": {"path": "/results/value", "mode": "read"}}]}
                    },
                    {
                        "id": "b",
                        "type": "example.pkg.sink",
                        "package": {"name": "example.pkg", "version": "1.0.0"},
                        "status": "published", "category": "test", "label": "B",
                        "ui": {"inputPorts": [{"key": "in", "label": "I", "binding": {"path": "/parameters/v", "mode": "write"}}]}
                    }
                ],
                "edges": [
                    {"id": "e1", "source": {"node": "a", "port": "out"}, "target": {"node": "b", "port": "in"}}
                ]
            }
        }))
        .unwrap()
    }

    fn mw_request() -> StartRunRequest {
        serde_json::from_value(json!({
            "clientId": "c",
            "workflow": {
                "id": "wf",
                "schemaVersion": "2025-10",
                "metadata": {"name": "t", "namespace": "default", "originId": "wf"},
                "nodes": [
                    {
                        "id": "host",
                        "type": "example.pkg.host",
                        "package": {"name": "example.pkg", "version": "1.0.0"},
                        "status": "published", "category": "test", "label": "H",
                        "middlewares": [
                            {
                                "id": "m1", "type": "system.mw",
                                "package": {"name": "system", "version": "1.0.0"},
                                "status": "published", "category": "system", "label": "M1"
                            },
                            {
                                "id": "m2", "type": "system.mw",
                                "package": {"name": "system", "version": "1.0.0"},
                                "status": "published", "category": "system", "label": "M2"
                            }
                        ]
                    }
                ],
                "edges": []
            }
        }))
        .unwrap()
    }

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    #[test]
    fn entry_node_ready_immediately() {
        let record = RunRecord::create(RunId::v4(), &linear_request(), TenantId::v4()).unwrap();
        let ready = collect_ready(&record, Utc::now());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].node_id, key("a"));
        assert_eq!(ready[0].host_node_id, None);
        assert_eq!(ready[0].chain_index, None);
    }

    #[test]
    fn downstream_waits_for_source_result() {
        let mut record = RunRecord::create(RunId::v4(), &linear_request(), TenantId::v4()).unwrap();

        // Source succeeded but with a result missing the bound path.
        let a = record.node_mut(&key("a")).unwrap();
        a.status = NodeRunStatus::Succeeded;
        a.results = Some(json!({"other": 1}));

        let ready = collect_ready(&record, Utc::now());
        assert!(ready.is_empty());

        // Now the path resolves.
        let a = record.node_mut(&key("a")).unwrap();
        a.results = Some(json!({"value": 42}));
        let ready = collect_ready(&record, Utc::now());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].node_id, key("b"));
    }

    #[test]
    fn chain_emits_first_hop_before_host() {
        let record = RunRecord::create(RunId::v4(), &mw_request(), TenantId::v4()).unwrap();
        let ready = collect_ready(&record, Utc::now());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].node_id, key("m1"));
        assert_eq!(ready[0].host_node_id, Some(key("host")));
        assert_eq!(ready[0].chain_index, Some(0));
        assert_eq!(ready[0].middleware_chain, vec![key("m1"), key("m2")]);
    }

    #[test]
    fn in_flight_hop_blocks_chain() {
        let mut record = RunRecord::create(RunId::v4(), &mw_request(), TenantId::v4()).unwrap();
        record.node_mut(&key("m1")).unwrap().status = NodeRunStatus::Running;
        assert!(collect_ready(&record, Utc::now()).is_empty());
    }

    #[test]
    fn exhausted_cursor_emits_host() {
        let mut record = RunRecord::create(RunId::v4(), &mw_request(), TenantId::v4()).unwrap();
        for hop in ["m1", "m2"] {
            record.node_mut(&key(hop)).unwrap().status = NodeRunStatus::Succeeded;
        }
        record.node_mut(&key("host")).unwrap().chain_cursor = 2;

        let ready = collect_ready(&record, Utc::now());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].node_id, key("host"));
        assert_eq!(ready[0].host_node_id, Some(key("host")));
        assert_eq!(ready[0].chain_index, None);
    }

    #[test]
    fn finalised_run_emits_nothing() {
        let mut record = RunRecord::create(RunId::v4(), &linear_request(), TenantId::v4()).unwrap();
        record.status = crate::status::RunStatus::Cancelled;
        assert!(collect_ready(&record, Utc::now()).is_empty());
    }

    #[test]
    fn backoff_defers_readiness() {
        let mut record = RunRecord::create(RunId::v4(), &linear_request(), TenantId::v4()).unwrap();
        let now = Utc::now();
        record.node_mut(&key("a")).unwrap().not_before = Some(now + chrono::Duration::seconds(10));

        assert!(collect_ready(&record, now).is_empty());
        let later = now + chrono::Duration::seconds(11);
        assert_eq!(collect_ready(&record, later).len(), 1);
    }
}
