//! Dispatch request construction and middleware-chain validation.

use meridian_core::{DispatchId, RunId, TaskId, TenantId};
use meridian_protocol::{DispatchPayload, NextErrorCode};
use meridian_registry::ReadyNode;

/// Build the dispatch payload for a ready unit.
///
/// `seq` starts at zero; the session stamps the real value when the frame
/// is sent.
#[must_use]
pub fn build_dispatch(
    run_id: RunId,
    tenant: TenantId,
    unit: &ReadyNode,
    task_id: TaskId,
    dispatch_id: DispatchId,
) -> DispatchPayload {
    let lane = unit.host_node_id.as_ref().unwrap_or(&unit.node_id);
    // An `affinity` parameter pins the unit to a worker queue.
    let affinity = unit
        .parameters
        .get("affinity")
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    DispatchPayload {
        run_id,
        tenant,
        node_id: unit.node_id.clone(),
        task_id,
        node_type: unit.node_type.clone(),
        package_name: unit.package_name.clone(),
        package_version: unit.package_version.clone(),
        parameters: unit.parameters.clone(),
        resource_refs: None,
        affinity,
        concurrency_key: format!("{run_id}:{lane}"),
        seq: 0,
        dispatch_id,
        host_node_id: unit.host_node_id.clone(),
        middleware_chain: unit.middleware_chain.clone(),
        chain_index: unit.chain_index,
    }
}

/// Enforce the middleware dispatch invariants before send.
///
/// Host dispatch: `node_id == host_node_id` and no `chain_index`.
/// Middleware dispatch: host set, chain non-empty, index in range, and the
/// indexed hop names this node.
pub fn validate_chain(payload: &DispatchPayload) -> Result<(), NextErrorCode> {
    match payload.chain_index {
        None => {
            if let Some(host) = &payload.host_node_id {
                if *host != payload.node_id {
                    return Err(NextErrorCode::NextInvalidChain);
                }
            }
            Ok(())
        }
        Some(index) => {
            if payload.host_node_id.is_none() {
                return Err(NextErrorCode::NextInvalidChain);
            }
            if payload.middleware_chain.is_empty() {
                return Err(NextErrorCode::NextNoChain);
            }
            if index >= payload.middleware_chain.len() {
                return Err(NextErrorCode::NextInvalidChain);
            }
            if payload.middleware_chain[index] != payload.node_id {
                return Err(NextErrorCode::NextInvalidChain);
            }
            Ok(())
        }
    }
}
