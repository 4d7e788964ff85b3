//! Stored workflow definitions.
//!
//! The core reads stored definitions only when an incoming snapshot refers
//! to one by origin id; persistence and CRUD live outside the core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::{UserId, WorkflowRecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored workflow definition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWorkflow {
    /// Storage identifier.
    pub id: WorkflowRecordId,
    /// Snapshot schema version the definition was stored under.
    pub schema_version: String,
    /// Namespace.
    pub namespace: String,
    /// Origin identifier snapshots reference.
    pub origin_id: String,
    /// The stored definition document.
    pub definition: Value,
    /// Owning user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Read surface over stored workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Look up a stored definition by origin id.
    async fn get_by_origin(&self, origin_id: &str) -> Option<StoredWorkflow>;
}

/// In-memory workflow definition store.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    by_origin: DashMap<String, StoredWorkflow>,
}

impl InMemoryWorkflowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a stored definition.
    pub fn upsert(&self, workflow: StoredWorkflow) {
        self.by_origin.insert(workflow.origin_id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get_by_origin(&self, origin_id: &str) -> Option<StoredWorkflow> {
        self.by_origin
            .get(origin_id)
            .map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stored(origin: &str) -> StoredWorkflow {
        let now = Utc::now();
        StoredWorkflow {
            id: WorkflowRecordId::v4(),
            schema_version: "2025-10".into(),
            namespace: "default".into(),
            origin_id: origin.into(),
            definition: serde_json::json!({"nodes": []}),
            owner_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let store = InMemoryWorkflowStore::new();
        store.upsert(stored("wf-1"));

        let found = store.get_by_origin("wf-1").await.unwrap();
        assert_eq!(found.origin_id, "wf-1");
        assert!(store.get_by_origin("wf-2").await.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces() {
        let store = InMemoryWorkflowStore::new();
        store.upsert(stored("wf-1"));
        let mut updated = stored("wf-1");
        updated.namespace = "team-a".into();
        store.upsert(updated);

        let found = store.get_by_origin("wf-1").await.unwrap();
        assert_eq!(found.namespace, "team-a");
    }
}
