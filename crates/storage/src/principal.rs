//! Principal resolution from bearer tokens.
//!
//! Authentication itself (JWT issuance, password hashing) is outside the
//! core; the control plane only needs to turn a presented bearer token into
//! an authenticated [`Principal`] with roles.

use async_trait::async_trait;
use dashmap::DashMap;
use meridian_core::Principal;

/// Bearer token → principal lookup.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Resolve a bearer token. `None` means unauthenticated.
    async fn resolve(&self, token: &str) -> Option<Principal>;
}

/// In-memory token table.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    tokens: DashMap<String, Principal>,
}

impl InMemoryPrincipalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a principal.
    pub fn insert(&self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    /// Remove a token.
    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn resolve(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{TenantId, UserId, roles};

    fn admin() -> Principal {
        Principal::new(
            UserId::v4(),
            TenantId::v4(),
            "admin",
            vec![roles::ADMIN.to_string()],
        )
    }

    #[tokio::test]
    async fn resolve_known_token() {
        let store = InMemoryPrincipalStore::new();
        store.insert("tok-1", admin());

        let principal = store.resolve("tok-1").await.unwrap();
        assert_eq!(principal.name, "admin");
        assert!(principal.has_any_role(roles::AUDIT_VIEW));
    }

    #[tokio::test]
    async fn unknown_token_is_none() {
        let store = InMemoryPrincipalStore::new();
        assert!(store.resolve("nope").await.is_none());
    }

    #[tokio::test]
    async fn revoked_token_is_none() {
        let store = InMemoryPrincipalStore::new();
        store.insert("tok-1", admin());
        store.revoke("tok-1");
        assert!(store.resolve("tok-1").await.is_none());
    }
}
