//! Authenticated principal and role checks.
//!
//! The principal is threaded explicitly through every operation that needs
//! it; there is no ambient request context.

use serde::{Deserialize, Serialize};

use crate::id::{TenantId, UserId};

/// Well-known role names and the role sets required per capability.
pub mod roles {
    /// Full administrative access.
    pub const ADMIN: &str = "admin";
    /// May start, cancel, and edit workflows and runs.
    pub const WORKFLOW_EDITOR: &str = "workflow.editor";
    /// May view workflows.
    pub const WORKFLOW_VIEWER: &str = "workflow.viewer";
    /// May view runs and workers.
    pub const RUN_VIEWER: &str = "run.viewer";

    /// Roles allowed to view runs and workers.
    pub const RUN_VIEW: &[&str] = &[ADMIN, RUN_VIEWER];
    /// Roles allowed to start/cancel runs and send worker commands.
    pub const RUN_MUTATE: &[&str] = &[ADMIN, WORKFLOW_EDITOR];
    /// Roles allowed to view audit events.
    pub const AUDIT_VIEW: &[&str] = &[ADMIN];
}

/// An authenticated caller and its granted roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier of the user this principal authenticates.
    pub user_id: UserId,
    /// Tenant the principal acts on behalf of.
    pub tenant: TenantId,
    /// Human-readable account name.
    pub name: String,
    /// Granted role names.
    pub roles: Vec<String>,
}

impl Principal {
    /// Create a principal with the given roles.
    #[must_use]
    pub fn new(
        user_id: UserId,
        tenant: TenantId,
        name: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            user_id,
            tenant,
            name: name.into(),
            roles,
        }
    }

    /// Returns `true` if the principal holds at least one of `required`.
    #[must_use]
    pub fn has_any_role(&self, required: &[&str]) -> bool {
        self.roles.iter().any(|r| required.contains(&r.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[&str]) -> Principal {
        Principal::new(
            UserId::v4(),
            TenantId::v4(),
            "tester",
            roles.iter().map(|r| (*r).to_string()).collect(),
        )
    }

    #[test]
    fn admin_satisfies_every_role_set() {
        let p = principal(&[roles::ADMIN]);
        assert!(p.has_any_role(roles::RUN_VIEW));
        assert!(p.has_any_role(roles::RUN_MUTATE));
        assert!(p.has_any_role(roles::AUDIT_VIEW));
    }

    #[test]
    fn viewer_cannot_mutate() {
        let p = principal(&[roles::RUN_VIEWER]);
        assert!(p.has_any_role(roles::RUN_VIEW));
        assert!(!p.has_any_role(roles::RUN_MUTATE));
    }

    #[test]
    fn no_roles_denied_everywhere() {
        let p = principal(&[]);
        assert!(!p.has_any_role(roles::RUN_VIEW));
        assert!(!p.has_any_role(roles::AUDIT_VIEW));
    }

    #[test]
    fn serde_roundtrip() {
        let p = principal(&[roles::WORKFLOW_EDITOR]);
        let json = serde_json::to_string(&p).unwrap();
        let back: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
