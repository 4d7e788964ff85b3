//! Bearer-token authentication and role guards.

use axum::extract::FromRequestParts;
use http::request::Parts;
use meridian_core::Principal;
use meridian_error::{forbidden, unauthorized};

use crate::error::ApiError;
use crate::state::Core;

/// The authenticated principal, extracted from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub Principal);

impl FromRequestParts<Core> for AuthPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, core: &Core) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError(unauthorized("missing bearer token")))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError(unauthorized("malformed authorization header")))?;
        let principal = core
            .principals
            .resolve(token)
            .await
            .ok_or_else(|| ApiError(unauthorized("invalid bearer token")))?;
        Ok(Self(principal))
    }
}

/// Require one of `required` roles, or fail `forbidden`.
pub fn require_roles(principal: &Principal, required: &[&str]) -> Result<(), ApiError> {
    if principal.has_any_role(required) {
        Ok(())
    } else {
        Err(ApiError(forbidden(
            "insufficient role to perform this action",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{TenantId, UserId, roles};

    #[test]
    fn role_guard() {
        let viewer = Principal::new(
            UserId::v4(),
            TenantId::v4(),
            "viewer",
            vec![roles::RUN_VIEWER.to_string()],
        );
        assert!(require_roles(&viewer, roles::RUN_VIEW).is_ok());
        assert!(require_roles(&viewer, roles::RUN_MUTATE).is_err());
    }
}
