// Copyright 2025 Cowboy AI, LLC.

//! Tenant context resolution
//!
//! Every request enters the engine through [`TenantContextResolver::resolve`],
//! which derives the acting principal's tenant and role from an authenticated
//! session. The resulting [`TenantContext`] is threaded explicitly through
//! every call; nothing downstream reads ambient or global state.

use crate::entity::{Principal, PrincipalId, Role, TenantId};
use crate::errors::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated session as handed over by the transport layer
///
/// Token issuance and verification are external collaborators; the engine
/// only sees the resolved principal and the session's expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated principal, if any
    pub principal: Option<Principal>,
    /// When the session stops being valid
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session for an authenticated principal, without expiry
    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            expires_at: None,
        }
    }

    /// An anonymous session
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            expires_at: None,
        }
    }

    /// Attach an expiry to this session
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// The acting principal's identity, tenant, and role for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Who is acting
    pub principal_id: PrincipalId,
    /// Tenant the principal belongs to; `None` only for admins
    pub tenant_id: Option<TenantId>,
    /// Primary role of the principal
    pub role: Role,
}

impl TenantContext {
    /// Whether the acting principal holds the admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Context for system-originated work such as the expiry sweep
    ///
    /// Scheduled triggers act as a global admin so they pass the policy
    /// engine's rule 1 while still flowing through the ordinary transition
    /// pipeline.
    pub fn system() -> Self {
        Self {
            principal_id: PrincipalId::new(),
            tenant_id: None,
            role: Role::Admin,
        }
    }
}

/// Derives the per-request [`TenantContext`] from a session
///
/// No side effects; failures are terminal for the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantContextResolver;

impl TenantContextResolver {
    /// Create a resolver
    pub fn new() -> Self {
        Self
    }

    /// Resolve a session into a tenant context
    ///
    /// Fails with [`WorkflowError::Unauthenticated`] when the session carries
    /// no principal or has expired, and with [`WorkflowError::TenantMissing`]
    /// when a non-admin principal has no tenant (an account configuration
    /// error, surfaced as 403 and never retried).
    pub fn resolve(&self, session: &Session, now: DateTime<Utc>) -> WorkflowResult<TenantContext> {
        let principal = session
            .principal
            .as_ref()
            .ok_or(WorkflowError::Unauthenticated)?;

        if let Some(expires_at) = session.expires_at {
            if expires_at <= now {
                return Err(WorkflowError::Unauthenticated);
            }
        }

        if principal.tenant_id.is_none() && !principal.is_admin() {
            return Err(WorkflowError::TenantMissing {
                principal_id: principal.id.to_string(),
            });
        }

        Ok(TenantContext {
            principal_id: principal.id,
            tenant_id: principal.tenant_id,
            role: principal.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Role;
    use chrono::Duration;

    #[test]
    fn test_resolves_tenant_bound_principal() {
        let tenant = TenantId::new();
        let principal = Principal::new(tenant, Role::Operator);
        let session = Session::authenticated(principal.clone());

        let ctx = TenantContextResolver::new()
            .resolve(&session, Utc::now())
            .expect("resolve");
        assert_eq!(ctx.principal_id, principal.id);
        assert_eq!(ctx.tenant_id, Some(tenant));
        assert_eq!(ctx.role, Role::Operator);
    }

    #[test]
    fn test_anonymous_session_is_unauthenticated() {
        let err = TenantContextResolver::new()
            .resolve(&Session::anonymous(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthenticated));
    }

    #[test]
    fn test_expired_session_is_unauthenticated() {
        let principal = Principal::new(TenantId::new(), Role::Manager);
        let now = Utc::now();
        let session = Session::authenticated(principal).expiring_at(now - Duration::minutes(1));

        let err = TenantContextResolver::new()
            .resolve(&session, now)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthenticated));
    }

    #[test]
    fn test_non_admin_without_tenant_is_rejected() {
        let principal = Principal {
            id: PrincipalId::new(),
            tenant_id: None,
            role: Role::Operator,
        };
        let session = Session::authenticated(principal);

        let err = TenantContextResolver::new()
            .resolve(&session, Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TenantMissing { .. }));
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn test_global_admin_resolves_without_tenant() {
        let session = Session::authenticated(Principal::global_admin());
        let ctx = TenantContextResolver::new()
            .resolve(&session, Utc::now())
            .expect("resolve");
        assert!(ctx.is_admin());
        assert!(ctx.tenant_id.is_none());
    }
}
