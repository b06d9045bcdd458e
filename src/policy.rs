// Copyright 2025 Cowboy AI, LLC.

//! Policy engine
//!
//! A pure decision function: `(actor, action, resource) -> Allow | Deny`.
//! Rules are evaluated in order and the first match wins:
//!
//! 1. Admins are allowed everything.
//! 2. Tenant mismatch denies with `"cross-tenant"`.
//! 3. An action-specific table (role, ownership, resource state).
//! 4. Default deny with `"no matching rule"`.
//!
//! The table is data, not code sprawl; it is testable as a matrix of
//! (role x action x state) -> bool.

use crate::context::TenantContext;
use crate::entity::{PrincipalId, ResourceClass, Role, Tenant, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Actions a principal can request against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read a record
    View,
    /// Create a new workflow entity
    Create,
    /// Update checklist items on an entity the actor owns
    UpdateItems,
    /// Open a work session
    Start,
    /// Mark an owned entity as completed
    Complete,
    /// Approve a completed entity (terminal review)
    Approve,
    /// Reject a completed entity (review with mandatory reason)
    Reject,
    /// Send a rejected control list back to pending
    Resubmit,
    /// Expire an overdue pending control list (time-based trigger)
    Expire,
    /// Delete a record
    Delete,
    /// Raise a principal's role
    Elevate,
}

impl Action {
    /// Stable name for logging and deny reasons
    pub fn name(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Create => "create",
            Self::UpdateItems => "update_items",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Resubmit => "resubmit",
            Self::Expire => "expire",
            Self::Delete => "delete",
            Self::Elevate => "elevate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stable deny reasons surfaced in [`Decision::Deny`]
pub mod deny {
    /// Principal and resource belong to different tenants
    pub const CROSS_TENANT: &str = "cross-tenant";
    /// No rule in the action table matched
    pub const NO_MATCHING_RULE: &str = "no matching rule";
    /// The action requires the manager role
    pub const REQUIRES_MANAGER: &str = "requires manager role";
    /// The resource is not in a reviewable state
    pub const NOT_REVIEWABLE: &str = "not in a reviewable state";
    /// The actor does not own the resource
    pub const NOT_OWNER: &str = "not the owner";
    /// The resource state does not permit operator edits
    pub const NOT_EDITABLE: &str = "state does not permit edits";
    /// The resource still has active dependents
    pub const ACTIVE_DEPENDENTS: &str = "has active dependents";
    /// Principals may not elevate or delete their own account
    pub const SELF_MODIFICATION: &str = "self-modification";
    /// The tenant has been deactivated
    pub const TENANT_DEACTIVATED: &str = "tenant deactivated";
}

/// Outcome of a policy decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The action is permitted
    Allow,
    /// The action is denied, with a stable reason
    Deny(String),
}

impl Decision {
    /// Whether the decision permits the action
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn deny(reason: &str) -> Self {
        Decision::Deny(reason.to_string())
    }
}

/// The policy engine's view of a resource
///
/// Workflow entities implement this directly; other record types (accounts,
/// event references) provide lightweight adapters.
pub trait ProtectedResource {
    /// Which resource class this record belongs to
    fn resource_class(&self) -> ResourceClass;

    /// Tenant owning the record; `None` for global records
    fn tenant_id(&self) -> Option<TenantId>;

    /// The operator principal that owns the record, if any
    fn owner_id(&self) -> Option<PrincipalId>;

    /// Whether a review transition (approve/reject) is currently legal
    fn is_reviewable(&self) -> bool {
        false
    }

    /// Whether the current state permits operator edits
    fn allows_operator_edit(&self) -> bool {
        false
    }

    /// Whether dependents still reference this record
    fn has_active_dependents(&self) -> bool {
        false
    }

    /// Whether this record is the given principal's own account
    fn is_account_of(&self, _principal: PrincipalId) -> bool {
        false
    }
}

/// Pure decision function over (actor, action, resource)
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Create a policy engine
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `ctx` may perform `action` on `resource`
    pub fn decide(
        &self,
        ctx: &TenantContext,
        action: Action,
        resource: &dyn ProtectedResource,
    ) -> Decision {
        // Rule 1: admin is superuser
        if ctx.is_admin() {
            return Decision::Allow;
        }

        // Rule 2: tenant isolation
        if resource.tenant_id().is_some() && ctx.tenant_id != resource.tenant_id() {
            return Decision::deny(deny::CROSS_TENANT);
        }

        // Rule 3: action table, self-modification guard first
        if matches!(action, Action::Delete | Action::Elevate)
            && resource.is_account_of(ctx.principal_id)
        {
            return Decision::deny(deny::SELF_MODIFICATION);
        }

        match action {
            Action::View | Action::Create => Decision::Allow,
            Action::Approve | Action::Reject => {
                if ctx.role != Role::Manager {
                    Decision::deny(deny::REQUIRES_MANAGER)
                } else if !resource.is_reviewable() {
                    Decision::deny(deny::NOT_REVIEWABLE)
                } else {
                    Decision::Allow
                }
            }
            Action::Start | Action::Complete | Action::UpdateItems => {
                if resource.owner_id() != Some(ctx.principal_id) {
                    Decision::deny(deny::NOT_OWNER)
                } else if !resource.allows_operator_edit() {
                    Decision::deny(deny::NOT_EDITABLE)
                } else {
                    Decision::Allow
                }
            }
            Action::Resubmit => {
                // Owners pick their rejected work back up; managers may do it
                // on their behalf.
                if ctx.role == Role::Manager || resource.owner_id() == Some(ctx.principal_id) {
                    Decision::Allow
                } else {
                    Decision::deny(deny::NOT_OWNER)
                }
            }
            Action::Expire => {
                if ctx.role == Role::Manager {
                    Decision::Allow
                } else {
                    Decision::deny(deny::REQUIRES_MANAGER)
                }
            }
            Action::Delete => {
                if ctx.role != Role::Manager {
                    Decision::deny(deny::REQUIRES_MANAGER)
                } else if resource.has_active_dependents() {
                    Decision::deny(deny::ACTIVE_DEPENDENTS)
                } else {
                    Decision::Allow
                }
            }
            Action::Elevate => Decision::deny(deny::NO_MATCHING_RULE),
        }
    }

    /// Gate on the tenant record itself
    ///
    /// Deactivated tenants are invisible to everyone but admins.
    pub fn tenant_gate(&self, ctx: &TenantContext, tenant: &Tenant) -> Decision {
        if ctx.is_admin() || tenant.active {
            Decision::Allow
        } else {
            Decision::deny(deny::TENANT_DEACTIVATED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Principal;

    struct TestResource {
        class: ResourceClass,
        tenant: Option<TenantId>,
        owner: Option<PrincipalId>,
        reviewable: bool,
        editable: bool,
        dependents: bool,
        account_of: Option<PrincipalId>,
    }

    impl TestResource {
        fn workflow(tenant: TenantId, owner: PrincipalId) -> Self {
            Self {
                class: ResourceClass::ControlLists,
                tenant: Some(tenant),
                owner: Some(owner),
                reviewable: false,
                editable: true,
                dependents: false,
                account_of: None,
            }
        }
    }

    impl ProtectedResource for TestResource {
        fn resource_class(&self) -> ResourceClass {
            self.class
        }
        fn tenant_id(&self) -> Option<TenantId> {
            self.tenant
        }
        fn owner_id(&self) -> Option<PrincipalId> {
            self.owner
        }
        fn is_reviewable(&self) -> bool {
            self.reviewable
        }
        fn allows_operator_edit(&self) -> bool {
            self.editable
        }
        fn has_active_dependents(&self) -> bool {
            self.dependents
        }
        fn is_account_of(&self, principal: PrincipalId) -> bool {
            self.account_of == Some(principal)
        }
    }

    fn ctx_for(principal: &Principal) -> TenantContext {
        TenantContext {
            principal_id: principal.id,
            tenant_id: principal.tenant_id,
            role: principal.role,
        }
    }

    #[test]
    fn test_admin_is_allowed_everything() {
        let admin = ctx_for(&Principal::global_admin());
        let resource = TestResource::workflow(TenantId::new(), PrincipalId::new());
        let engine = PolicyEngine::new();

        for action in [
            Action::View,
            Action::Approve,
            Action::Reject,
            Action::Complete,
            Action::Delete,
            Action::Expire,
        ] {
            assert!(
                engine.decide(&admin, action, &resource).is_allowed(),
                "admin denied {action}"
            );
        }
    }

    #[test]
    fn test_cross_tenant_denied_for_every_action() {
        let engine = PolicyEngine::new();
        let foreign = TestResource::workflow(TenantId::new(), PrincipalId::new());

        for role in [Role::Manager, Role::Operator] {
            let actor = ctx_for(&Principal::new(TenantId::new(), role));
            for action in [
                Action::View,
                Action::Approve,
                Action::Complete,
                Action::Delete,
                Action::UpdateItems,
            ] {
                let decision = engine.decide(&actor, action, &foreign);
                assert_eq!(
                    decision,
                    Decision::Deny(deny::CROSS_TENANT.to_string()),
                    "{role} {action} on foreign tenant"
                );
            }
        }
    }

    #[test]
    fn test_review_requires_manager_and_reviewable_state() {
        let engine = PolicyEngine::new();
        let tenant = TenantId::new();
        let manager = ctx_for(&Principal::new(tenant, Role::Manager));
        let operator = ctx_for(&Principal::new(tenant, Role::Operator));

        let mut resource = TestResource::workflow(tenant, PrincipalId::new());
        resource.reviewable = true;

        assert!(engine.decide(&manager, Action::Approve, &resource).is_allowed());
        assert_eq!(
            engine.decide(&operator, Action::Approve, &resource),
            Decision::Deny(deny::REQUIRES_MANAGER.to_string())
        );

        resource.reviewable = false;
        assert_eq!(
            engine.decide(&manager, Action::Approve, &resource),
            Decision::Deny(deny::NOT_REVIEWABLE.to_string())
        );
    }

    #[test]
    fn test_operator_edits_require_ownership_and_editable_state() {
        let engine = PolicyEngine::new();
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let other = Principal::new(tenant, Role::Operator);

        let mut resource = TestResource::workflow(tenant, owner.id);

        assert!(engine
            .decide(&ctx_for(&owner), Action::Complete, &resource)
            .is_allowed());
        assert_eq!(
            engine.decide(&ctx_for(&other), Action::Complete, &resource),
            Decision::Deny(deny::NOT_OWNER.to_string())
        );

        resource.editable = false;
        assert_eq!(
            engine.decide(&ctx_for(&owner), Action::UpdateItems, &resource),
            Decision::Deny(deny::NOT_EDITABLE.to_string())
        );
    }

    #[test]
    fn test_delete_manager_only_and_blocked_by_dependents() {
        let engine = PolicyEngine::new();
        let tenant = TenantId::new();
        let manager = ctx_for(&Principal::new(tenant, Role::Manager));
        let operator = ctx_for(&Principal::new(tenant, Role::Operator));

        let mut resource = TestResource::workflow(tenant, PrincipalId::new());
        assert!(engine.decide(&manager, Action::Delete, &resource).is_allowed());
        assert_eq!(
            engine.decide(&operator, Action::Delete, &resource),
            Decision::Deny(deny::REQUIRES_MANAGER.to_string())
        );

        resource.dependents = true;
        assert_eq!(
            engine.decide(&manager, Action::Delete, &resource),
            Decision::Deny(deny::ACTIVE_DEPENDENTS.to_string())
        );
    }

    #[test]
    fn test_self_modification_guard() {
        let engine = PolicyEngine::new();
        let tenant = TenantId::new();
        let manager = Principal::new(tenant, Role::Manager);

        let own_account = TestResource {
            class: ResourceClass::Accounts,
            tenant: Some(tenant),
            owner: None,
            reviewable: false,
            editable: false,
            dependents: false,
            account_of: Some(manager.id),
        };

        assert_eq!(
            engine.decide(&ctx_for(&manager), Action::Delete, &own_account),
            Decision::Deny(deny::SELF_MODIFICATION.to_string())
        );
        assert_eq!(
            engine.decide(&ctx_for(&manager), Action::Elevate, &own_account),
            Decision::Deny(deny::SELF_MODIFICATION.to_string())
        );
    }

    #[test]
    fn test_tenant_gate_hides_deactivated_tenants() {
        let engine = PolicyEngine::new();
        let mut tenant = Tenant::new("Acme Machining");
        let member = ctx_for(&Principal::new(tenant.id, Role::Manager));
        let admin = ctx_for(&Principal::global_admin());

        assert!(engine.tenant_gate(&member, &tenant).is_allowed());

        tenant.active = false;
        assert_eq!(
            engine.tenant_gate(&member, &tenant),
            Decision::Deny(deny::TENANT_DEACTIVATED.to_string())
        );
        assert!(engine.tenant_gate(&admin, &tenant).is_allowed());
    }

    /// The (role x action) matrix on a same-tenant, owned, editable,
    /// non-reviewable workflow entity.
    #[test]
    fn test_role_action_matrix() {
        let engine = PolicyEngine::new();
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let resource = TestResource::workflow(tenant, owner.id);
        let owner_ctx = ctx_for(&owner);
        let manager = ctx_for(&Principal::new(tenant, Role::Manager));

        let cases: &[(&TenantContext, Action, bool)] = &[
            (&owner_ctx, Action::View, true),
            (&owner_ctx, Action::Complete, true),
            (&owner_ctx, Action::UpdateItems, true),
            (&owner_ctx, Action::Approve, false),
            (&owner_ctx, Action::Delete, false),
            (&owner_ctx, Action::Expire, false),
            (&manager, Action::View, true),
            (&manager, Action::Complete, false),
            (&manager, Action::Approve, false), // not reviewable yet
            (&manager, Action::Delete, true),
            (&manager, Action::Expire, true),
            (&manager, Action::Resubmit, true),
        ];

        for (ctx, action, expected) in cases {
            assert_eq!(
                engine.decide(ctx, *action, &resource).is_allowed(),
                *expected,
                "{} {}",
                ctx.role,
                action
            );
        }
    }
}
