// Copyright 2025 Cowboy AI, LLC.

//! The shared transition engine
//!
//! Both entity types run through [`WorkflowMachine::attempt`]: edge
//! validation, a per-transition policy re-check, review-field stamping, and
//! derived-field recomputation. Exactly one domain event is produced per
//! successful call and none on failure.

use crate::context::TenantContext;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::events::DomainEvent;
use crate::policy::{Action, Decision, PolicyEngine};
use crate::workflow::entity::{TransitionPayload, WorkflowEntity};
use crate::workflow::state::WorkflowStatus;
use chrono::{DateTime, Utc};

/// Validates and applies a single transition, producing the new entity and
/// its domain event
///
/// The machine never persists anything; the transition coordinator owns
/// locking and storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowMachine {
    policy: PolicyEngine,
}

impl WorkflowMachine {
    /// Create a machine
    pub fn new() -> Self {
        Self {
            policy: PolicyEngine::new(),
        }
    }

    /// Attempt a transition of `entity` to `requested`
    ///
    /// Returns the transitioned copy (version incremented) and the event to
    /// dispatch. The input entity is left untouched so a caller can roll
    /// back by simply not persisting the result.
    pub fn attempt<E: WorkflowEntity>(
        &self,
        entity: &E,
        requested: E::Status,
        ctx: &TenantContext,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> WorkflowResult<(E, DomainEvent)> {
        let current = entity.status();

        // Unknown edges are rejected for everyone, including admins.
        if current.is_terminal() || !current.can_transition_to(&requested) {
            return Err(WorkflowError::InvalidTransition {
                from: current.name().to_string(),
                to: requested.name().to_string(),
            });
        }

        let action = current
            .action_for(&requested)
            .ok_or_else(|| WorkflowError::InvalidTransition {
                from: current.name().to_string(),
                to: requested.name().to_string(),
            })?;

        // Re-check policy for this specific transition, not generic write
        // access.
        if let Decision::Deny(reason) = self.policy.decide(ctx, action, entity) {
            return Err(WorkflowError::PolicyDenied { reason });
        }

        let review_notes = payload
            .review_notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty());

        if action == Action::Reject && review_notes.is_none() {
            return Err(WorkflowError::ValidationFailed {
                field: "review_notes".to_string(),
                reason: "required".to_string(),
            });
        }

        let mut next = entity.clone();

        // Client payload only flows in through completion; reviews carry
        // notes, never data.
        if action == Action::Complete {
            next.apply_payload(payload);
        }

        next.set_status(requested);

        match action {
            Action::Approve => next.stamp_review(ctx.principal_id, now, review_notes),
            Action::Reject => next.stamp_review(ctx.principal_id, now, review_notes),
            Action::Resubmit => next.clear_review(),
            _ => {}
        }

        next.recompute_derived(now);
        next.touch(now);
        next.increment_version();

        let mut event = DomainEvent::transition(
            entity.entity_tenant(),
            E::class(),
            entity.entity_id(),
            current.name(),
            requested.name(),
            ctx.principal_id,
            now,
        )
        .with_metadata(
            "owner_id",
            serde_json::to_value(entity.entity_owner())?,
        )
        .with_metadata(
            "reference",
            serde_json::Value::String(entity.reference().to_string()),
        )
        .with_metadata(
            "priority",
            serde_json::to_value(entity.notification_priority())?,
        );

        if let Some(notes) = review_notes {
            event = event.with_metadata(
                "review_notes",
                serde_json::Value::String(notes.to_string()),
            );
        }

        Ok((next, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Principal, Role, TenantId};
    use crate::workflow::entity::{ControlItem, ControlList, WorkSession};
    use crate::workflow::state::{ControlListStatus, WorkSessionStatus};

    fn ctx_of(principal: &Principal) -> TenantContext {
        TenantContext {
            principal_id: principal.id,
            tenant_id: principal.tenant_id,
            role: principal.role,
        }
    }

    fn pending_list(tenant: TenantId, owner: &Principal) -> ControlList {
        ControlList::new(tenant, owner.id, "CL-100", "Daily press check", Utc::now()).with_items(
            vec![
                ControlItem::new("Oil level"),
                ControlItem::new("Emergency stop"),
            ],
        )
    }

    #[test]
    fn test_owner_completes_pending_list() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let list = pending_list(tenant, &owner);
        let machine = WorkflowMachine::new();

        let items = vec![
            ControlItem {
                label: "Oil level".to_string(),
                completed: true,
            },
            ControlItem {
                label: "Emergency stop".to_string(),
                completed: true,
            },
        ];
        let payload = TransitionPayload::new().with_items(items);
        let (next, event) = machine
            .attempt(
                &list,
                ControlListStatus::Completed,
                &ctx_of(&owner),
                &payload,
                Utc::now(),
            )
            .expect("transition");

        assert_eq!(next.status, ControlListStatus::Completed);
        assert_eq!(next.completion_percent, 100.0);
        assert_eq!(next.version, list.version + 1);
        assert!(next.reviewer_id.is_none());
        assert!(next.completed_at.is_some());
        assert_eq!(event.event_type, "control_lists.completed");
        assert_eq!(event.old_status, "pending");
    }

    #[test]
    fn test_unknown_edge_rejected_even_for_admin() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let mut list = pending_list(tenant, &owner);
        list.status = ControlListStatus::Approved;

        let admin = Principal::global_admin();
        let err = WorkflowMachine::new()
            .attempt(
                &list,
                ControlListStatus::Pending,
                &ctx_of(&admin),
                &TransitionPayload::new(),
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_approve_stamps_reviewer() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let manager = Principal::new(tenant, Role::Manager);
        let mut list = pending_list(tenant, &owner);
        list.status = ControlListStatus::Completed;

        let (next, event) = WorkflowMachine::new()
            .attempt(
                &list,
                ControlListStatus::Approved,
                &ctx_of(&manager),
                &TransitionPayload::new(),
                Utc::now(),
            )
            .expect("approve");

        assert_eq!(next.status, ControlListStatus::Approved);
        assert_eq!(next.reviewer_id, Some(manager.id));
        assert!(next.reviewed_at.is_some());
        assert_eq!(event.event_type, "control_lists.approved");
    }

    #[test]
    fn test_reject_without_reason_is_validation_error() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let manager = Principal::new(tenant, Role::Manager);
        let mut list = pending_list(tenant, &owner);
        list.status = ControlListStatus::Completed;

        for payload in [
            TransitionPayload::new(),
            TransitionPayload::new().with_review_notes(""),
            TransitionPayload::new().with_review_notes("   "),
        ] {
            let err = WorkflowMachine::new()
                .attempt(
                    &list,
                    ControlListStatus::Rejected,
                    &ctx_of(&manager),
                    &payload,
                    Utc::now(),
                )
                .unwrap_err();
            assert!(
                matches!(err, WorkflowError::ValidationFailed { ref field, .. } if field == "review_notes")
            );
        }
    }

    #[test]
    fn test_reject_requires_reason_even_for_admin() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let mut list = pending_list(tenant, &owner);
        list.status = ControlListStatus::Completed;

        let err = WorkflowMachine::new()
            .attempt(
                &list,
                ControlListStatus::Rejected,
                &ctx_of(&Principal::global_admin()),
                &TransitionPayload::new(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationFailed { .. }));
    }

    #[test]
    fn test_operator_cannot_approve() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let mut list = pending_list(tenant, &owner);
        list.status = ControlListStatus::Completed;

        let err = WorkflowMachine::new()
            .attempt(
                &list,
                ControlListStatus::Approved,
                &ctx_of(&owner),
                &TransitionPayload::new(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PolicyDenied { .. }));
    }

    #[test]
    fn test_resubmit_clears_review_fields() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let manager = Principal::new(tenant, Role::Manager);
        let mut list = pending_list(tenant, &owner);
        list.status = ControlListStatus::Rejected;
        list.reviewer_id = Some(manager.id);
        list.reviewed_at = Some(Utc::now());
        list.review_notes = Some("guard missing".to_string());
        list.completed_at = Some(Utc::now());

        let (next, event) = WorkflowMachine::new()
            .attempt(
                &list,
                ControlListStatus::Pending,
                &ctx_of(&owner),
                &TransitionPayload::new(),
                Utc::now(),
            )
            .expect("resubmit");

        assert_eq!(next.status, ControlListStatus::Pending);
        assert!(next.reviewer_id.is_none());
        assert!(next.review_notes.is_none());
        assert!(next.completed_at.is_none());
        assert_eq!(event.event_type, "control_lists.pending");
    }

    #[test]
    fn test_session_completion_computes_duration() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let start = Utc::now();
        let session = WorkSession::start(tenant, owner.id, "WS-7", start);

        let end = start + chrono::Duration::minutes(42);
        let (next, event) = WorkflowMachine::new()
            .attempt(
                &session,
                WorkSessionStatus::Completed,
                &ctx_of(&owner),
                &TransitionPayload::new().with_ended_at(end),
                end,
            )
            .expect("complete");

        assert_eq!(next.duration_minutes, Some(42));
        assert_eq!(event.event_type, "work_sessions.completed");
    }

    #[test]
    fn test_failure_produces_no_state_change() {
        let tenant = TenantId::new();
        let owner = Principal::new(tenant, Role::Operator);
        let list = pending_list(tenant, &owner);
        let before = list.clone();

        let _ = WorkflowMachine::new().attempt(
            &list,
            ControlListStatus::Approved,
            &ctx_of(&owner),
            &TransitionPayload::new(),
            Utc::now(),
        );

        assert_eq!(list, before);
    }
}
