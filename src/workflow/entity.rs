// Copyright 2025 Cowboy AI, LLC.

//! Control lists and work sessions
//!
//! Both entity types share the [`WorkflowEntity`] contract: identity, tenant,
//! owner, review stamps, and an optimistic-concurrency version incremented on
//! every transition. They are mutated only through the transition
//! coordinator; derived fields are recomputed inside the transition and never
//! trusted from client input.

use crate::entity::{EntityId, PrincipalId, ResourceClass, TenantId};
use crate::policy::ProtectedResource;
use crate::workflow::state::{ControlListStatus, WorkSessionStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Marker type for control list IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlListMarker;

/// Marker type for work session IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkSessionMarker;

/// Typed ID of a control list
pub type ControlListId = EntityId<ControlListMarker>;

/// Typed ID of a work session
pub type WorkSessionId = EntityId<WorkSessionMarker>;

/// Urgency of a control list, mapped to a dispatch queue class for its
/// notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background housekeeping
    Low,
    /// Default
    Normal,
    /// Time-sensitive
    High,
    /// Safety-relevant
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// One line item on a control list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlItem {
    /// What is checked
    pub label: String,
    /// Whether the operator ticked it
    pub completed: bool,
}

impl ControlItem {
    /// A fresh, unticked item
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            completed: false,
        }
    }
}

/// Client-supplied extras accompanying a transition request
///
/// Only the fields relevant to the requested transition are read; derived
/// values (completion percentage, duration) are always recomputed
/// server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Reviewer notes; mandatory and non-empty for rejections
    pub review_notes: Option<String>,
    /// Updated checklist items submitted with a completion
    pub items: Option<Vec<ControlItem>>,
    /// When the work session actually ended
    pub ended_at: Option<DateTime<Utc>>,
    /// The version the client read; a stale value surfaces a conflict
    /// instead of silently acting on newer state
    pub expected_version: Option<u64>,
}

impl TransitionPayload {
    /// An empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach reviewer notes
    pub fn with_review_notes(mut self, notes: impl Into<String>) -> Self {
        self.review_notes = Some(notes.into());
        self
    }

    /// Attach updated checklist items
    pub fn with_items(mut self, items: Vec<ControlItem>) -> Self {
        self.items = Some(items);
        self
    }

    /// Attach the session end time
    pub fn with_ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    /// Attach the version the client read
    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Shared contract of entities governed by the workflow state machine
pub trait WorkflowEntity: Clone + Debug + Send + Sync + ProtectedResource + 'static {
    /// The status enumeration for this entity type
    type Status: WorkflowStatus;

    /// Opaque identity
    fn entity_id(&self) -> Uuid;

    /// Tenant-scoped natural key
    fn reference(&self) -> &str;

    /// Owning tenant
    fn entity_tenant(&self) -> TenantId;

    /// The operator principal that owns this entity
    fn entity_owner(&self) -> PrincipalId;

    /// Current lifecycle status
    fn status(&self) -> Self::Status;

    /// Set the lifecycle status (coordinator/machine use only)
    fn set_status(&mut self, status: Self::Status);

    /// Optimistic-concurrency token
    fn version(&self) -> u64;

    /// Bump the concurrency token
    fn increment_version(&mut self);

    /// Resource class of this entity type
    fn class() -> ResourceClass;

    /// Entity type name for error messages
    fn entity_type() -> &'static str;

    /// Stamp the review fields on approve/reject
    fn stamp_review(&mut self, reviewer: PrincipalId, at: DateTime<Utc>, notes: Option<&str>);

    /// Clear review fields on revert-to-resubmit
    fn clear_review(&mut self);

    /// Fold client-supplied payload fields into the entity
    fn apply_payload(&mut self, payload: &TransitionPayload);

    /// Recompute derived fields after a status change
    fn recompute_derived(&mut self, now: DateTime<Utc>);

    /// Update the modification timestamp
    fn touch(&mut self, now: DateTime<Utc>);

    /// Urgency of notifications about this entity
    fn notification_priority(&self) -> Priority {
        Priority::Normal
    }
}

/// A checklist an operator fills against a machine, reviewed by a manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlList {
    /// Opaque identity
    pub id: ControlListId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Tenant-scoped natural key, e.g. `CL-2025-0042`
    pub reference: String,
    /// Short human title
    pub title: String,
    /// The operator that owns this list
    pub owner_id: PrincipalId,
    /// Lifecycle status
    pub status: ControlListStatus,
    /// Urgency, drives notification queue class
    pub priority: Priority,
    /// The checklist itself
    pub items: Vec<ControlItem>,
    /// When the list is due
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the operator completed it
    pub completed_at: Option<DateTime<Utc>>,
    /// Derived: percentage of ticked items, recomputed on transition
    pub completion_percent: f32,
    /// Reviewing manager, set on approve/reject
    pub reviewer_id: Option<PrincipalId>,
    /// When the review happened
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Reviewer notes; the rejection reason when rejected
    pub review_notes: Option<String>,
    /// Count of work sessions still referencing this list
    pub open_sessions: u32,
    /// Optimistic-concurrency token
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl ControlList {
    /// Create a pending control list owned by an operator
    pub fn new(
        tenant_id: TenantId,
        owner_id: PrincipalId,
        reference: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ControlListId::new(),
            tenant_id,
            reference: reference.into(),
            title: title.into(),
            owner_id,
            status: ControlListStatus::Pending,
            priority: Priority::Normal,
            items: Vec::new(),
            scheduled_at: None,
            completed_at: None,
            completion_percent: 0.0,
            reviewer_id: None,
            reviewed_at: None,
            review_notes: None,
            open_sessions: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the checklist items
    pub fn with_items(mut self, items: Vec<ControlItem>) -> Self {
        self.items = items;
        self.completion_percent = Self::percent_of(&self.items);
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the due date
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Whether the due date has passed without the list leaving `pending`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ControlListStatus::Pending
            && self.scheduled_at.is_some_and(|due| due < now)
    }

    fn percent_of(items: &[ControlItem]) -> f32 {
        if items.is_empty() {
            return 0.0;
        }
        let done = items.iter().filter(|i| i.completed).count();
        (done as f32 / items.len() as f32 * 10_000.0).round() / 100.0
    }
}

impl ProtectedResource for ControlList {
    fn resource_class(&self) -> ResourceClass {
        ResourceClass::ControlLists
    }

    fn tenant_id(&self) -> Option<TenantId> {
        Some(self.tenant_id)
    }

    fn owner_id(&self) -> Option<PrincipalId> {
        Some(self.owner_id)
    }

    fn is_reviewable(&self) -> bool {
        self.status.is_reviewable()
    }

    fn allows_operator_edit(&self) -> bool {
        self.status.allows_operator_edit()
    }

    fn has_active_dependents(&self) -> bool {
        self.open_sessions > 0
    }
}

impl WorkflowEntity for ControlList {
    type Status = ControlListStatus;

    fn entity_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn reference(&self) -> &str {
        &self.reference
    }

    fn entity_tenant(&self) -> TenantId {
        self.tenant_id
    }

    fn entity_owner(&self) -> PrincipalId {
        self.owner_id
    }

    fn status(&self) -> Self::Status {
        self.status
    }

    fn set_status(&mut self, status: Self::Status) {
        self.status = status;
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn increment_version(&mut self) {
        self.version += 1;
    }

    fn class() -> ResourceClass {
        ResourceClass::ControlLists
    }

    fn entity_type() -> &'static str {
        "ControlList"
    }

    fn stamp_review(&mut self, reviewer: PrincipalId, at: DateTime<Utc>, notes: Option<&str>) {
        self.reviewer_id = Some(reviewer);
        self.reviewed_at = Some(at);
        self.review_notes = notes.map(str::to_string);
    }

    fn clear_review(&mut self) {
        self.reviewer_id = None;
        self.reviewed_at = None;
        self.review_notes = None;
    }

    fn apply_payload(&mut self, payload: &TransitionPayload) {
        if let Some(items) = &payload.items {
            self.items = items.clone();
        }
    }

    fn recompute_derived(&mut self, now: DateTime<Utc>) {
        self.completion_percent = Self::percent_of(&self.items);
        match self.status {
            ControlListStatus::Completed if self.completed_at.is_none() => {
                self.completed_at = Some(now);
            }
            // Resubmitted lists are completed again later
            ControlListStatus::Pending => {
                self.completed_at = None;
            }
            _ => {}
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn notification_priority(&self) -> Priority {
        self.priority
    }
}

/// A timed span of operator work on a machine, reviewed by a manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSession {
    /// Opaque identity
    pub id: WorkSessionId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Tenant-scoped natural key, e.g. `WS-2025-0107`
    pub reference: String,
    /// Control list this session executes, if any
    pub control_list_id: Option<ControlListId>,
    /// The operator running the session
    pub owner_id: PrincipalId,
    /// Lifecycle status
    pub status: WorkSessionStatus,
    /// When work started
    pub started_at: DateTime<Utc>,
    /// When work ended
    pub ended_at: Option<DateTime<Utc>>,
    /// Derived: elapsed minutes, recomputed on completion
    pub duration_minutes: Option<i64>,
    /// Reviewing manager, set on approve/reject
    pub reviewer_id: Option<PrincipalId>,
    /// When the review happened
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Reviewer notes; the rejection reason when rejected
    pub review_notes: Option<String>,
    /// Optimistic-concurrency token
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    /// Open a session for an operator, starting now
    pub fn start(
        tenant_id: TenantId,
        owner_id: PrincipalId,
        reference: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkSessionId::new(),
            tenant_id,
            reference: reference.into(),
            control_list_id: None,
            owner_id,
            status: WorkSessionStatus::InProgress,
            started_at,
            ended_at: None,
            duration_minutes: None,
            reviewer_id: None,
            reviewed_at: None,
            review_notes: None,
            version: 0,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    /// Link the session to the control list it executes
    pub fn for_control_list(mut self, id: ControlListId) -> Self {
        self.control_list_id = Some(id);
        self
    }
}

impl ProtectedResource for WorkSession {
    fn resource_class(&self) -> ResourceClass {
        ResourceClass::WorkSessions
    }

    fn tenant_id(&self) -> Option<TenantId> {
        Some(self.tenant_id)
    }

    fn owner_id(&self) -> Option<PrincipalId> {
        Some(self.owner_id)
    }

    fn is_reviewable(&self) -> bool {
        self.status.is_reviewable()
    }

    fn allows_operator_edit(&self) -> bool {
        self.status.allows_operator_edit()
    }
}

impl WorkflowEntity for WorkSession {
    type Status = WorkSessionStatus;

    fn entity_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn reference(&self) -> &str {
        &self.reference
    }

    fn entity_tenant(&self) -> TenantId {
        self.tenant_id
    }

    fn entity_owner(&self) -> PrincipalId {
        self.owner_id
    }

    fn status(&self) -> Self::Status {
        self.status
    }

    fn set_status(&mut self, status: Self::Status) {
        self.status = status;
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn increment_version(&mut self) {
        self.version += 1;
    }

    fn class() -> ResourceClass {
        ResourceClass::WorkSessions
    }

    fn entity_type() -> &'static str {
        "WorkSession"
    }

    fn stamp_review(&mut self, reviewer: PrincipalId, at: DateTime<Utc>, notes: Option<&str>) {
        self.reviewer_id = Some(reviewer);
        self.reviewed_at = Some(at);
        self.review_notes = notes.map(str::to_string);
    }

    fn clear_review(&mut self) {
        self.reviewer_id = None;
        self.reviewed_at = None;
        self.review_notes = None;
    }

    fn apply_payload(&mut self, payload: &TransitionPayload) {
        if let Some(ended_at) = payload.ended_at {
            self.ended_at = Some(ended_at);
        }
    }

    fn recompute_derived(&mut self, now: DateTime<Utc>) {
        if self.status == WorkSessionStatus::Completed && self.ended_at.is_none() {
            self.ended_at = Some(now);
        }
        self.duration_minutes = self
            .ended_at
            .map(|end| (end - self.started_at).num_minutes());
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_percent_recomputed_from_items() {
        let now = Utc::now();
        let list = ControlList::new(
            TenantId::new(),
            PrincipalId::new(),
            "CL-1",
            "Daily press check",
            now,
        )
        .with_items(vec![
            ControlItem {
                label: "Oil level".to_string(),
                completed: true,
            },
            ControlItem::new("Guard in place"),
            ControlItem {
                label: "Emergency stop".to_string(),
                completed: true,
            },
            ControlItem::new("Surface clean"),
        ]);

        assert_eq!(list.completion_percent, 50.0);
    }

    #[test]
    fn test_empty_checklist_is_zero_percent() {
        let list = ControlList::new(
            TenantId::new(),
            PrincipalId::new(),
            "CL-2",
            "Empty",
            Utc::now(),
        );
        assert_eq!(list.completion_percent, 0.0);
    }

    #[test]
    fn test_overdue_only_while_pending() {
        let now = Utc::now();
        let mut list = ControlList::new(
            TenantId::new(),
            PrincipalId::new(),
            "CL-3",
            "Weekly lube",
            now,
        )
        .scheduled_for(now - chrono::Duration::hours(2));

        assert!(list.is_overdue(now));

        list.status = ControlListStatus::Completed;
        assert!(!list.is_overdue(now));
    }

    #[test]
    fn test_session_duration_recomputed() {
        let start = Utc::now();
        let mut session = WorkSession::start(TenantId::new(), PrincipalId::new(), "WS-1", start);
        session.status = WorkSessionStatus::Completed;
        session.ended_at = Some(start + chrono::Duration::minutes(95));
        session.recompute_derived(start + chrono::Duration::minutes(95));

        assert_eq!(session.duration_minutes, Some(95));
    }

    #[test]
    fn test_session_completion_defaults_end_time() {
        let start = Utc::now();
        let mut session = WorkSession::start(TenantId::new(), PrincipalId::new(), "WS-2", start);
        session.status = WorkSessionStatus::Completed;
        session.recompute_derived(start + chrono::Duration::minutes(30));

        assert_eq!(session.ended_at, Some(start + chrono::Duration::minutes(30)));
        assert_eq!(session.duration_minutes, Some(30));
    }

    #[test]
    fn test_open_sessions_block_delete_as_dependents() {
        let mut list = ControlList::new(
            TenantId::new(),
            PrincipalId::new(),
            "CL-4",
            "Shift handover",
            Utc::now(),
        );
        assert!(!list.has_active_dependents());
        list.open_sessions = 1;
        assert!(list.has_active_dependents());
    }
}
