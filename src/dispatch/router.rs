// Copyright 2025 Cowboy AI, LLC.

//! Event fan-out
//!
//! Derives work items from a domain event: a cache-invalidation item on the
//! critical queue, a real-time broadcast, and email/push notifications for
//! the principals entitled to them. Channel and notification membership is
//! granted by an explicit policy check, never by transport-level closures.

use crate::dispatch::{QueueClass, WorkItem, WorkItemId, WorkPayload, WorkQueue};
use crate::entity::{Principal, PrincipalId, ResourceClass, Role, TenantId};
use crate::errors::WorkflowResult;
use crate::events::DomainEvent;
use crate::policy::{Action, PolicyEngine, ProtectedResource};
use crate::workflow::entity::Priority;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;

/// Lookup of a tenant's principals for notification fan-out
pub trait PrincipalDirectory: Send + Sync {
    /// All principals belonging to a tenant
    fn principals_of(&self, tenant_id: TenantId) -> Vec<Principal>;
}

/// In-memory principal directory
#[derive(Default)]
pub struct StaticDirectory {
    inner: RwLock<HashMap<TenantId, Vec<Principal>>>,
}

impl StaticDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant-bound principal
    pub fn register(&self, principal: Principal) {
        if let Some(tenant_id) = principal.tenant_id {
            self.inner
                .write()
                .unwrap()
                .entry(tenant_id)
                .or_default()
                .push(principal);
        }
    }
}

impl PrincipalDirectory for StaticDirectory {
    fn principals_of(&self, tenant_id: TenantId) -> Vec<Principal> {
        self.inner
            .read()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// The policy engine's view of the resource behind an event
struct EventResource {
    tenant_id: TenantId,
    class: ResourceClass,
    owner: Option<PrincipalId>,
}

impl ProtectedResource for EventResource {
    fn resource_class(&self) -> ResourceClass {
        self.class
    }

    fn tenant_id(&self) -> Option<TenantId> {
        Some(self.tenant_id)
    }

    fn owner_id(&self) -> Option<PrincipalId> {
        self.owner
    }
}

/// Derives work items from domain events
pub struct EventRouter {
    policy: PolicyEngine,
    directory: Arc<dyn PrincipalDirectory>,
    max_attempts: u32,
}

impl EventRouter {
    /// Create a router
    pub fn new(directory: Arc<dyn PrincipalDirectory>, max_attempts: u32) -> Self {
        Self {
            policy: PolicyEngine::new(),
            directory,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Work items for one domain event
    pub fn route(&self, event: &DomainEvent, now: DateTime<Utc>) -> Vec<WorkItem> {
        let priority = event_priority(event);
        let notification_class = QueueClass::for_priority(priority);
        let mut items = Vec::new();

        // Invalidation first: readers must not see pre-event payloads.
        items.push(WorkItem::new(
            QueueClass::Critical,
            WorkPayload::CacheInvalidation {
                tenant_id: event.tenant_id,
                resource_class: event.resource_class,
            },
            self.max_attempts,
            now,
        ));

        items.push(WorkItem::new(
            notification_class,
            WorkPayload::Broadcast {
                channel: format!(
                    "tenant.{}.{}",
                    event.tenant_id,
                    event.resource_class.as_str()
                ),
                event_type: event.event_type.clone(),
                data: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            },
            self.max_attempts,
            now,
        ));

        let (subject, body) = notification_text(event);
        for recipient in self.recipients_for(event) {
            items.push(WorkItem::new(
                notification_class,
                WorkPayload::Email {
                    to: recipient,
                    subject: subject.clone(),
                    body: body.clone(),
                },
                self.max_attempts,
                now,
            ));
            items.push(WorkItem::new(
                notification_class,
                WorkPayload::Push {
                    to: recipient,
                    title: subject.clone(),
                    body: body.clone(),
                },
                self.max_attempts,
                now,
            ));
        }

        items
    }

    /// Principals entitled to a notification about this event
    ///
    /// The roster is filtered through the policy engine before any role
    /// selection, so nobody is notified about a record they may not view.
    fn recipients_for(&self, event: &DomainEvent) -> Vec<PrincipalId> {
        let resource = EventResource {
            tenant_id: event.tenant_id,
            class: event.resource_class,
            owner: event.owner_id(),
        };

        let visible: Vec<Principal> = self
            .directory
            .principals_of(event.tenant_id)
            .into_iter()
            .filter(|principal| {
                let ctx = crate::context::TenantContext {
                    principal_id: principal.id,
                    tenant_id: principal.tenant_id,
                    role: principal.role,
                };
                self.policy.decide(&ctx, Action::View, &resource).is_allowed()
            })
            .collect();

        match event.new_status.as_str() {
            // Work awaiting review goes to the tenant's managers
            "completed" => visible
                .iter()
                .filter(|p| p.role == Role::Manager)
                .map(|p| p.id)
                .collect(),
            // Review outcomes go back to the owner
            "approved" | "rejected" => visible
                .iter()
                .filter(|p| Some(p.id) == event.owner_id())
                .map(|p| p.id)
                .collect(),
            // Expiry alerts both the owner and the managers
            "expired" => visible
                .iter()
                .filter(|p| p.role == Role::Manager || Some(p.id) == event.owner_id())
                .map(|p| p.id)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Routes events into the work queue, fire-and-forget for the caller
pub struct Dispatcher {
    queue: Arc<WorkQueue>,
    router: EventRouter,
    enqueue_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over a queue and router
    pub fn new(queue: Arc<WorkQueue>, router: EventRouter, enqueue_timeout: Duration) -> Self {
        Self {
            queue,
            router,
            enqueue_timeout,
        }
    }

    /// Derive and enqueue the work items for an event
    ///
    /// Fails closed: a timeout or full queue returns an error instead of
    /// silently dropping the event, and no item of the batch is accepted.
    pub async fn enqueue_event(&self, event: &DomainEvent) -> WorkflowResult<Vec<WorkItemId>> {
        self.enqueue_event_at(event, Utc::now()).await
    }

    /// [`Self::enqueue_event`] with an injected clock
    pub async fn enqueue_event_at(
        &self,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<WorkItemId>> {
        let items = self.router.route(event, now);
        let count = items.len();
        let ids = self.queue.enqueue_batch(items, self.enqueue_timeout).await?;
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            work_items = count,
            "Event dispatched"
        );
        Ok(ids)
    }
}

fn event_priority(event: &DomainEvent) -> Priority {
    event
        .metadata
        .get("priority")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(Priority::Normal)
}

fn notification_text(event: &DomainEvent) -> (String, String) {
    let reference = event
        .metadata
        .get("reference")
        .and_then(|v| v.as_str())
        .unwrap_or("record");

    let subject = match event.new_status.as_str() {
        "completed" => format!("{reference} is awaiting review"),
        "approved" => format!("{reference} was approved"),
        "rejected" => format!("{reference} was rejected"),
        "expired" => format!("{reference} expired before completion"),
        other => format!("{reference} moved to {other}"),
    };

    let mut body = format!(
        "Status changed from {} to {}.",
        event.old_status, event.new_status
    );
    if let Some(notes) = event.metadata.get("review_notes").and_then(|v| v.as_str()) {
        body.push_str(&format!(" Reviewer notes: {notes}"));
    }

    (subject, body)
}
