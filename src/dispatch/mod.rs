// Copyright 2025 Cowboy AI, LLC.

//! Async dispatch subsystem
//!
//! Takes domain events, derives work items (emails, push notifications,
//! real-time broadcasts, cache invalidation, reports), enqueues them onto
//! priority-segregated queues, and executes them with bounded retry and
//! exponential backoff. Permanent failures are dead-lettered and logged,
//! never silently dropped.
//!
//! Enqueueing is synchronous and fast with a short timeout that fails
//! closed; delivery is asynchronous and never blocks the request that
//! caused it.

pub mod deliver;
pub mod queue;
pub mod router;
pub mod worker;

pub use deliver::{Consumers, Deliverer, DeliveryError, NullDeliverer, RecordingDeliverer};
pub use queue::WorkQueue;
pub use router::{Dispatcher, EventRouter, PrincipalDirectory, StaticDirectory};
pub use worker::{WorkerHandle, WorkerPool};

use crate::entity::{PrincipalId, ResourceClass, TenantId};
use crate::workflow::entity::Priority;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Priority-segregated queue classes
///
/// Each class has an independent concurrency limit so a backlog in one
/// cannot starve another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    /// Cache invalidation and other must-run-soon work
    Critical,
    /// User-facing notifications
    Notifications,
    /// Report generation
    Reports,
    /// Low-priority background work
    Bulk,
}

impl QueueClass {
    /// All classes, in drain priority order
    pub const ALL: [QueueClass; 4] = [
        QueueClass::Critical,
        QueueClass::Notifications,
        QueueClass::Reports,
        QueueClass::Bulk,
    ];

    /// Stable name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Notifications => "notifications",
            Self::Reports => "reports",
            Self::Bulk => "bulk",
        }
    }

    /// Queue class for a notification of the given priority
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Critical => Self::Critical,
            Priority::High | Priority::Normal => Self::Notifications,
            Priority::Low => Self::Bulk,
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique identifier of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct WorkItemId(pub Uuid);

impl WorkItemId {
    /// Generate a new work item ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Waiting for a worker (or for its backoff delay)
    Queued,
    /// Picked up by a worker
    InFlight,
    /// Terminal: delivered successfully
    Delivered,
    /// Terminal: attempts exhausted or permanently failed
    DeadLettered,
}

impl WorkItemStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::DeadLettered)
    }
}

/// The payload of one unit of asynchronous work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkPayload {
    /// Send an email to a principal
    Email {
        /// Recipient
        to: PrincipalId,
        /// Subject line
        subject: String,
        /// Body text
        body: String,
    },
    /// Push a notification to a principal's devices
    Push {
        /// Recipient
        to: PrincipalId,
        /// Notification title
        title: String,
        /// Notification body
        body: String,
    },
    /// Publish to a real-time channel
    Broadcast {
        /// Channel name, `tenant.<id>.<resource_class>`
        channel: String,
        /// Event type being broadcast
        event_type: String,
        /// Event data
        data: serde_json::Value,
    },
    /// Bust cached responses tagged with a tenant and resource class
    CacheInvalidation {
        /// Tenant whose entries are invalidated
        tenant_id: TenantId,
        /// Resource class whose entries are invalidated
        resource_class: ResourceClass,
    },
    /// Generate a report
    Report {
        /// Tenant the report covers
        tenant_id: TenantId,
        /// Kind of report
        report_type: String,
    },
}

impl WorkPayload {
    /// Short kind name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email { .. } => "email",
            Self::Push { .. } => "push",
            Self::Broadcast { .. } => "broadcast",
            Self::CacheInvalidation { .. } => "cache_invalidation",
            Self::Report { .. } => "report",
        }
    }
}

/// A queued, retryable unit of asynchronous work
///
/// The serialized form is the persisted layout: a process restart resumes
/// undelivered items from `{id, queue_class, payload, attempt_count,
/// status, available_at}` without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkItem {
    /// Unique identifier
    pub id: WorkItemId,
    /// Which queue drains this item
    pub queue_class: QueueClass,
    /// What to do
    pub payload: WorkPayload,
    /// Delivery attempts made so far
    pub attempt_count: u32,
    /// Attempt bound before dead-lettering
    pub max_attempts: u32,
    /// Current lifecycle status
    pub status: WorkItemStatus,
    /// Earliest time a worker may pick this item up
    pub available_at: DateTime<Utc>,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// When the item was enqueued
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a queued item available immediately
    pub fn new(
        queue_class: QueueClass,
        payload: WorkPayload,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkItemId::new(),
            queue_class,
            payload,
            attempt_count: 0,
            max_attempts,
            status: WorkItemStatus::Queued,
            available_at: now,
            last_error: None,
            created_at: now,
        }
    }
}

/// An exponential backoff schedule
///
/// The delay for attempt `n` (1-based, counted after the first failure) is
/// the `n`-th entry; past the end the last entry repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule(Vec<Duration>);

impl BackoffSchedule {
    /// Build a schedule from delays in seconds
    pub fn from_secs(secs: &[u64]) -> Self {
        Self(secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    /// Delay before the next try after `failed_attempts` failures
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        if self.0.is_empty() {
            return Duration::ZERO;
        }
        let index = (failed_attempts.max(1) as usize - 1).min(self.0.len() - 1);
        self.0[index]
    }
}
