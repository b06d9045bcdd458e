//! # Opsflow
//!
//! Tenant-scoped workflow and notification engine for multi-tenant
//! inspection/compliance platforms: operators run timed work sessions and
//! fill control lists, managers approve or reject them, and every state
//! change fans out asynchronously to emails, push notifications, real-time
//! channels, and cache invalidation.
//!
//! The engine provides:
//! - **Tenant Context Resolver**: derives the acting principal's tenant and
//!   role from an authenticated session
//! - **Policy Engine**: pure `(actor, action, resource) -> Allow | Deny`
//!   decisions with strict tenant isolation
//! - **Workflow State Machine**: legal lifecycle edges for control lists
//!   and work sessions, validated per transition
//! - **Transition Coordinator**: per-entity locking, optimistic concurrency
//!   with bounded retry, all-or-nothing persistence and event emission
//! - **Async Dispatch Subsystem**: priority-segregated queues with bounded
//!   retry, exponential backoff, and dead-lettering
//! - **Response Cache Layer**: event-invalidated read caching with a TTL
//!   safety net
//!
//! ## Design Principles
//!
//! 1. **Isolation first**: every record carries a tenant; cross-tenant
//!    access is denied before anything else is considered
//! 2. **Explicit context**: the per-request principal is threaded through
//!    every call, never read from ambient state
//! 3. **Errors by value**: every failure kind is a tagged result the caller
//!    must handle, not an exception
//! 4. **No event without mutation**: exactly one domain event per committed
//!    transition, none on any failure path
//! 5. **Fail closed**: an event that cannot be enqueued aborts its
//!    transition

#![warn(missing_docs)]

mod cache;
mod config;
mod context;
mod coordinator;
mod entity;
mod errors;
mod events;
mod policy;
mod store;
pub mod dispatch;
pub mod workflow;

// Re-export core types
pub use cache::{CachedResponse, ReadRequest, ResponseCache, CACHE_STATUS_HEADER};
pub use config::{CacheSettings, EngineConfig, QueueSettings};
pub use context::{Session, TenantContext, TenantContextResolver};
pub use coordinator::{LockRegistry, TransitionCoordinator};
pub use entity::{
    EntityId, Principal, PrincipalId, ResourceClass, Role, Tenant, TenantId,
};
pub use errors::{WorkflowError, WorkflowResult};
pub use events::{DomainEvent, EventId};
pub use policy::{deny, Action, Decision, PolicyEngine, ProtectedResource};
pub use store::{EntityStore, InMemoryStore};

pub use dispatch::{
    BackoffSchedule, Consumers, Deliverer, DeliveryError, Dispatcher, EventRouter, NullDeliverer,
    PrincipalDirectory, QueueClass, RecordingDeliverer, StaticDirectory, WorkItem, WorkItemId,
    WorkItemStatus, WorkPayload, WorkQueue, WorkerHandle, WorkerPool,
};
pub use workflow::{
    ControlItem, ControlList, ControlListId, ControlListStatus, Priority, TransitionPayload,
    WorkSession, WorkSessionId, WorkSessionStatus, WorkflowEntity, WorkflowMachine,
    WorkflowStatus,
};
