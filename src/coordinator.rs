// Copyright 2025 Cowboy AI, LLC.

//! Transition coordinator
//!
//! Orchestrates a transition end-to-end: acquires the per-entity advisory
//! lock, re-reads the entity at its latest version, delegates to the state
//! machine, persists with a compare-and-swap, and hands the resulting event
//! to the dispatch subsystem without waiting for delivery.
//!
//! Steps are all-or-nothing: a persist or enqueue failure leaves the entity
//! unchanged and emits nothing. Events are never emitted speculatively.

use crate::config::EngineConfig;
use crate::context::TenantContext;
use crate::dispatch::Dispatcher;
use crate::entity::TenantId;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::store::EntityStore;
use crate::workflow::entity::{ControlList, TransitionPayload, WorkflowEntity};
use crate::workflow::machine::WorkflowMachine;
use crate::workflow::state::ControlListStatus;
use crate::policy::{Action, Decision, PolicyEngine};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-entity advisory locks keyed by `(tenant_id, entity_id)`
///
/// The only place a request may wait on another request; acquisition is
/// bounded by a timeout after which the caller receives a retryable
/// [`WorkflowError::Busy`].
#[derive(Default)]
pub struct LockRegistry {
    locks: StdMutex<HashMap<(TenantId, Uuid), Arc<Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one entity, waiting at most `timeout`
    pub async fn acquire(
        &self,
        tenant_id: TenantId,
        entity_id: Uuid,
        timeout: Duration,
    ) -> WorkflowResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock registry poisoned");
            Arc::clone(
                locks
                    .entry((tenant_id, entity_id))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| WorkflowError::Busy)
    }
}

/// Drives workflow entity transitions through the validation and
/// side-effect pipeline
pub struct TransitionCoordinator<E: WorkflowEntity> {
    store: Arc<dyn EntityStore<E>>,
    dispatcher: Arc<Dispatcher>,
    machine: WorkflowMachine,
    policy: PolicyEngine,
    locks: Arc<LockRegistry>,
    config: EngineConfig,
}

impl<E: WorkflowEntity> TransitionCoordinator<E> {
    /// Create a coordinator over a store and dispatcher
    ///
    /// Coordinators for different entity types may share one
    /// [`LockRegistry`]; keys carry the entity id, so there is no
    /// cross-entity contention.
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        dispatcher: Arc<Dispatcher>,
        locks: Arc<LockRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            machine: WorkflowMachine::new(),
            policy: PolicyEngine::new(),
            locks,
            config,
        }
    }

    /// Create a new entity after a policy check
    pub async fn create(&self, entity: &E, ctx: &TenantContext) -> WorkflowResult<()> {
        if let Decision::Deny(reason) = self.policy.decide(ctx, Action::Create, entity) {
            return Err(WorkflowError::PolicyDenied { reason });
        }
        self.store.insert(entity).await
    }

    /// Transition an entity to `requested`
    ///
    /// The tenant comes from the route, not the actor, so admins can act
    /// across tenants while store keys stay `(tenant_id, entity_id)`.
    pub async fn transition(
        &self,
        tenant_id: TenantId,
        entity_id: Uuid,
        requested: E::Status,
        ctx: &TenantContext,
        payload: &TransitionPayload,
    ) -> WorkflowResult<E> {
        self.transition_at(tenant_id, entity_id, requested, ctx, payload, Utc::now())
            .await
    }

    /// [`Self::transition`] with an injected clock
    pub async fn transition_at(
        &self,
        tenant_id: TenantId,
        entity_id: Uuid,
        requested: E::Status,
        ctx: &TenantContext,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> WorkflowResult<E> {
        // Step 1: serialize concurrent transitions on this entity.
        let _guard = self
            .locks
            .acquire(tenant_id, entity_id, self.config.lock_timeout())
            .await?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            // Step 2: re-read at the latest version inside the lock.
            let entity = self
                .store
                .load(tenant_id, entity_id)
                .await?
                .ok_or_else(|| WorkflowError::EntityNotFound {
                    entity_type: E::entity_type().to_string(),
                    id: entity_id.to_string(),
                })?;
            let read_version = entity.version();

            // A stale client token is terminal; retrying cannot refresh
            // what the client saw.
            if let Some(expected) = payload.expected_version {
                if expected != read_version {
                    return Err(WorkflowError::VersionConflict {
                        expected,
                        actual: read_version,
                    });
                }
            }

            // Step 3: validate and apply via the state machine.
            let (next, event) = self.machine.attempt(&entity, requested, ctx, payload, now)?;

            // Step 4: persist atomically against the version we read.
            match self.store.save(read_version, &next).await {
                Ok(()) => {
                    // Step 5: hand the event to dispatch. Enqueue failure
                    // aborts the whole transition; state must never change
                    // without its notification.
                    if let Err(dispatch_err) = self.dispatcher.enqueue_event_at(&event, now).await {
                        self.roll_back(&entity, &next).await;
                        return Err(dispatch_err);
                    }

                    info!(
                        entity_type = E::entity_type(),
                        entity_id = %entity_id,
                        tenant_id = %tenant_id,
                        from = event.old_status.as_str(),
                        to = event.new_status.as_str(),
                        actor = %ctx.principal_id,
                        version = next.version(),
                        "Transition committed"
                    );
                    return Ok(next);
                }
                Err(err @ WorkflowError::VersionConflict { .. }) => {
                    if attempt >= self.config.transition_retries {
                        return Err(err);
                    }
                    warn!(
                        entity_type = E::entity_type(),
                        entity_id = %entity_id,
                        attempt,
                        "Version conflict, re-reading"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Compensating write restoring the pre-transition snapshot
    ///
    /// The version keeps advancing monotonically; only the domain fields
    /// are restored, and no event is observable for the aborted transition.
    async fn roll_back(&self, snapshot: &E, persisted: &E) {
        let mut restored = snapshot.clone();
        while restored.version() <= persisted.version() {
            restored.increment_version();
        }
        if let Err(err) = self.store.save(persisted.version(), &restored).await {
            error!(
                entity_type = E::entity_type(),
                entity_id = %snapshot.entity_id(),
                error = %err,
                "Rollback after failed dispatch did not apply"
            );
        } else {
            warn!(
                entity_type = E::entity_type(),
                entity_id = %snapshot.entity_id(),
                "Transition rolled back after failed dispatch"
            );
        }
    }
}

impl TransitionCoordinator<ControlList> {
    /// Expire every overdue pending control list of a tenant
    ///
    /// Runs under the system principal through the ordinary transition
    /// pipeline, so expiry emits events and busts caches like any other
    /// transition. Returns the number of lists expired; conflicts are left
    /// for the next sweep.
    pub async fn expire_overdue(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> WorkflowResult<usize> {
        let ctx = TenantContext::system();
        let payload = TransitionPayload::new();
        let mut expired = 0;

        for list in self.store.list(tenant_id).await? {
            if !list.is_overdue(now) {
                continue;
            }
            match self
                .transition_at(
                    tenant_id,
                    list.entity_id(),
                    ControlListStatus::Expired,
                    &ctx,
                    &payload,
                    now,
                )
                .await
            {
                Ok(_) => expired += 1,
                Err(err) if err.is_conflict() => {
                    warn!(
                        entity_id = %list.entity_id(),
                        "Skipping contended list during expiry sweep"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(expired)
    }
}
