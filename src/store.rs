// Copyright 2025 Cowboy AI, LLC.

//! Persistence seam for workflow entities
//!
//! The engine treats storage as an external collaborator behind
//! [`EntityStore`]. Entities are keyed by `(tenant_id, entity_id)` and saved
//! with a compare-and-swap on the optimistic-concurrency version.
//! [`InMemoryStore`] is the reference implementation used by tests and
//! single-process deployments.

use crate::entity::TenantId;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::workflow::entity::WorkflowEntity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Load/save access to workflow entities, tenant-scoped
#[async_trait]
pub trait EntityStore<E: WorkflowEntity>: Send + Sync {
    /// Load an entity by `(tenant, id)`
    async fn load(&self, tenant_id: TenantId, entity_id: Uuid) -> WorkflowResult<Option<E>>;

    /// Insert a freshly created entity
    async fn insert(&self, entity: &E) -> WorkflowResult<()>;

    /// Persist a transitioned entity
    ///
    /// Succeeds only when the stored version still equals
    /// `expected_version`; otherwise fails with
    /// [`WorkflowError::VersionConflict`] and leaves the stored entity
    /// unchanged.
    async fn save(&self, expected_version: u64, entity: &E) -> WorkflowResult<()>;

    /// All entities of one tenant
    async fn list(&self, tenant_id: TenantId) -> WorkflowResult<Vec<E>>;
}

/// In-memory entity store
pub struct InMemoryStore<E: WorkflowEntity> {
    storage: Arc<RwLock<HashMap<(TenantId, Uuid), E>>>,
}

impl<E: WorkflowEntity> InMemoryStore<E> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<E: WorkflowEntity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: WorkflowEntity> Clone for InMemoryStore<E> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

#[async_trait]
impl<E: WorkflowEntity> EntityStore<E> for InMemoryStore<E> {
    async fn load(&self, tenant_id: TenantId, entity_id: Uuid) -> WorkflowResult<Option<E>> {
        Ok(self
            .storage
            .read()
            .await
            .get(&(tenant_id, entity_id))
            .cloned())
    }

    async fn insert(&self, entity: &E) -> WorkflowResult<()> {
        let key = (entity.entity_tenant(), entity.entity_id());
        let mut storage = self.storage.write().await;
        if storage.contains_key(&key) {
            return Err(WorkflowError::StorageError(format!(
                "{} {} already exists",
                E::entity_type(),
                entity.entity_id()
            )));
        }
        storage.insert(key, entity.clone());
        Ok(())
    }

    async fn save(&self, expected_version: u64, entity: &E) -> WorkflowResult<()> {
        let key = (entity.entity_tenant(), entity.entity_id());
        let mut storage = self.storage.write().await;
        let stored = storage.get(&key).ok_or_else(|| WorkflowError::EntityNotFound {
            entity_type: E::entity_type().to_string(),
            id: entity.entity_id().to_string(),
        })?;

        if stored.version() != expected_version {
            return Err(WorkflowError::VersionConflict {
                expected: expected_version,
                actual: stored.version(),
            });
        }

        storage.insert(key, entity.clone());
        Ok(())
    }

    async fn list(&self, tenant_id: TenantId) -> WorkflowResult<Vec<E>> {
        Ok(self
            .storage
            .read()
            .await
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .map(|(_, entity)| entity.clone())
            .collect())
    }
}
