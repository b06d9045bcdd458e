// Copyright 2025 Cowboy AI, LLC.

//! Domain events
//!
//! Events are immutable facts recording a successful state transition.
//! Exactly one is produced per transition; consumers must tolerate
//! at-least-once delivery.

use crate::entity::{PrincipalId, ResourceClass, TenantId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a domain event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generate a new event ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of a successful state transition
///
/// The `event_type` is derived from the resource class and the new status,
/// e.g. `control_lists.approved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DomainEvent {
    /// Unique identifier of this event
    pub id: EventId,
    /// Derived type string, `<resource_class>.<new_status>`
    pub event_type: String,
    /// Tenant owning the transitioned entity
    pub tenant_id: TenantId,
    /// Class of the transitioned resource
    pub resource_class: ResourceClass,
    /// The transitioned entity
    pub entity_id: Uuid,
    /// Status before the transition
    pub old_status: String,
    /// Status after the transition
    pub new_status: String,
    /// Principal that requested the transition
    pub actor_id: PrincipalId,
    /// Additional payload-oriented properties
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the transition occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Build an event for a transition on an entity
    #[allow(clippy::too_many_arguments)]
    pub fn transition(
        tenant_id: TenantId,
        resource_class: ResourceClass,
        entity_id: Uuid,
        old_status: &str,
        new_status: &str,
        actor_id: PrincipalId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: format!("{}.{}", resource_class.as_str(), new_status),
            tenant_id,
            resource_class,
            entity_id,
            old_status: old_status.to_string(),
            new_status: new_status.to_string(),
            actor_id,
            metadata: HashMap::new(),
            occurred_at,
        }
    }

    /// Attach a metadata property
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Read the entity owner from metadata, when the producer recorded it
    pub fn owner_id(&self) -> Option<PrincipalId> {
        self.metadata
            .get("owner_id")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_is_derived() {
        let event = DomainEvent::transition(
            TenantId::new(),
            ResourceClass::ControlLists,
            Uuid::new_v4(),
            "completed",
            "approved",
            PrincipalId::new(),
            Utc::now(),
        );
        assert_eq!(event.event_type, "control_lists.approved");
        assert_eq!(event.old_status, "completed");
        assert_eq!(event.new_status, "approved");
    }

    #[test]
    fn test_owner_metadata_round_trip() {
        let owner = PrincipalId::new();
        let event = DomainEvent::transition(
            TenantId::new(),
            ResourceClass::WorkSessions,
            Uuid::new_v4(),
            "in_progress",
            "completed",
            PrincipalId::new(),
            Utc::now(),
        )
        .with_metadata("owner_id", serde_json::to_value(owner).unwrap());

        assert_eq!(event.owner_id(), Some(owner));
    }

    #[test]
    fn test_events_serialize() {
        let event = DomainEvent::transition(
            TenantId::new(),
            ResourceClass::ControlLists,
            Uuid::new_v4(),
            "pending",
            "completed",
            PrincipalId::new(),
            Utc::now(),
        );
        let json = serde_json::to_string(&event).expect("serialize");
        let back: DomainEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }
}
