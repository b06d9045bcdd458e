//! Core identity types: tenants, principals, roles

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// A typed entity ID using phantom types for type safety
///
/// IDs for different entity types cannot be mixed up at compile time.
///
/// # Examples
///
/// ```rust
/// use opsflow::EntityId;
///
/// struct ControlList;
/// struct WorkSession;
///
/// let list_id = EntityId::<ControlList>::new();
/// let session_id = EntityId::<WorkSession>::new();
///
/// // These are different types - won't compile if mixed up:
/// // let _: EntityId<ControlList> = session_id; // ERROR!
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId<T> {
    id: Uuid,
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

impl<T> EntityId<T> {
    /// Create a new random entity ID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            _phantom: PhantomData,
        }
    }

    /// Create an entity ID from a UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.id
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> Default for EntityId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<EntityId<T>> for Uuid {
    fn from(id: EntityId<T>) -> Self {
        id.id
    }
}

/// Identifier for a tenant (the isolation boundary)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Generate a new tenant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a principal (an authenticated actor)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct PrincipalId(pub Uuid);

impl PrincipalId {
    /// Generate a new principal ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary role of a principal
///
/// Every principal carries exactly one primary role; the role determines
/// the action set available in the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform administrator, not bound to a tenant
    Admin,
    /// Reviews and approves work within a tenant
    Manager,
    /// Runs work sessions and fills control lists
    Operator,
}

impl Role {
    /// Name of this role for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An authenticated actor with a role and (usually) a tenant
///
/// Invariant: a non-admin principal's `tenant_id` must equal the tenant of
/// any resource it acts upon. Only admins may have no tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Principal {
    /// Unique identifier of this principal
    pub id: PrincipalId,
    /// Tenant this principal belongs to; `None` only for admins
    pub tenant_id: Option<TenantId>,
    /// Primary role
    pub role: Role,
}

impl Principal {
    /// Create a tenant-bound principal
    pub fn new(tenant_id: TenantId, role: Role) -> Self {
        Self {
            id: PrincipalId::new(),
            tenant_id: Some(tenant_id),
            role,
        }
    }

    /// Create a global admin with no tenant binding
    pub fn global_admin() -> Self {
        Self {
            id: PrincipalId::new(),
            tenant_id: None,
            role: Role::Admin,
        }
    }

    /// Whether this principal holds the admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A tenant record
///
/// Tenants are created at company onboarding and soft-deactivated rather
/// than hard-deleted while dependents exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Tenant {
    /// Unique identifier
    pub id: TenantId,
    /// Display name of the company
    pub name: String,
    /// Soft-deactivation flag
    pub active: bool,
}

impl Tenant {
    /// Create an active tenant
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            active: true,
        }
    }
}

/// Classes of resources the engine manages
///
/// Used for policy decisions, event routing, and cache tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Checklist records filled by operators
    ControlLists,
    /// Timed machine work sessions
    WorkSessions,
    /// Principal account records
    Accounts,
}

impl ResourceClass {
    /// Stable string form, used in event types and cache tags
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlLists => "control_lists",
            Self::WorkSessions => "work_sessions",
            Self::Accounts => "accounts",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        struct Marker;
        let a = EntityId::<Marker>::new();
        let b = EntityId::<Marker>::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_id_uuid_round_trip() {
        struct Marker;
        let raw = Uuid::new_v4();
        let id = EntityId::<Marker>::from_uuid(raw);
        assert_eq!(*id.as_uuid(), raw);
        assert_eq!(Uuid::from(id), raw);
    }

    #[test]
    fn test_principal_tenant_binding() {
        let tenant = TenantId::new();
        let operator = Principal::new(tenant, Role::Operator);
        assert_eq!(operator.tenant_id, Some(tenant));
        assert!(!operator.is_admin());

        let admin = Principal::global_admin();
        assert!(admin.is_admin());
        assert!(admin.tenant_id.is_none());
    }

    #[test]
    fn test_resource_class_strings() {
        assert_eq!(ResourceClass::ControlLists.as_str(), "control_lists");
        assert_eq!(ResourceClass::WorkSessions.as_str(), "work_sessions");
    }
}
