// Copyright 2025 Cowboy AI, LLC.

//! Error types for workflow operations

use thiserror::Error;

/// Errors that can occur while resolving, authorizing, or executing a
/// workflow transition, or while dispatching its side effects.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// No valid authenticated session
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A non-admin principal has no tenant assigned
    ///
    /// This is a configuration error on the account, not a transient
    /// condition; it maps to 403 and is never retried.
    #[error("Principal {principal_id} has no tenant")]
    TenantMissing {
        /// The misconfigured principal
        principal_id: String,
    },

    /// The policy engine denied the action
    #[error("Policy denied: {reason}")]
    PolicyDenied {
        /// Stable reason string, e.g. "cross-tenant"
        reason: String,
    },

    /// The requested edge is not in the entity type's allowed-edge set
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: String,
        /// Requested target state
        to: String,
    },

    /// Optimistic concurrency check failed
    #[error("Version conflict: expected version {expected}, but found {actual}")]
    VersionConflict {
        /// Version the caller read
        expected: u64,
        /// Version actually stored
        actual: u64,
    },

    /// A required field was missing or malformed
    #[error("Validation failed on {field}: {reason}")]
    ValidationFailed {
        /// Field that failed validation
        field: String,
        /// Why it failed
        reason: String,
    },

    /// The per-entity lock could not be acquired within the timeout
    #[error("Entity is busy, retry later")]
    Busy,

    /// Handing events to the dispatch subsystem failed
    #[error("Dispatch failed (retryable: {retryable}): {message}")]
    DispatchFailed {
        /// Whether the dispatch layer may retry this
        retryable: bool,
        /// What went wrong
        message: String,
    },

    /// Entity not found in the store
    #[error("Entity not found: {entity_type} with id {id}")]
    EntityNotFound {
        /// Type of entity that wasn't found
        entity_type: String,
        /// ID that was searched for
        id: String,
    },

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::SerializationError(err.to_string())
    }
}

impl WorkflowError {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::TenantMissing { .. } => "tenant_missing",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::VersionConflict { .. } => "version_conflict",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::Busy => "busy",
            Self::DispatchFailed { .. } => "dispatch_failed",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::StorageError(_) => "storage_error",
            Self::SerializationError(_) => "serialization_error",
        }
    }

    /// HTTP status the inbound layer should surface for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::TenantMissing { .. } | Self::PolicyDenied { .. } => 403,
            Self::EntityNotFound { .. } => 404,
            Self::InvalidTransition { .. } | Self::VersionConflict { .. } => 409,
            Self::ValidationFailed { .. } => 422,
            Self::Busy => 503,
            Self::DispatchFailed { .. } | Self::StorageError(_) | Self::SerializationError(_) => {
                500
            }
        }
    }

    /// Check if this is an authorization failure
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            Self::PolicyDenied { .. } | Self::Unauthenticated | Self::TenantMissing { .. }
        )
    }

    /// Check if this is a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::Busy)
    }

    /// Check if the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VersionConflict { .. } | Self::Busy => true,
            Self::DispatchFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
