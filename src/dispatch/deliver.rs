// Copyright 2025 Cowboy AI, LLC.

//! Delivery seams for outbound collaborators
//!
//! The email sender, push/real-time broadcaster, and report generator are
//! black boxes behind [`Deliverer`]: `send(payload) -> Ok | Err(retryable)`.
//! Cache invalidation is the one consumer handled inside the engine, since
//! it targets the response cache directly.

use crate::cache::ResponseCache;
use crate::dispatch::WorkPayload;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Failure of one delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryError {
    /// Whether the dispatch subsystem may retry
    pub retryable: bool,
    /// What went wrong
    pub message: String,
}

impl DeliveryError {
    /// A transient failure worth retrying
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    /// A permanent failure, dead-lettered immediately
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

/// An outbound collaborator that can deliver a work payload
///
/// Implementations must be idempotent under at-least-once delivery:
/// re-sending an email is acceptable, mutating engine state is not.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Deliver the payload
    async fn send(&self, payload: &WorkPayload) -> Result<(), DeliveryError>;
}

/// Deliverer that accepts everything and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDeliverer;

#[async_trait]
impl Deliverer for NullDeliverer {
    async fn send(&self, payload: &WorkPayload) -> Result<(), DeliveryError> {
        debug!(kind = payload.kind(), "Discarding payload");
        Ok(())
    }
}

/// Recording test double, optionally failing the first N attempts
#[derive(Clone, Default)]
pub struct RecordingDeliverer {
    delivered: Arc<RwLock<Vec<WorkPayload>>>,
    attempts: Arc<AtomicU32>,
    failures_remaining: Arc<AtomicU32>,
    retryable_failures: bool,
}

impl RecordingDeliverer {
    /// A deliverer that always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// A deliverer that fails the first `times` attempts, then succeeds
    pub fn failing(times: u32, retryable: bool) -> Self {
        Self {
            delivered: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(AtomicU32::new(0)),
            failures_remaining: Arc::new(AtomicU32::new(times)),
            retryable_failures: retryable,
        }
    }

    /// Payloads delivered so far
    pub fn delivered(&self) -> Vec<WorkPayload> {
        self.delivered.read().unwrap().clone()
    }

    /// Total send attempts, including failed ones
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn send(&self, payload: &WorkPayload) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(if self.retryable_failures {
                DeliveryError::transient("simulated transient failure")
            } else {
                DeliveryError::permanent("simulated permanent failure")
            });
        }

        self.delivered.write().unwrap().push(payload.clone());
        Ok(())
    }
}

/// The consumer set a worker pool routes payloads to
pub struct Consumers {
    email: Arc<dyn Deliverer>,
    push: Arc<dyn Deliverer>,
    broadcast: Arc<dyn Deliverer>,
    reports: Arc<dyn Deliverer>,
    cache: Arc<ResponseCache>,
}

impl Consumers {
    /// Wire up the outbound collaborators
    pub fn new(
        email: Arc<dyn Deliverer>,
        push: Arc<dyn Deliverer>,
        broadcast: Arc<dyn Deliverer>,
        reports: Arc<dyn Deliverer>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            email,
            push,
            broadcast,
            reports,
            cache,
        }
    }

    /// Route a payload to its consumer
    pub async fn deliver(&self, payload: &WorkPayload) -> Result<(), DeliveryError> {
        match payload {
            WorkPayload::Email { .. } => self.email.send(payload).await,
            WorkPayload::Push { .. } => self.push.send(payload).await,
            WorkPayload::Broadcast { .. } => self.broadcast.send(payload).await,
            WorkPayload::Report { .. } => self.reports.send(payload).await,
            WorkPayload::CacheInvalidation {
                tenant_id,
                resource_class,
            } => {
                // Invalidation is naturally idempotent under duplicate
                // delivery.
                self.cache.invalidate(*tenant_id, *resource_class).await;
                Ok(())
            }
        }
    }
}
