// Copyright 2025 Cowboy AI, LLC.

//! Work item queue
//!
//! A bounded, priority-segregated queue with a full ledger of every item it
//! has accepted. The ledger keeps the persisted shape of each item, so a
//! restart can resume undelivered work via [`WorkQueue::resume`]; delivered
//! and dead-lettered items stay visible for inspection.

use crate::dispatch::{QueueClass, WorkItem, WorkItemId, WorkItemStatus};
use crate::errors::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Bounded in-memory work queue with a persisted-shape ledger
pub struct WorkQueue {
    ledger: Arc<RwLock<IndexMap<WorkItemId, WorkItem>>>,
    capacity: usize,
}

impl WorkQueue {
    /// Create a queue allowing `capacity` undelivered items per class
    pub fn new(capacity: usize) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(IndexMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a batch of items atomically, failing closed on timeout or
    /// capacity
    ///
    /// Either every item is accepted or none is; a full class rejects the
    /// whole batch so the caller can abort its transition.
    pub async fn enqueue_batch(
        &self,
        items: Vec<WorkItem>,
        timeout: Duration,
    ) -> WorkflowResult<Vec<WorkItemId>> {
        let mut ledger = tokio::time::timeout(timeout, self.ledger.write())
            .await
            .map_err(|_| WorkflowError::DispatchFailed {
                retryable: true,
                message: "enqueue timed out".to_string(),
            })?;

        for class in QueueClass::ALL {
            let queued = ledger
                .values()
                .filter(|i| i.queue_class == class && !i.status.is_terminal())
                .count();
            let incoming = items.iter().filter(|i| i.queue_class == class).count();
            if queued + incoming > self.capacity {
                warn!(
                    queue_class = %class,
                    queued,
                    incoming,
                    capacity = self.capacity,
                    "Rejecting enqueue batch, queue full"
                );
                return Err(WorkflowError::DispatchFailed {
                    retryable: true,
                    message: format!("queue {class} is full"),
                });
            }
        }

        let ids = items.iter().map(|i| i.id).collect();
        for item in items {
            ledger.insert(item.id, item);
        }
        Ok(ids)
    }

    /// Enqueue one item
    pub async fn enqueue(&self, item: WorkItem, timeout: Duration) -> WorkflowResult<WorkItemId> {
        let ids = self.enqueue_batch(vec![item], timeout).await?;
        Ok(ids[0])
    }

    /// Take the next due item of a class, marking it in-flight
    pub async fn next_due(&self, class: QueueClass, now: DateTime<Utc>) -> Option<WorkItem> {
        let mut ledger = self.ledger.write().await;
        let next = ledger.values_mut().find(|i| {
            i.queue_class == class && i.status == WorkItemStatus::Queued && i.available_at <= now
        })?;
        next.status = WorkItemStatus::InFlight;
        Some(next.clone())
    }

    /// Record a successful delivery
    pub async fn mark_delivered(&self, id: WorkItemId, attempts: u32) {
        let mut ledger = self.ledger.write().await;
        if let Some(item) = ledger.get_mut(&id) {
            item.attempt_count = attempts;
            item.status = WorkItemStatus::Delivered;
            item.last_error = None;
        }
    }

    /// Record a retryable failure and requeue with a backoff delay
    pub async fn mark_retry(
        &self,
        id: WorkItemId,
        attempts: u32,
        error: &str,
        available_at: DateTime<Utc>,
    ) {
        let mut ledger = self.ledger.write().await;
        if let Some(item) = ledger.get_mut(&id) {
            item.attempt_count = attempts;
            item.status = WorkItemStatus::Queued;
            item.last_error = Some(error.to_string());
            item.available_at = available_at;
        }
    }

    /// Record a permanent failure
    pub async fn mark_dead(&self, id: WorkItemId, attempts: u32, error: &str) {
        let mut ledger = self.ledger.write().await;
        if let Some(item) = ledger.get_mut(&id) {
            item.attempt_count = attempts;
            item.status = WorkItemStatus::DeadLettered;
            item.last_error = Some(error.to_string());
        }
    }

    /// Look up one item
    pub async fn get(&self, id: WorkItemId) -> Option<WorkItem> {
        self.ledger.read().await.get(&id).cloned()
    }

    /// Snapshot of every item the queue has accepted
    pub async fn snapshot(&self) -> Vec<WorkItem> {
        self.ledger.read().await.values().cloned().collect()
    }

    /// All dead-lettered items, for manual inspection
    pub async fn dead_letters(&self) -> Vec<WorkItem> {
        self.ledger
            .read()
            .await
            .values()
            .filter(|i| i.status == WorkItemStatus::DeadLettered)
            .cloned()
            .collect()
    }

    /// Count of undelivered items in a class
    pub async fn pending(&self, class: QueueClass) -> usize {
        self.ledger
            .read()
            .await
            .values()
            .filter(|i| i.queue_class == class && !i.status.is_terminal())
            .count()
    }

    /// Requeue items a previous process left in-flight
    ///
    /// Called once on startup; returns the number of items recovered.
    pub async fn resume(&self) -> usize {
        let mut ledger = self.ledger.write().await;
        let mut recovered = 0;
        for item in ledger.values_mut() {
            if item.status == WorkItemStatus::InFlight {
                item.status = WorkItemStatus::Queued;
                recovered += 1;
            }
        }
        recovered
    }
}
