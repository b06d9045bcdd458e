// Copyright 2025 Cowboy AI, LLC.

//! Queue consumers
//!
//! A worker pool drains each queue class with an independent concurrency
//! limit, so a backlog in one class cannot starve another. Items that fail
//! retryably are requeued on their backoff schedule; non-retryable failures
//! and exhausted items are dead-lettered with a logged alert.

use crate::config::QueueSettings;
use crate::dispatch::{
    BackoffSchedule, Consumers, QueueClass, WorkItem, WorkPayload, WorkQueue,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Consumer pool over a work queue
pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    consumers: Arc<Consumers>,
    settings: QueueSettings,
}

impl WorkerPool {
    /// Create a pool
    pub fn new(queue: Arc<WorkQueue>, consumers: Arc<Consumers>, settings: QueueSettings) -> Self {
        Self {
            queue,
            consumers,
            settings,
        }
    }

    /// Process one due item of a class; returns whether one was found
    pub async fn process_one(&self, class: QueueClass, now: DateTime<Utc>) -> bool {
        let Some(item) = self.queue.next_due(class, now).await else {
            return false;
        };
        self.execute(item, now).await;
        true
    }

    /// Drain every currently-due item of a class
    ///
    /// Items whose backoff pushes them past `now` stay queued. Returns the
    /// number of attempts made.
    pub async fn drain_due(&self, class: QueueClass, now: DateTime<Utc>) -> usize {
        let mut processed = 0;
        while self.process_one(class, now).await {
            processed += 1;
        }
        processed
    }

    /// Drain every currently-due item across all classes
    pub async fn drain_all_due(&self, now: DateTime<Utc>) -> usize {
        let mut processed = 0;
        for class in QueueClass::ALL {
            processed += self.drain_due(class, now).await;
        }
        processed
    }

    /// Spawn the background consumer loops
    ///
    /// One loop per unit of per-class concurrency; all loops stop when the
    /// returned handle is shut down.
    pub fn spawn(self: &Arc<Self>) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for class in QueueClass::ALL {
            for _ in 0..self.settings.concurrency_for(class) {
                let pool = Arc::clone(self);
                let mut shutdown = shutdown_rx.clone();
                handles.push(tokio::spawn(async move {
                    let interval = pool.settings.poll_interval();
                    loop {
                        if *shutdown.borrow() {
                            break;
                        }
                        if !pool.process_one(class, Utc::now()).await {
                            tokio::select! {
                                _ = shutdown.changed() => break,
                                _ = tokio::time::sleep(interval) => {}
                            }
                        }
                    }
                }));
            }
        }

        WorkerHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }

    async fn execute(&self, item: WorkItem, now: DateTime<Utc>) {
        let attempt = item.attempt_count + 1;

        match self.consumers.deliver(&item.payload).await {
            Ok(()) => {
                self.queue.mark_delivered(item.id, attempt).await;
                info!(
                    work_item = %item.id,
                    kind = item.payload.kind(),
                    queue_class = %item.queue_class,
                    attempt,
                    "Work item delivered"
                );
            }
            Err(err) if err.retryable && attempt < item.max_attempts => {
                let delay = self.backoff_for(&item.payload).delay(attempt);
                let available_at = now
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| {
                        chrono::Duration::seconds(delay.as_secs() as i64)
                    });
                self.queue
                    .mark_retry(item.id, attempt, &err.message, available_at)
                    .await;
                warn!(
                    work_item = %item.id,
                    kind = item.payload.kind(),
                    attempt,
                    max_attempts = item.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err.message,
                    "Work item failed, retrying after backoff"
                );
            }
            Err(err) => {
                self.queue.mark_dead(item.id, attempt, &err.message).await;
                error!(
                    work_item = %item.id,
                    kind = item.payload.kind(),
                    queue_class = %item.queue_class,
                    attempts = attempt,
                    retryable = err.retryable,
                    error = %err.message,
                    "Work item dead-lettered, needs manual inspection"
                );
            }
        }
    }

    fn backoff_for(&self, payload: &WorkPayload) -> BackoffSchedule {
        match payload {
            WorkPayload::Email { .. } => {
                BackoffSchedule::from_secs(&self.settings.email_backoff_secs)
            }
            _ => BackoffSchedule::from_secs(&self.settings.notification_backoff_secs),
        }
    }
}

/// Running consumer loops, stoppable
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal shutdown and wait for every loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        join_all(self.handles).await;
    }
}
