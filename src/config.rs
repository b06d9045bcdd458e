//! Engine configuration
//!
//! Timeouts, retry bounds, backoff schedules, and cache limits gathered in
//! one deserializable struct. Defaults mirror production values.

use crate::dispatch::QueueClass;
use serde::Deserialize;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a transition may wait on the per-entity lock, milliseconds
    pub lock_timeout_ms: u64,
    /// Internal retry bound for version conflicts
    pub transition_retries: u32,
    /// How long an enqueue may block before failing closed, milliseconds
    pub enqueue_timeout_ms: u64,
    /// Dispatch queue settings
    pub queues: QueueSettings,
    /// Response cache settings
    pub cache: CacheSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            transition_retries: 3,
            enqueue_timeout_ms: 500,
            queues: QueueSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Per-entity lock timeout
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Enqueue fail-closed timeout
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

/// Settings for the async dispatch subsystem
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Worker concurrency for the critical queue
    pub critical_concurrency: usize,
    /// Worker concurrency for the notifications queue
    pub notifications_concurrency: usize,
    /// Worker concurrency for the reports queue
    pub reports_concurrency: usize,
    /// Worker concurrency for the bulk queue
    pub bulk_concurrency: usize,
    /// Maximum queued items per class before enqueue fails closed
    pub capacity: usize,
    /// Default attempt bound per work item
    pub default_max_attempts: u32,
    /// Retry delays for email delivery, seconds
    pub email_backoff_secs: Vec<u64>,
    /// Retry delays for push/broadcast delivery, seconds
    pub notification_backoff_secs: Vec<u64>,
    /// Worker poll interval, milliseconds
    pub poll_interval_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            critical_concurrency: 4,
            notifications_concurrency: 4,
            reports_concurrency: 2,
            bulk_concurrency: 1,
            capacity: 1_024,
            default_max_attempts: 3,
            email_backoff_secs: vec![30, 60, 120],
            notification_backoff_secs: vec![60, 120, 300],
            poll_interval_ms: 250,
        }
    }
}

impl QueueSettings {
    /// Concurrency limit for one queue class
    ///
    /// Limits are independent so a backlog in one class cannot starve
    /// another.
    pub fn concurrency_for(&self, class: QueueClass) -> usize {
        let limit = match class {
            QueueClass::Critical => self.critical_concurrency,
            QueueClass::Notifications => self.notifications_concurrency,
            QueueClass::Reports => self.reports_concurrency,
            QueueClass::Bulk => self.bulk_concurrency,
        };
        limit.max(1)
    }

    /// Worker poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings for the response cache layer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL safety net, seconds
    pub ttl_secs: u64,
    /// Maximum number of cached responses
    pub max_entries: usize,
    /// Responses above this size are never cached
    pub max_body_bytes: usize,
    /// Route prefixes eligible for caching
    pub cacheable_routes: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 2_048,
            max_body_bytes: 1024 * 1024,
            cacheable_routes: vec![
                "control-lists".to_string(),
                "work-sessions".to_string(),
                "dashboard".to_string(),
            ],
        }
    }
}

impl CacheSettings {
    /// TTL safety net
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
