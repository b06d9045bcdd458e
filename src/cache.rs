// Copyright 2025 Cowboy AI, LLC.

//! Response cache layer
//!
//! Caches read responses for an allow-list of idempotent routes, keyed by
//! `(route, normalized query, tenant, principal)` so one principal's
//! personalized view can never leak to another. TTL is a safety net; the
//! primary invalidation path is event-driven by `(tenant, resource_class)`
//! tag, so a state transition is visible to subsequent reads well before
//! TTL expiry.
//!
//! Entries are immutable once written; updates replace the whole entry.

use crate::config::CacheSettings;
use crate::context::TenantContext;
use crate::entity::{ResourceClass, TenantId};
use crate::errors::WorkflowResult;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Name of the header carrying cache hit/miss status
pub const CACHE_STATUS_HEADER: &str = "X-Cache-Status";

/// A read request as seen by the cache layer
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// HTTP method; only GET is cacheable
    pub method: String,
    /// Route path, e.g. `control-lists`
    pub route: String,
    /// Query parameters, unordered
    pub query: Vec<(String, String)>,
    /// The acting principal's context
    pub ctx: TenantContext,
}

impl ReadRequest {
    /// A GET request for a route
    pub fn get(route: impl Into<String>, ctx: TenantContext) -> Self {
        Self {
            method: "GET".to_string(),
            route: route.into(),
            query: Vec::new(),
            ctx,
        }
    }

    /// Add a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// A response as stored and replayed by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Response headers
    pub headers: Vec<(String, String)>,
}

impl CachedResponse {
    /// A 200 response with a body and no headers
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Read a header value, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn with_cache_status(mut self, status: &'static str) -> Self {
        self.headers
            .retain(|(key, _)| !key.eq_ignore_ascii_case(CACHE_STATUS_HEADER));
        self.headers
            .push((CACHE_STATUS_HEADER.to_string(), status.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => self.created_at + ttl <= now,
            Err(_) => false,
        }
    }
}

/// Event-invalidated LRU cache of read responses
pub struct ResponseCache {
    entries: Arc<RwLock<LruCache<String, CacheEntry>>>,
    tags: Arc<RwLock<IndexMap<(TenantId, ResourceClass), HashSet<String>>>>,
    settings: CacheSettings,
}

impl ResponseCache {
    /// Create a cache with the given settings
    pub fn new(settings: CacheSettings) -> Self {
        let capacity =
            NonZeroUsize::new(settings.max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            tags: Arc::new(RwLock::new(IndexMap::new())),
            settings,
        }
    }

    /// Serve a read from cache, or compute and store it
    pub async fn get_or_compute<F, Fut>(
        &self,
        request: &ReadRequest,
        compute: F,
    ) -> WorkflowResult<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WorkflowResult<CachedResponse>>,
    {
        self.get_or_compute_at(Utc::now(), request, compute).await
    }

    /// [`Self::get_or_compute`] with an injected clock
    pub async fn get_or_compute_at<F, Fut>(
        &self,
        now: DateTime<Utc>,
        request: &ReadRequest,
        compute: F,
    ) -> WorkflowResult<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WorkflowResult<CachedResponse>>,
    {
        if !self.cacheable_request(request) {
            return compute().await;
        }

        let key = self.cache_key(request);

        {
            let mut entries = self.entries.write().await;
            match entries.get(&key) {
                Some(entry) if !entry.expired(now) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(entry.response.clone().with_cache_status("HIT"));
                }
                Some(_) => {
                    entries.pop(&key);
                }
                None => {}
            }
        }

        let response = compute().await?;

        if self.should_store(&response) {
            let entry = CacheEntry {
                response: response.clone(),
                created_at: now,
                ttl: self.settings.ttl(),
            };
            self.entries.write().await.put(key.clone(), entry);

            if let Some(tenant_id) = request.ctx.tenant_id {
                let mut tags = self.tags.write().await;
                for class in Self::classes_for_route(&request.route) {
                    tags.entry((tenant_id, class))
                        .or_default()
                        .insert(key.clone());
                }
            }
            debug!(key = %key, route = %request.route, "Response cached");
        }

        Ok(response.with_cache_status("MISS"))
    }

    /// Drop every entry tagged `(tenant, resource_class)`
    ///
    /// Called by the dispatch subsystem's invalidation consumer whenever a
    /// domain event for that resource class occurs.
    pub async fn invalidate(&self, tenant_id: TenantId, resource_class: ResourceClass) {
        let keys = {
            let mut tags = self.tags.write().await;
            tags.swap_remove(&(tenant_id, resource_class))
                .unwrap_or_default()
        };
        if keys.is_empty() {
            return;
        }

        let mut entries = self.entries.write().await;
        for key in &keys {
            entries.pop(key);
        }
        debug!(
            tenant_id = %tenant_id,
            resource_class = %resource_class,
            invalidated = keys.len(),
            "Cache entries invalidated"
        );
    }

    /// The cache key for a request
    ///
    /// A hash of `(route, normalized query, tenant, principal)`; the
    /// principal keeps personalized views private.
    pub fn cache_key(&self, request: &ReadRequest) -> String {
        let mut query = request.query.clone();
        query.sort();

        let mut hasher = DefaultHasher::new();
        request.route.hash(&mut hasher);
        query.hash(&mut hasher);
        request.ctx.tenant_id.map(|t| t.0).hash(&mut hasher);
        request.ctx.principal_id.0.hash(&mut hasher);
        format!("api_response:{}:{:016x}", request.route, hasher.finish())
    }

    fn cacheable_request(&self, request: &ReadRequest) -> bool {
        request.method == "GET"
            && self
                .settings
                .cacheable_routes
                .iter()
                .any(|prefix| request.route.starts_with(prefix.as_str()))
    }

    fn should_store(&self, response: &CachedResponse) -> bool {
        if !(200..300).contains(&response.status) {
            return false;
        }
        if let Some(cache_control) = response.header("Cache-Control") {
            if cache_control.contains("no-cache") || cache_control.contains("no-store") {
                return false;
            }
        }
        response.body.len() <= self.settings.max_body_bytes
    }

    fn classes_for_route(route: &str) -> Vec<ResourceClass> {
        if route.starts_with("control-lists") {
            vec![ResourceClass::ControlLists]
        } else if route.starts_with("work-sessions") {
            vec![ResourceClass::WorkSessions]
        } else if route.starts_with("dashboard") {
            // Dashboards aggregate both workflow classes
            vec![ResourceClass::ControlLists, ResourceClass::WorkSessions]
        } else {
            vec![]
        }
    }
}
