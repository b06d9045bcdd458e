//! Cache coherence tests: event-driven invalidation closes the staleness
//! window before the TTL safety net ever matters.

use chrono::Utc;
use std::sync::Arc;

use opsflow::{
    CachedResponse, Consumers, ControlList, ControlListStatus, Dispatcher, EngineConfig,
    EntityStore, EventRouter, InMemoryStore, LockRegistry, NullDeliverer, Principal, QueueClass,
    QueueSettings, ReadRequest, ResponseCache, Role, Session, StaticDirectory, TenantContext,
    TenantContextResolver, TenantId, TransitionCoordinator, TransitionPayload, WorkQueue,
    WorkerPool, WorkflowEntity, CACHE_STATUS_HEADER,
};

struct Stack {
    tenant: TenantId,
    owner: Principal,
    manager: Principal,
    store: InMemoryStore<ControlList>,
    cache: Arc<ResponseCache>,
    coordinator: TransitionCoordinator<ControlList>,
    workers: WorkerPool,
}

fn stack() -> Stack {
    let tenant = TenantId::new();
    let owner = Principal::new(tenant, Role::Operator);
    let manager = Principal::new(tenant, Role::Manager);

    let directory = Arc::new(StaticDirectory::new());
    directory.register(owner.clone());
    directory.register(manager.clone());

    let config = EngineConfig::default();
    let store = InMemoryStore::<ControlList>::new();
    let cache = Arc::new(ResponseCache::new(config.cache.clone()));
    let queue = Arc::new(WorkQueue::new(config.queues.capacity));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        EventRouter::new(directory, config.queues.default_max_attempts),
        config.enqueue_timeout(),
    ));
    let coordinator = TransitionCoordinator::new(
        Arc::new(store.clone()),
        dispatcher,
        Arc::new(LockRegistry::new()),
        config,
    );
    let workers = WorkerPool::new(
        queue,
        Arc::new(Consumers::new(
            Arc::new(NullDeliverer),
            Arc::new(NullDeliverer),
            Arc::new(NullDeliverer),
            Arc::new(NullDeliverer),
            Arc::clone(&cache),
        )),
        QueueSettings::default(),
    );

    Stack {
        tenant,
        owner,
        manager,
        store,
        cache,
        coordinator,
        workers,
    }
}

fn resolve(principal: &Principal) -> TenantContext {
    TenantContextResolver::new()
        .resolve(&Session::authenticated(principal.clone()), Utc::now())
        .expect("resolve context")
}

async fn read_status(stack: &Stack, reader: &Principal, list: &ControlList) -> String {
    let request = ReadRequest::get("control-lists", resolve(reader))
        .with_query("id", list.entity_id().to_string());
    let store = stack.store.clone();
    let tenant = stack.tenant;
    let id = list.entity_id();
    let response = stack
        .cache
        .get_or_compute(&request, || async move {
            let current = store
                .load(tenant, id)
                .await?
                .expect("list exists for read");
            Ok(CachedResponse::ok(serde_json::to_string(
                &current.status,
            )?))
        })
        .await
        .expect("read");
    response.body
}

/// Scenario 6 / P6: a cached read reflects an approval as soon as the
/// invalidation consumer has run, long before TTL expiry.
#[tokio::test]
async fn approval_invalidates_cached_reads() {
    let s = stack();
    let list = ControlList::new(s.tenant, s.owner.id, "CL-500", "Lathe check", Utc::now());
    s.coordinator
        .create(&list, &resolve(&s.owner))
        .await
        .expect("create");

    // Prime the cache while the list is pending
    assert_eq!(read_status(&s, &s.manager, &list).await, "\"pending\"");

    s.coordinator
        .transition(
            s.tenant,
            list.entity_id(),
            ControlListStatus::Completed,
            &resolve(&s.owner),
            &TransitionPayload::new(),
        )
        .await
        .expect("complete");
    s.coordinator
        .transition(
            s.tenant,
            list.entity_id(),
            ControlListStatus::Approved,
            &resolve(&s.manager),
            &TransitionPayload::new(),
        )
        .await
        .expect("approve");

    // The dedicated invalidation consumer drains the critical queue
    let processed = s.workers.drain_due(QueueClass::Critical, Utc::now()).await;
    assert!(processed >= 2, "one invalidation per transition");

    // The same read now recomputes instead of replaying the pre-event
    // payload
    assert_eq!(read_status(&s, &s.manager, &list).await, "\"approved\"");
}

/// Without the event-driven path a cached read would replay stale state;
/// this pins down that the HIT actually comes from the cache.
#[tokio::test]
async fn unprocessed_invalidation_means_stale_hit() {
    let s = stack();
    let list = ControlList::new(s.tenant, s.owner.id, "CL-501", "Mill check", Utc::now());
    s.coordinator
        .create(&list, &resolve(&s.owner))
        .await
        .expect("create");

    assert_eq!(read_status(&s, &s.manager, &list).await, "\"pending\"");

    s.coordinator
        .transition(
            s.tenant,
            list.entity_id(),
            ControlListStatus::Completed,
            &resolve(&s.owner),
            &TransitionPayload::new(),
        )
        .await
        .expect("complete");

    // Queue not drained yet: the stale entry is still served
    assert_eq!(read_status(&s, &s.manager, &list).await, "\"pending\"");

    s.workers.drain_due(QueueClass::Critical, Utc::now()).await;
    assert_eq!(read_status(&s, &s.manager, &list).await, "\"completed\"");
}

/// Cached views stay per-principal even within one tenant.
#[tokio::test]
async fn cache_does_not_leak_across_principals() {
    let s = stack();
    let ctx_owner = resolve(&s.owner);
    let ctx_manager = resolve(&s.manager);

    let owner_request = ReadRequest::get("dashboard", ctx_owner);
    let manager_request = ReadRequest::get("dashboard", ctx_manager);

    let owner_view = s
        .cache
        .get_or_compute(&owner_request, || async {
            Ok(CachedResponse::ok("operator dashboard"))
        })
        .await
        .expect("owner read");
    assert_eq!(owner_view.header(CACHE_STATUS_HEADER), Some("MISS"));

    // The manager's first read must not see the operator's payload
    let manager_view = s
        .cache
        .get_or_compute(&manager_request, || async {
            Ok(CachedResponse::ok("manager dashboard"))
        })
        .await
        .expect("manager read");
    assert_eq!(manager_view.header(CACHE_STATUS_HEADER), Some("MISS"));
    assert_eq!(manager_view.body, "manager dashboard");
}
