//! Scheduler behaviour across cache, deduplication, concurrency and tiers.

mod common;

use common::{policy_with, unavailable, MockTransport};
use futures::future::join_all;
use seaworthy::adapters::memory::InMemoryActionStore;
use seaworthy::domain::models::{
    ConnectionTier, NetworkSignals, OfflineQueueConfig, RequestOutcome, RequestPriority,
    ResponsePayload, ScheduledRequest, TargetDescriptor,
};
use seaworthy::services::{
    AdaptiveConfigResolver, ConnectionMonitor, FixedJitter, OfflineActionQueue, RequestScheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready_ok, task};

fn scheduler_for(monitor: &ConnectionMonitor, transport: Arc<MockTransport>) -> RequestScheduler {
    RequestScheduler::builder(monitor.clone(), transport)
        .jitter(Arc::new(FixedJitter(0.0)))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_identical_reads_share_one_dispatch() {
    let transport = MockTransport::with_latency(Duration::from_millis(200), |_| {
        Ok(ResponsePayload::new(200, r#"{"wind":12}"#))
    });
    let monitor = ConnectionMonitor::new(NetworkSignals::online());
    let scheduler = scheduler_for(&monitor, Arc::clone(&transport));

    let reads = (0..5).map(|_| {
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .submit(ScheduledRequest::read(TargetDescriptor::get("/weather?port=brest")))
                .await
        }
    });
    let outcomes = join_all(reads).await;

    assert_eq!(transport.call_count(), 1);
    for outcome in outcomes {
        let payload = outcome.unwrap().payload().cloned().unwrap();
        assert_eq!(payload.body, br#"{"wind":12}"#);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_tier_limit() {
    let transport = MockTransport::with_latency(Duration::from_millis(100), |_| {
        Ok(ResponsePayload::new(204, ""))
    });
    // Slow tier: two requests at a time.
    let monitor = ConnectionMonitor::new(NetworkSignals::online().with_link(
        seaworthy::domain::models::LinkQuality {
            downlink_mbps: Some(0.5),
            ..Default::default()
        },
    ));
    assert_eq!(monitor.tier(), ConnectionTier::Slow);
    let scheduler = scheduler_for(&monitor, Arc::clone(&transport));

    let writes = (0..8).map(|i| {
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .submit(ScheduledRequest::mutation(TargetDescriptor::post(format!("/log/{i}"))))
                .await
        }
    });
    let outcomes = join_all(writes).await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(transport.call_count(), 8);
    assert_eq!(transport.peak_in_flight(), 2);
    assert_eq!(scheduler.stats().peak_dispatched, 2);
    assert_eq!(scheduler.stats().dispatched, 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_entry_triggers_fresh_dispatch() {
    let transport = MockTransport::ok();
    let monitor = ConnectionMonitor::new(NetworkSignals::online());
    let scheduler = scheduler_for(&monitor, Arc::clone(&transport));
    let read = || ScheduledRequest::read(TargetDescriptor::get("/tides"));

    let first = scheduler.submit(read()).await.unwrap();
    assert!(matches!(first, RequestOutcome::Delivered { from_cache: false, .. }));

    let second = scheduler.submit(read()).await.unwrap();
    assert!(matches!(second, RequestOutcome::Delivered { from_cache: true, .. }));
    assert_eq!(transport.call_count(), 1);

    // Moderate tier keeps reads for two minutes.
    tokio::time::advance(Duration::from_secs(121)).await;

    let third = scheduler.submit(read()).await.unwrap();
    assert!(matches!(third, RequestOutcome::Delivered { from_cache: false, .. }));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_queued_requests_leave_in_priority_order() {
    let transport = MockTransport::with_latency(Duration::from_millis(50), |_| {
        Ok(ResponsePayload::new(200, "ok"))
    });
    let monitor = ConnectionMonitor::new(NetworkSignals::online());
    let scheduler = RequestScheduler::builder(monitor.clone(), Arc::clone(&transport) as _)
        .resolver(AdaptiveConfigResolver::with_table(policy_with(
            ConnectionTier::Moderate,
            |row| row.max_concurrent_requests = 1,
        )))
        .build();

    let submit = |endpoint: &'static str, priority: RequestPriority| {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .submit(ScheduledRequest::mutation(TargetDescriptor::post(endpoint)).with_priority(priority))
                .await
        })
    };

    let blocker = submit("/blocker", RequestPriority::Low);
    tokio::time::sleep(Duration::from_millis(1)).await;

    let low = submit("/low", RequestPriority::Low);
    let normal = submit("/normal", RequestPriority::Normal);
    let critical = submit("/critical", RequestPriority::Critical);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(scheduler.stats().queued, 3);

    for handle in [blocker, low, normal, critical] {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(
        transport.endpoints(),
        vec!["/blocker", "/critical", "/normal", "/low"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_offline_holds_requests_until_link_returns() {
    let transport = MockTransport::ok();
    let monitor = ConnectionMonitor::new(NetworkSignals::offline());
    let scheduler = scheduler_for(&monitor, Arc::clone(&transport));

    let mut pending = task::spawn(scheduler.submit(ScheduledRequest::mutation(TargetDescriptor::post("/log"))));
    assert_pending!(pending.poll());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!pending.is_woken());
    assert_eq!(transport.call_count(), 0);
    assert_eq!(scheduler.stats().queued, 1);

    monitor.report(NetworkSignals::online());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(pending.is_woken());
    let outcome = assert_ready_ok!(pending.poll());
    assert_eq!(outcome.payload().unwrap().status, 200);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_durable_request_is_deferred() {
    let transport = MockTransport::new(|_| Err(unavailable()));
    let monitor = ConnectionMonitor::new(NetworkSignals::online());
    let queue = Arc::new(
        OfflineActionQueue::open(Arc::new(InMemoryActionStore::new()), &OfflineQueueConfig::default())
            .await
            .unwrap(),
    );
    let scheduler = RequestScheduler::builder(monitor, Arc::clone(&transport) as _)
        .offline_queue(queue.clone())
        .jitter(Arc::new(FixedJitter(0.0)))
        .build();

    let request = ScheduledRequest::mutation(
        TargetDescriptor::post("/maintenance").with_json(&serde_json::json!({"hull": "ok"})),
    )
    .durable();
    let idempotency_key = request.idempotency_key.clone();

    let outcome = scheduler.submit(request).await.unwrap();
    let RequestOutcome::Deferred { action_id } = &outcome else {
        panic!("expected a deferred outcome, got {outcome:?}");
    };

    // Moderate tier spends four attempts before handing off.
    assert_eq!(transport.call_count(), 4);
    let action = queue.get(*action_id).await.unwrap().unwrap();
    assert_eq!(action.idempotency_key, idempotency_key);
    assert!(action.last_error.as_deref().unwrap().contains("503"));
    assert_eq!(*queue.pending().borrow(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_carries_the_same_idempotency_key() {
    let transport = MockTransport::new({
        let failures = std::sync::atomic::AtomicUsize::new(0);
        move |_| {
            if failures.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(ResponsePayload::new(201, "created"))
            }
        }
    });
    let monitor = ConnectionMonitor::new(NetworkSignals::online());
    let scheduler = scheduler_for(&monitor, Arc::clone(&transport));

    let request = ScheduledRequest::mutation(TargetDescriptor::post("/orders")).with_idempotency_key("order-17");
    scheduler.submit(request).await.unwrap();

    let keys: Vec<_> = transport
        .calls()
        .into_iter()
        .map(|call| call.headers.get("Idempotency-Key").cloned())
        .collect();
    assert_eq!(keys, vec![Some("order-17".to_string()); 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_offline_hand_off_keeps_submission_order() {
    let expected: Vec<String> = (0..10).map(|i| format!("/m{i}")).collect();

    for _ in 0..5 {
        let transport = MockTransport::with_latency(Duration::from_millis(300), |_| {
            Ok(ResponsePayload::new(204, ""))
        });
        let monitor = ConnectionMonitor::new(NetworkSignals::online());
        let queue = Arc::new(
            OfflineActionQueue::open(Arc::new(InMemoryActionStore::new()), &OfflineQueueConfig::default())
                .await
                .unwrap(),
        );
        let scheduler = RequestScheduler::builder(monitor.clone(), transport)
            .resolver(AdaptiveConfigResolver::with_table(policy_with(
                ConnectionTier::Moderate,
                |row| row.max_concurrent_requests = 1,
            )))
            .offline_queue(queue.clone())
            .jitter(Arc::new(FixedJitter(0.0)))
            .build();

        // Occupies the only slot so every durable write stays queued.
        let blocker = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .submit(ScheduledRequest::mutation(TargetDescriptor::post("/blocker")))
                    .await
            })
        };
        while scheduler.stats().dispatched == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let mut writes = Vec::new();
        for (i, endpoint) in expected.iter().enumerate() {
            let request = ScheduledRequest::mutation(TargetDescriptor::post(endpoint.as_str())).durable();
            let submitter = scheduler.clone();
            writes.push(tokio::spawn(async move { submitter.submit(request).await }));
            while scheduler.stats().queued < i + 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        monitor.set_online(false);

        for write in writes {
            assert!(write.await.unwrap().unwrap().is_deferred());
        }
        let listed: Vec<String> = queue
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|action| action.endpoint)
            .collect();
        assert_eq!(listed, expected);

        blocker.await.unwrap().unwrap();
    }
}
