//! Tests for tokio spawner utilities and status models

use prometheus_dispatcher::builders::DispatcherBuilder;
use prometheus_dispatcher::config::DispatcherConfig;
use prometheus_dispatcher::core::{DispatcherState, PendingTask, Spawn};
use prometheus_dispatcher::runtime::{health, status, TokioSpawner};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_status_reports_queue_and_quota() {
    let dispatcher = DispatcherBuilder::new("status", DispatcherConfig::new(3, 30))
        .build_http()
        .unwrap();
    let id = dispatcher
        .submit(PendingTask::new(4, "http://localhost:9/post", 12, 6).unwrap())
        .unwrap();

    let snapshot = status(&dispatcher);
    assert_eq!(snapshot.state, DispatcherState::Idle);
    assert_eq!(snapshot.queued, 1);
    assert_eq!(snapshot.next.as_ref().map(PendingTask::id), Some(id));
    assert_eq!(snapshot.buckets.tokens_left, 30);
    assert_eq!(snapshot.stats.dispatched, 0);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["state"], "idle");
    assert_eq!(json["buckets"]["requests_left"], 3);
}

#[tokio::test]
async fn test_health_flips_on_shutdown() {
    let dispatcher = DispatcherBuilder::new("health", DispatcherConfig::new(1, 1))
        .build_http()
        .unwrap();
    assert!(health(&dispatcher).ok);
    dispatcher.shutdown();
    assert!(!health(&dispatcher).ok);
}
