//! Tests for builder modules

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_dispatcher::builders::{build_dispatchers, DispatcherBuilder};
use prometheus_dispatcher::config::DispatcherConfig;
use prometheus_dispatcher::core::{
    AuditAction, DispatchError, InMemoryAuditSink, PendingTask, TransportError,
};
use prometheus_dispatcher::infra::HttpTransport;

#[test]
fn test_dispatcher_builder_accessors() {
    let builder = DispatcherBuilder::new("openai", DispatcherConfig::new(60, 90_000));
    assert_eq!(builder.name(), "openai");
    assert_eq!(builder.config().request_capacity, 60);
    assert_eq!(builder.config().token_capacity, 90_000);
}

#[tokio::test]
async fn test_build_http_dispatcher() {
    let dispatcher = DispatcherBuilder::new("local", DispatcherConfig::new(2, 10))
        .build_http()
        .unwrap();
    assert_eq!(dispatcher.buckets().requests_left, 2);
    assert_eq!(dispatcher.buckets().tokens_left, 10);
    assert!(dispatcher.queue().is_empty());
}

#[tokio::test]
async fn test_builder_attaches_audit_sink() {
    let sink = Arc::new(Mutex::new(InMemoryAuditSink::new(8)));
    let dispatcher = DispatcherBuilder::new("audited", DispatcherConfig::new(1, 5))
        .with_audit(sink.clone())
        .build_http()
        .unwrap();
    dispatcher
        .submit(PendingTask::single_shot(1, "", 1).unwrap())
        .unwrap();
    assert_eq!(sink.lock().events()[0].action, AuditAction::Submit);
}

#[test]
fn test_builder_names_invalid_config() {
    let err = DispatcherBuilder::new("broken", DispatcherConfig::new(0, 5))
        .build_http()
        .err()
        .unwrap();
    match err {
        DispatchError::InvalidConfig(msg) => assert!(msg.contains("broken")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_build_dispatchers_from_map() {
    let mut configs = HashMap::new();
    configs.insert("fast".to_string(), DispatcherConfig::new(100, 1_000));
    configs.insert("slow".to_string(), DispatcherConfig::new(1, 10));

    let dispatchers = build_dispatchers(&configs, |_, cfg| {
        HttpTransport::from_config(cfg).map_err(DispatchError::from)
    })
    .unwrap();
    assert_eq!(dispatchers.len(), 2);
    assert_eq!(dispatchers["slow"].buckets().request_capacity, 1);
}

#[test]
fn test_build_dispatchers_propagates_factory_error() {
    let mut configs = HashMap::new();
    configs.insert("x".to_string(), DispatcherConfig::new(1, 1));
    let result = build_dispatchers::<HttpTransport, _>(&configs, |name, _| {
        Err(TransportError::Request(format!("no client for {name}")).into())
    });
    assert!(matches!(result, Err(DispatchError::Transport(_))));
}

#[test]
fn test_build_dispatchers_requires_one() {
    let configs = HashMap::new();
    let result = build_dispatchers(&configs, |_, cfg| {
        HttpTransport::from_config(cfg).map_err(DispatchError::from)
    });
    assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
}
