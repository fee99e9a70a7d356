//! Tests for audit sink

use prometheus_dispatcher::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, PendingTask,
};

fn task(priority: u8) -> PendingTask {
    PendingTask::single_shot(priority, "http://localhost:8000/post", 2).unwrap()
}

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let t = task(3);

    sink.record(build_audit_event(&t, AuditAction::Submit, None));
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].task_id, t.id());
    assert_eq!(events[0].priority, 3);
    assert_eq!(events[0].action, AuditAction::Submit);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let (a, b, c) = (task(1), task(2), task(3));

    sink.record(build_audit_event(&a, AuditAction::Submit, None));
    sink.record(build_audit_event(&b, AuditAction::Submit, None));
    sink.record(build_audit_event(&c, AuditAction::Submit, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, b.id()); // oldest dropped
    assert_eq!(events[1].task_id, c.id());
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(&task(1), AuditAction::Wait, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let t = task(5);
    let event = build_audit_event(&t, AuditAction::Retain, Some("connect failed".to_string()));
    assert_eq!(event.task_id, t.id());
    assert_eq!(event.action, AuditAction::Retain);
    assert_eq!(event.detail.as_deref(), Some("connect failed"));
    assert!(event.created_at_ms > 0);
}

#[test]
fn test_audit_action_serializes_snake_case() {
    let json = serde_json::to_string(&AuditAction::Dispatch).unwrap();
    assert_eq!(json, "\"dispatch\"");
}
