//! Tests for utility functions

use prometheus_dispatcher::util::clock::now_ms;

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_dispatcher::util::telemetry::init_tracing();
    prometheus_dispatcher::util::telemetry::init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
