//! Tests for error types

use prometheus_dispatcher::core::{DispatchError, TransportError};

#[test]
fn test_empty_queue_error() {
    let err = DispatchError::EmptyQueue;
    assert_eq!(format!("{}", err), "queue is empty");
}

#[test]
fn test_invalid_task_error() {
    let err = DispatchError::InvalidTask("priority 12 out of range".to_string());
    assert_eq!(format!("{}", err), "invalid task: priority 12 out of range");
}

#[test]
fn test_index_out_of_bounds_error() {
    let err = DispatchError::IndexOutOfBounds { index: 4, len: 2 };
    assert_eq!(format!("{}", err), "index 4 out of bounds for queue of length 2");
}

#[test]
fn test_quota_exceeded_error() {
    let err = DispatchError::QuotaExceeded {
        client: "10.0.0.7".to_string(),
        retry_after_ms: 1500,
    };
    assert_eq!(format!("{}", err), "quota exceeded for `10.0.0.7`, retry in 1500 ms");
}

#[test]
fn test_transport_error_converts() {
    let err: DispatchError = TransportError::Status {
        status: 503,
        body: "overloaded".to_string(),
    }
    .into();
    assert_eq!(
        format!("{}", err),
        "transport error: downstream returned status 503: overloaded"
    );
}

#[test]
fn test_cancelled_error() {
    assert_eq!(format!("{}", DispatchError::Cancelled), "dispatch cancelled");
}
