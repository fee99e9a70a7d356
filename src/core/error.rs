//! Error types for dispatcher operations.

use thiserror::Error;

/// Failures reported by a [`TaskTransport`](crate::core::TaskTransport).
///
/// Variants carry rendered messages rather than source errors so that the
/// error can be cloned into audit events and dispatch outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),
    /// Connect or read timeout elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Downstream answered with a non-success status.
    #[error("downstream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// Response body was not valid JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// Any other request failure.
    #[error("request failed: {0}")]
    Request(String),
}

/// Errors produced by dispatcher components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// `pop`/`peek` on an empty heap.
    #[error("queue is empty")]
    EmptyQueue,
    /// Task failed construction-time or submission-time validation.
    #[error("invalid task: {0}")]
    InvalidTask(String),
    /// Configuration values rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Heap index does not refer to a queued task.
    #[error("index {index} out of bounds for queue of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Queue length at the time of the call.
        len: usize,
    },
    /// A per-client bucket cannot pay for the request in this cycle.
    #[error("quota exceeded for `{client}`, retry in {retry_after_ms} ms")]
    QuotaExceeded {
        /// Client key.
        client: String,
        /// Time until the blocking pool refills.
        retry_after_ms: u64,
    },
    /// Dispatch failed in the transport layer.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Shutdown was requested while waiting or sending.
    #[error("dispatch cancelled")]
    Cancelled,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
