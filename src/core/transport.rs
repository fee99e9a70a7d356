//! Outbound delivery capability consumed by the dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{TaskPayload, TransportError};

/// Successful downstream answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, treated as opaque JSON.
    pub body: serde_json::Value,
}

/// Sends one task to its target.
///
/// Implementations POST `payload` as JSON to `target` and return the status
/// and decoded body. Timeouts are the implementation's concern; the
/// dispatcher only races the call against shutdown.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_dispatcher::core::{
///     TaskPayload, TaskTransport, TransportError, TransportResponse,
/// };
///
/// struct Echo;
///
/// #[async_trait]
/// impl TaskTransport for Echo {
///     async fn send(&self, _target: &str, payload: TaskPayload)
///         -> Result<TransportResponse, TransportError>
///     {
///         Ok(TransportResponse {
///             status: 200,
///             body: serde_json::json!({ "tokens": payload.tokens }),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait TaskTransport: Send + Sync + 'static {
    /// Deliver `payload` to `target`.
    async fn send(
        &self,
        target: &str,
        payload: TaskPayload,
    ) -> Result<TransportResponse, TransportError>;
}
