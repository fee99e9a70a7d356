//! API-facing status models for exposing a dispatcher to an outer layer.

use serde::{Deserialize, Serialize};

use crate::core::{
    BucketSnapshot, DispatchStats, Dispatcher, DispatcherState, PendingTask, TaskTransport,
};

/// Point-in-time view of a dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStatus {
    /// Loop state.
    pub state: DispatcherState,
    /// Number of queued tasks.
    pub queued: usize,
    /// Highest-priority task, if any.
    pub next: Option<PendingTask>,
    /// Quota left in both pools.
    pub buckets: BucketSnapshot,
    /// Lifetime counters.
    pub stats: DispatchStats,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Collect a status snapshot.
pub fn status<T: TaskTransport>(dispatcher: &Dispatcher<T>) -> DispatcherStatus {
    let queue = dispatcher.queue();
    DispatcherStatus {
        state: dispatcher.state(),
        queued: queue.len(),
        next: queue.peek(),
        buckets: dispatcher.buckets(),
        stats: dispatcher.stats(),
    }
}

/// Healthy until shutdown has been requested.
pub fn health<T: TaskTransport>(dispatcher: &Dispatcher<T>) -> Health {
    Health {
        ok: !dispatcher.shutdown_token().is_cancelled(),
    }
}
