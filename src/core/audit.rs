//! Audit sink for dispatcher events.
//!
//! Transport failures, quota waits and dispatches are recorded here so that
//! retained tasks are visible even though the loop keeps running.

use std::collections::VecDeque;

use crate::core::{PendingTask, TaskId};
use crate::util::clock::now_ms;

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Accepted into the queue.
    Submit,
    /// Dispatcher suspended for quota.
    Wait,
    /// Delivered and removed from the queue.
    Dispatch,
    /// Delivery failed; task kept in the queue.
    Retain,
    /// Priority lowered after repeated failures.
    Demote,
    /// Shutdown interrupted a wait or send.
    Cancel,
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Related task identifier.
    pub task_id: TaskId,
    /// Task priority at the time of the event.
    pub priority: u8,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context, e.g. a transport error message.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Build an event stamped with the current time.
#[must_use]
pub fn build_audit_event(
    task: &PendingTask,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        task_id: task.id(),
        priority: task.priority(),
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
