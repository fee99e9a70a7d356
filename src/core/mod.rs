//! Core dispatch abstractions: tasks, the priority heap, quota buckets and
//! the dispatch loop.

pub mod audit;
pub mod bucket;
pub mod dispatcher;
pub mod error;
pub mod heap;
pub mod task;
pub mod transport;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use bucket::{
    Admission, BucketSnapshot, DualResourceBucket, ExhaustedPools, TimedResourceBucket, WaitPlan,
    MIN_CYCLE,
};
pub use dispatcher::{
    CycleOutcome, DispatchStats, Dispatcher, DispatcherState, SharedAuditSink, Spawn,
    TaskQueueHandle, REQUEST_COST,
};
pub use error::{AppResult, DispatchError, TransportError};
pub use heap::PriorityHeap;
pub use task::{PendingTask, TaskId, TaskPayload, MAX_PRIORITY, MIN_PRIORITY};
pub use transport::{TaskTransport, TransportResponse};
