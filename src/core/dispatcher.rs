//! Rate-limited priority dispatcher.
//!
//! One dispatch loop per [`Dispatcher`]. Each cycle peeks the top task, makes
//! sure both quota pools can pay for it (suspending until the relevant refill
//! otherwise), sends it through the injected [`TaskTransport`], and only on
//! success charges the buckets and removes the task. A failed send leaves
//! queue and buckets untouched.
//!
//! ```text
//! Idle -> Admitting -> [Waiting ->] Sending -> Committing | Retaining -> Admitting
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::core::{
    build_audit_event, Admission, AuditAction, AuditSink, BucketSnapshot, DispatchError,
    DualResourceBucket, PendingTask, PriorityHeap, TaskId, TaskTransport, TransportError,
    TransportResponse,
};

/// Request-pool cost of every dispatch.
pub const REQUEST_COST: u32 = 1;

/// Audit sink shared between the dispatcher and its queue handles.
pub type SharedAuditSink = Arc<Mutex<dyn AuditSink>>;

/// Abstraction for spawning the dispatch loop on a runtime.
pub trait Spawn {
    /// Spawn a future that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Where the dispatch loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Queue empty.
    Idle,
    /// Checking quota for the top task.
    Admitting,
    /// Suspended until a pool refills.
    Waiting,
    /// Transport call in flight.
    Sending,
    /// Send succeeded; charging buckets and removing the task.
    Committing,
    /// Send failed; task kept queued.
    Retaining,
}

/// Counters accumulated over the dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Successful sends.
    pub dispatched: u64,
    /// Failed sends.
    pub failed: u64,
    /// Quota waits.
    pub waits: u64,
    /// Priority demotions after repeated failures.
    pub demotions: u64,
}

/// Result of one [`Dispatcher::run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing queued.
    Idle,
    /// Task delivered, charged and removed.
    Dispatched {
        /// The delivered task.
        task: PendingTask,
        /// Downstream answer.
        response: TransportResponse,
    },
    /// Delivery failed; task still queued.
    Retained {
        /// The task that stays queued.
        task: PendingTask,
        /// Why delivery failed.
        error: TransportError,
    },
    /// Shutdown interrupted the cycle.
    Cancelled,
}

/// Producer-side handle to a dispatcher's queue.
///
/// Cloning is cheap; all clones share the same heap. Every mutation takes a
/// short exclusive lock and wakes an idle [`Dispatcher::run`] loop.
#[derive(Clone)]
pub struct TaskQueueHandle {
    heap: Arc<Mutex<PriorityHeap>>,
    notify: Arc<Notify>,
    token_capacity: u32,
    audit: Option<SharedAuditSink>,
}

impl TaskQueueHandle {
    /// Queue a task.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidTask`] when the task's request tokens
    /// exceed the token pool's capacity, since it could never be admitted.
    pub fn submit(&self, task: PendingTask) -> Result<TaskId, DispatchError> {
        if task.request_tokens() > self.token_capacity {
            return Err(DispatchError::InvalidTask(format!(
                "request_tokens ({}) exceeds token capacity ({})",
                task.request_tokens(),
                self.token_capacity
            )));
        }
        let id = task.id();
        if let Some(audit) = &self.audit {
            audit
                .lock()
                .record(build_audit_event(&task, AuditAction::Submit, None));
        }
        tracing::debug!(task_id = %id, priority = task.priority(), "task submitted");
        self.heap.lock().push(task);
        self.notify.notify_one();
        Ok(id)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Copy of the highest-priority task.
    #[must_use]
    pub fn peek(&self) -> Option<PendingTask> {
        self.heap.lock().peek().ok().cloned()
    }

    /// Copy of every queued task, in heap order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingTask> {
        self.heap.lock().iter().cloned().collect()
    }

    /// Re-prioritise a queued task.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidTask`] when `id` is not queued or `priority` is
    /// out of range.
    pub fn modify_priority(&self, id: TaskId, priority: u8) -> Result<(), DispatchError> {
        let mut heap = self.heap.lock();
        let index = heap
            .position(id)
            .ok_or_else(|| DispatchError::InvalidTask(format!("task {id} is not queued")))?;
        heap.modify_priority(index, priority)
    }

    /// Lower a queued task's priority by one, reading the current value under
    /// the heap lock. Returns the new priority, or `None` when the task is
    /// gone or already at the floor.
    fn demote(&self, id: TaskId) -> Result<Option<u8>, DispatchError> {
        let mut heap = self.heap.lock();
        let Some(index) = heap.position(id) else {
            return Ok(None);
        };
        let current = heap.get(index).map_or(0, PendingTask::priority);
        if current == 0 {
            return Ok(None);
        }
        heap.modify_priority(index, current - 1)?;
        Ok(Some(current - 1))
    }

    fn remove(&self, id: TaskId) -> Option<PendingTask> {
        self.heap.lock().remove(id)
    }
}

/// Consecutive failures of the current top task.
#[derive(Debug, Default)]
struct FailureStreak {
    task: Option<TaskId>,
    count: u32,
}

/// Priority queue gated by request-rate and token-rate buckets.
pub struct Dispatcher<T: TaskTransport> {
    queue: TaskQueueHandle,
    bucket: Mutex<DualResourceBucket>,
    transport: T,
    margin: Duration,
    idle_poll: Duration,
    demote_after: Option<u32>,
    state: Mutex<DispatcherState>,
    stats: Mutex<DispatchStats>,
    streak: Mutex<FailureStreak>,
    /// Held for a whole cycle so sends never overlap.
    in_flight: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    audit: Option<SharedAuditSink>,
}

impl<T: TaskTransport> Dispatcher<T> {
    /// Create a dispatcher with an empty queue and full buckets.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when validation fails.
    pub fn new(config: &DispatcherConfig, transport: T) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        let bucket = DualResourceBucket::new(
            config.request_capacity,
            config.request_cycle(),
            config.token_capacity,
            config.token_cycle(),
        )?;
        Ok(Self {
            queue: TaskQueueHandle {
                heap: Arc::new(Mutex::new(PriorityHeap::new())),
                notify: Arc::new(Notify::new()),
                token_capacity: config.token_capacity,
                audit: None,
            },
            bucket: Mutex::new(bucket),
            transport,
            margin: config.safety_margin(),
            idle_poll: config.idle_poll(),
            demote_after: config.demote_after_failures,
            state: Mutex::new(DispatcherState::Idle),
            stats: Mutex::new(DispatchStats::default()),
            streak: Mutex::new(FailureStreak::default()),
            in_flight: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            audit: None,
        })
    }

    /// Attach an audit sink. Call before handing out queue handles.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAuditSink) -> Self {
        self.queue.audit = Some(Arc::clone(&audit));
        self.audit = Some(audit);
        self
    }

    /// Handle producers use to submit work.
    #[must_use]
    pub fn queue(&self) -> TaskQueueHandle {
        self.queue.clone()
    }

    /// Shorthand for `queue().submit(task)`.
    ///
    /// # Errors
    ///
    /// See [`TaskQueueHandle::submit`].
    pub fn submit(&self, task: PendingTask) -> Result<TaskId, DispatchError> {
        self.queue.submit(task)
    }

    /// Current loop state.
    #[must_use]
    pub fn state(&self) -> DispatcherState {
        *self.state.lock()
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        *self.stats.lock()
    }

    /// Remaining quota in both pools.
    #[must_use]
    pub fn buckets(&self) -> BucketSnapshot {
        self.bucket.lock().snapshot()
    }

    /// Injected transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown; pending waits and sends are abandoned.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run one admission/send cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.in_flight.lock().await;
        let outcome = self.cycle().await;
        let next = if self.queue.is_empty() {
            DispatcherState::Idle
        } else {
            DispatcherState::Admitting
        };
        self.set_state(next);
        tokio::task::yield_now().await;
        outcome
    }

    /// Dispatch until the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Cancelled`] if shutdown interrupts the drain.
    pub async fn drain(&self) -> Result<DispatchStats, DispatchError> {
        loop {
            match self.run_cycle().await {
                CycleOutcome::Idle => return Ok(self.stats()),
                CycleOutcome::Cancelled => return Err(DispatchError::Cancelled),
                CycleOutcome::Dispatched { .. } | CycleOutcome::Retained { .. } => {}
            }
        }
    }

    /// Dispatch until shutdown, sleeping while the queue is empty.
    pub async fn run(&self) -> DispatchStats {
        tracing::info!("dispatcher started");
        loop {
            match self.run_cycle().await {
                CycleOutcome::Cancelled => break,
                CycleOutcome::Idle => {
                    tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => break,
                        () = self.queue.notify.notified() => {}
                        () = tokio::time::sleep(self.idle_poll) => {}
                    }
                }
                CycleOutcome::Dispatched { .. } | CycleOutcome::Retained { .. } => {}
            }
        }
        let stats = self.stats();
        tracing::info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            waits = stats.waits,
            "dispatcher stopped"
        );
        stats
    }

    /// Start [`Dispatcher::run`] on `spawner`; cancel the returned token to stop it.
    pub fn spawn_on<S: Spawn>(self: Arc<Self>, spawner: &S) -> CancellationToken {
        let token = self.shutdown_token();
        spawner.spawn(async move {
            self.run().await;
        });
        token
    }

    async fn cycle(&self) -> CycleOutcome {
        let task = match self.admit().await {
            Ok(Some(task)) => task,
            Ok(None) => return CycleOutcome::Idle,
            Err(_) => return CycleOutcome::Cancelled,
        };

        self.set_state(DispatcherState::Sending);
        tracing::debug!(
            task_id = %task.id(),
            priority = task.priority(),
            request_tokens = task.request_tokens(),
            url = task.target(),
            "dispatching"
        );
        let sent = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                self.record(&task, AuditAction::Cancel, Some("cancelled during send".into()));
                return CycleOutcome::Cancelled;
            }
            result = self.transport.send(task.target(), task.payload()) => result,
        };

        match sent {
            Ok(response) => self.commit(task, response),
            Err(error) => self.retain(task, error),
        }
    }

    /// Wait until the top task fits in both pools. `Ok(None)` when the queue
    /// is empty, `Err` on shutdown.
    async fn admit(&self) -> Result<Option<PendingTask>, DispatchError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            self.set_state(DispatcherState::Admitting);
            // Re-peek every round: producers may have pushed while we waited.
            let Some(task) = self.queue.peek() else {
                return Ok(None);
            };

            let now = Instant::now();
            let admission = {
                let mut bucket = self.bucket.lock();
                bucket.start_clock(now);
                bucket.refill_if_due(now);
                bucket.admission(REQUEST_COST, task.request_tokens(), now, self.margin)
            };

            let plan = match admission {
                Admission::Admit => return Ok(Some(task)),
                Admission::Wait(plan) => plan,
            };

            self.set_state(DispatcherState::Waiting);
            self.stats.lock().waits += 1;
            let snapshot = self.buckets();
            tracing::info!(
                task_id = %task.id(),
                pools = ?plan.pools,
                wait_ms = u64::try_from(plan.delay.as_millis()).unwrap_or(u64::MAX),
                requests_left = snapshot.requests_left,
                tokens_left = snapshot.tokens_left,
                "quota exhausted, waiting for refill"
            );
            self.record(
                &task,
                AuditAction::Wait,
                Some(format!("{:?} for {:?}", plan.pools, plan.delay)),
            );

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    self.record(&task, AuditAction::Cancel, Some("cancelled during wait".into()));
                    return Err(DispatchError::Cancelled);
                }
                () = tokio::time::sleep(plan.delay) => {}
            }
            self.bucket.lock().refill_if_due(Instant::now());
        }
    }

    fn commit(&self, task: PendingTask, response: TransportResponse) -> CycleOutcome {
        self.set_state(DispatcherState::Committing);
        let snapshot = {
            let mut bucket = self.bucket.lock();
            bucket.consume(REQUEST_COST, task.request_tokens());
            bucket.snapshot()
        };
        if self.queue.remove(task.id()).is_none() {
            tracing::warn!(task_id = %task.id(), "dispatched task was no longer queued");
        }
        {
            let mut streak = self.streak.lock();
            if streak.task == Some(task.id()) {
                *streak = FailureStreak::default();
            }
        }
        self.stats.lock().dispatched += 1;
        tracing::info!(
            task_id = %task.id(),
            priority = task.priority(),
            status = response.status,
            requests_left = snapshot.requests_left,
            tokens_left = snapshot.tokens_left,
            "task dispatched"
        );
        self.record(
            &task,
            AuditAction::Dispatch,
            Some(format!("status {}", response.status)),
        );
        CycleOutcome::Dispatched { task, response }
    }

    fn retain(&self, task: PendingTask, error: TransportError) -> CycleOutcome {
        self.set_state(DispatcherState::Retaining);
        self.stats.lock().failed += 1;
        tracing::warn!(
            task_id = %task.id(),
            priority = task.priority(),
            error = %error,
            "dispatch failed, task retained"
        );
        self.record(&task, AuditAction::Retain, Some(error.to_string()));
        self.note_failure(&task);
        CycleOutcome::Retained { task, error }
    }

    /// Demote the task one priority level once its failure streak reaches
    /// the configured threshold.
    fn note_failure(&self, task: &PendingTask) {
        let Some(threshold) = self.demote_after else {
            return;
        };
        let demote = {
            let mut streak = self.streak.lock();
            if streak.task == Some(task.id()) {
                streak.count += 1;
            } else {
                *streak = FailureStreak {
                    task: Some(task.id()),
                    count: 1,
                };
            }
            if streak.count >= threshold {
                *streak = FailureStreak::default();
                true
            } else {
                false
            }
        };
        if !demote {
            return;
        }
        // A producer may have re-prioritised the task during the send.
        match self.queue.demote(task.id()) {
            Ok(Some(lowered)) => {
                self.stats.lock().demotions += 1;
                tracing::info!(
                    task_id = %task.id(),
                    priority = lowered,
                    "task demoted after repeated failures"
                );
                self.record(task, AuditAction::Demote, Some(format!("priority {lowered}")));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(task_id = %task.id(), error = %e, "failed to demote task"),
        }
    }

    fn set_state(&self, state: DispatcherState) {
        *self.state.lock() = state;
    }

    fn record(&self, task: &PendingTask, action: AuditAction, detail: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.lock().record(build_audit_event(task, action, detail));
        }
    }
}
