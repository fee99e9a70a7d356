//! Pending outbound tasks and their validation rules.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::DispatchError;

/// Identifier assigned to every task at construction.
pub type TaskId = Uuid;

/// Lowest accepted priority.
pub const MIN_PRIORITY: u8 = 0;
/// Highest accepted priority.
pub const MAX_PRIORITY: u8 = 9;

/// JSON body posted for each dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Token cost of this dispatch.
    pub tokens: u32,
}

/// One unit of outbound work: priority, destination and token cost.
///
/// Fields are private; the only mutation after construction is
/// [`PendingTask::set_priority`], which re-validates the new value. Queued
/// tasks should be re-prioritised through
/// [`PriorityHeap::modify_priority`](crate::core::PriorityHeap::modify_priority)
/// so the heap invariant is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PendingTaskRepr")]
pub struct PendingTask {
    id: TaskId,
    priority: u8,
    target: String,
    total_tokens: u32,
    request_tokens: u32,
}

/// Wire form of [`PendingTask`]; validated on the way in.
#[derive(Deserialize)]
struct PendingTaskRepr {
    id: TaskId,
    priority: u8,
    target: String,
    total_tokens: u32,
    request_tokens: u32,
}

impl TryFrom<PendingTaskRepr> for PendingTask {
    type Error = DispatchError;

    fn try_from(repr: PendingTaskRepr) -> Result<Self, Self::Error> {
        let mut task = Self::new(
            repr.priority,
            repr.target,
            repr.total_tokens,
            repr.request_tokens,
        )?;
        task.id = repr.id;
        Ok(task)
    }
}

impl PendingTask {
    /// Build and validate a task.
    ///
    /// An empty `target` is accepted and marks a sentinel task that is
    /// acknowledged without network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidTask`] when the priority is outside
    /// `MIN_PRIORITY..=MAX_PRIORITY`, a token cost is zero, `request_tokens`
    /// exceeds `total_tokens`, or a non-empty target is not an absolute
    /// `http`/`https` URL.
    pub fn new(
        priority: u8,
        target: impl Into<String>,
        total_tokens: u32,
        request_tokens: u32,
    ) -> Result<Self, DispatchError> {
        let target = target.into();
        validate_priority(priority)?;
        validate_target(&target)?;
        if total_tokens == 0 {
            return Err(DispatchError::InvalidTask(
                "total_tokens must be greater than 0".into(),
            ));
        }
        if request_tokens == 0 {
            return Err(DispatchError::InvalidTask(
                "request_tokens must be greater than 0".into(),
            ));
        }
        if request_tokens > total_tokens {
            return Err(DispatchError::InvalidTask(format!(
                "request_tokens ({request_tokens}) exceeds total_tokens ({total_tokens})"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            priority,
            target,
            total_tokens,
            request_tokens,
        })
    }

    /// Task whose whole budget is spent in a single dispatch.
    ///
    /// # Errors
    ///
    /// Same as [`PendingTask::new`].
    pub fn single_shot(
        priority: u8,
        target: impl Into<String>,
        tokens: u32,
    ) -> Result<Self, DispatchError> {
        Self::new(priority, target, tokens, tokens)
    }

    /// Unique identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Priority, higher is more urgent.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }

    /// Destination URL, empty for sentinel tasks.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Total token estimate over the task's lifetime.
    #[must_use]
    pub const fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    /// Token cost of the next dispatch.
    #[must_use]
    pub const fn request_tokens(&self) -> u32 {
        self.request_tokens
    }

    /// True when the target is empty.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.target.is_empty()
    }

    /// Body sent to the downstream service.
    #[must_use]
    pub const fn payload(&self) -> TaskPayload {
        TaskPayload {
            tokens: self.request_tokens,
        }
    }

    /// Replace the priority after range validation.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidTask`] for an out-of-range value; the
    /// task is left unchanged.
    pub fn set_priority(&mut self, priority: u8) -> Result<(), DispatchError> {
        validate_priority(priority)?;
        self.priority = priority;
        Ok(())
    }
}

impl fmt::Display for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PendingTask({}, {}, {}, {})",
            self.priority, self.target, self.total_tokens, self.request_tokens
        )
    }
}

fn validate_priority(priority: u8) -> Result<(), DispatchError> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(DispatchError::InvalidTask(format!(
            "priority {priority} outside {MIN_PRIORITY}..={MAX_PRIORITY}"
        )))
    }
}

fn validate_target(target: &str) -> Result<(), DispatchError> {
    if target.is_empty() {
        return Ok(());
    }
    let url = reqwest::Url::parse(target)
        .map_err(|e| DispatchError::InvalidTask(format!("target `{target}` is not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        _ => Err(DispatchError::InvalidTask(format!(
            "target `{target}` must be an absolute http(s) URL"
        ))),
    }
}
