//! Array-backed binary max-heap of pending tasks.
//!
//! Parent of index `i` lives at `(i - 1) / 2`; children at `2i + 1` and
//! `2i + 2`. Ordering is by priority only, so equal-priority tasks leave in
//! no guaranteed order.

use crate::core::{DispatchError, PendingTask, TaskId};

/// Binary max-heap ordered by [`PendingTask::priority`].
#[derive(Debug, Clone, Default)]
pub struct PriorityHeap {
    tasks: Vec<PendingTask>,
}

const fn parent(index: usize) -> usize {
    (index - 1) / 2
}

const fn left_child(index: usize) -> usize {
    2 * index + 1
}

impl PriorityHeap {
    /// Create an empty heap.
    #[must_use]
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Create an empty heap with room for `capacity` tasks.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Vec::with_capacity(capacity),
        }
    }

    /// Insert a task in O(log n).
    pub fn push(&mut self, task: PendingTask) {
        self.tasks.push(task);
        self.sift_up(self.tasks.len() - 1);
    }

    /// Remove and return the highest-priority task.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyQueue`] on an empty heap.
    pub fn pop(&mut self) -> Result<PendingTask, DispatchError> {
        if self.tasks.is_empty() {
            return Err(DispatchError::EmptyQueue);
        }
        Ok(self.remove_at(0))
    }

    /// Borrow the highest-priority task.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyQueue`] on an empty heap.
    pub fn peek(&self) -> Result<&PendingTask, DispatchError> {
        self.tasks.first().ok_or(DispatchError::EmptyQueue)
    }

    /// True when no tasks are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks in heap (array) order, not priority order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingTask> {
        self.tasks.iter()
    }

    /// Task at heap index `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PendingTask> {
        self.tasks.get(index)
    }

    /// Heap index of the task with `id`, if queued.
    #[must_use]
    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id() == id)
    }

    /// Change the priority of the task at `index` and restore the invariant.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::IndexOutOfBounds`] for a bad index and
    /// [`DispatchError::InvalidTask`] for an out-of-range priority. The heap
    /// is unchanged on error.
    pub fn modify_priority(&mut self, index: usize, priority: u8) -> Result<(), DispatchError> {
        let len = self.tasks.len();
        let task = self
            .tasks
            .get_mut(index)
            .ok_or(DispatchError::IndexOutOfBounds { index, len })?;
        let old = task.priority();
        task.set_priority(priority)?;
        if priority > old {
            self.sift_up(index);
        } else if priority < old {
            self.sift_down(index);
        }
        Ok(())
    }

    /// Remove the task with `id` wherever it sits in the heap.
    pub fn remove(&mut self, id: TaskId) -> Option<PendingTask> {
        let index = self.position(id)?;
        Some(self.remove_at(index))
    }

    fn remove_at(&mut self, index: usize) -> PendingTask {
        let removed = self.tasks.swap_remove(index);
        if index < self.tasks.len() {
            // The moved-in last element may belong either above or below.
            self.sift_up(index);
            self.sift_down(index);
        }
        removed
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let up = parent(index);
            if self.tasks[up].priority() >= self.tasks[index].priority() {
                break;
            }
            self.tasks.swap(up, index);
            index = up;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.tasks.len();
        loop {
            let left = left_child(index);
            if left >= len {
                break;
            }
            let right = left + 1;
            // Pick the larger child, not the first one that beats the parent.
            let child = if right < len && self.tasks[right].priority() > self.tasks[left].priority()
            {
                right
            } else {
                left
            };
            if self.tasks[index].priority() >= self.tasks[child].priority() {
                break;
            }
            self.tasks.swap(index, child);
            index = child;
        }
    }

    #[cfg(test)]
    pub(crate) fn is_valid(&self) -> bool {
        (1..self.tasks.len()).all(|i| self.tasks[parent(i)].priority() >= self.tasks[i].priority())
    }
}
