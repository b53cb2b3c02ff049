//! Bounded FIFO of runnable task ids.

use alloc::collections::VecDeque;

use super::TaskId;
use crate::config::MAX_TASKS;

/// Ready queue with room for `MAX_TASKS` entries.
///
/// Storage is reserved up front, so pushes never allocate; this matters
/// because the timer path enqueues woken sleepers.
pub struct ReadyQueue {
    queue: VecDeque<TaskId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        ReadyQueue {
            queue: VecDeque::with_capacity(MAX_TASKS),
        }
    }

    /// Appends `id`, handing it back if the queue is full.
    pub fn push_back(&mut self, id: TaskId) -> Result<(), TaskId> {
        if self.queue.len() >= MAX_TASKS {
            return Err(id);
        }
        self.queue.push_back(id);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<TaskId> {
        self.queue.pop_front()
    }

    /// Removes the entry at `position`, closing the gap while keeping the
    /// order of the remaining entries.
    pub fn remove_at(&mut self, position: usize) -> Option<TaskId> {
        self.queue.remove(position)
    }

    /// Drops every reference to `id`. Returns whether any was found.
    pub fn purge(&mut self, id: TaskId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|queued| *queued != id);
        self.queue.len() != before
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.queue.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.queue.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
