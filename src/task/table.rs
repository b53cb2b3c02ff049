//! Fixed-capacity task table.

use super::{Task, TaskId};
use crate::config::MAX_TASKS;

/// Slots indexed by [`TaskId`]. An empty slot is free; an occupied slot
/// holds a task in any state, including an unreaped zombie.
pub struct TaskTable {
    slots: [Option<Task>; MAX_TASKS],
}

impl TaskTable {
    pub fn new() -> Self {
        TaskTable {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Lowest-numbered free slot.
    pub fn free_slot(&self) -> Option<TaskId> {
        self.slots.iter().position(Option::is_none).map(TaskId::new)
    }

    /// Stores `task` in its slot, which must be free.
    pub(crate) fn insert(&mut self, task: Task) {
        let slot = &mut self.slots[task.id.index()];
        debug_assert!(slot.is_none(), "slot {} already occupied", task.id);
        *slot = Some(task);
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.slots.get_mut(id.index())?.take()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.index())?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> + '_ {
        self.slots.iter().flatten()
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        MAX_TASKS
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
