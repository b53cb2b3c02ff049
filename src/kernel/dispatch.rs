//! Dispatch: turning a scheduling decision into a context switch.

use crate::arch::{self, Context};
use crate::task::{TaskId, TaskState};

use super::Kernel;

/// A decided but not yet performed context switch.
///
/// Produced under the kernel lock, performed after it is dropped.
pub struct Switch {
    pub prev: Option<TaskId>,
    pub next: TaskId,
    from: Option<*mut Context>,
    to: *const Context,
}

impl Switch {
    /// Saves the running context into `prev` and resumes `next`.
    ///
    /// # Safety
    /// Interrupts must be masked, the kernel lock must not be held, and both
    /// contexts must still belong to live task slots.
    pub unsafe fn perform(self) {
        log::trace!(target: "sched", "switch {:?} -> {}", self.prev, self.next);
        unsafe { arch::switch_context(self.from, self.to) };
    }

    /// Context the switch resumes.
    pub fn target(&self) -> &Context {
        // SAFETY: `to` points into a live slot of the task table.
        unsafe { &*self.to }
    }
}

impl Kernel {
    /// The scheduling half of a yield.
    ///
    /// A still-Running current task goes back on the ready queue first. The
    /// picked task is stamped on its first dispatch and marked Running.
    /// Returns `None` when nothing is pickable or when the pick is the task
    /// that is already running.
    pub fn schedule(&mut self) -> Option<Switch> {
        let prev = self.scheduler.current();

        if let Some(prev) = prev {
            if self.tasks.get(prev).map(|t| t.state) == Some(TaskState::Running) {
                self.scheduler.enqueue(&mut self.tasks, prev);
            }
        }

        let next = self.scheduler.pick_next(&self.tasks)?;
        let now = self.ticks;
        {
            let task = self.tasks.get_mut(next)?;
            if task.metrics.start_time.is_none() {
                task.metrics.start_time = Some(now);
                task.metrics.wait_time = now.saturating_sub(task.metrics.arrival_time);
            }
            task.state = TaskState::Running;
        }
        self.scheduler.dispatched(next);

        if prev == Some(next) {
            return None;
        }

        let from = prev
            .and_then(|id| self.tasks.get_mut(id))
            .map(|t| &mut t.context as *mut Context);
        let to = self.tasks.get(next).map(|t| &t.context as *const Context)?;

        Some(Switch {
            prev,
            next,
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{entry, kernel};
    use crate::task::TaskState;

    #[test]
    fn first_switch_has_no_previous_context() {
        let mut k = kernel();
        let id = k.create(entry(), 0, 1).unwrap();
        let switch = k.schedule().unwrap();
        assert_eq!(switch.prev, None);
        assert_eq!(switch.next, id);
        assert!(switch.from.is_none());
    }

    #[test]
    fn picking_the_running_task_does_not_switch() {
        let mut k = kernel();
        let id = k.create(entry(), 0, 1).unwrap();
        k.schedule().unwrap();
        assert!(k.schedule().is_none());
        assert_eq!(k.current(), Some(id));
        assert_eq!(k.lookup(id).unwrap().state, TaskState::Running);
    }

    #[test]
    fn yielding_task_goes_to_the_back() {
        let mut k = kernel();
        let a = k.create(entry(), 0, 1).unwrap();
        let b = k.create(entry(), 0, 1).unwrap();
        assert_eq!(k.schedule().unwrap().next, a);

        let switch = k.schedule().unwrap();
        assert_eq!((switch.prev, switch.next), (Some(a), b));
        assert_eq!(k.lookup(a).unwrap().state, TaskState::Ready);
        assert_eq!(k.schedule().unwrap().next, a);
    }
}
