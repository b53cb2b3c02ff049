//! Task lifecycle: creation, exit, reclamation, parking and the tick hook.

use crate::arch::Context;
use crate::config::{MAX_TASKS, STACK_SIZE};
use crate::task::{Task, TaskEntry, TaskError, TaskId, TaskState, Waiter};

use super::{trampoline_address, Kernel};

impl Kernel {
    /// Creates a Ready task that will run `entry` with `argument`.
    pub fn create(
        &mut self,
        entry: TaskEntry,
        argument: usize,
        burst_hint: u64,
    ) -> Result<TaskId, TaskError> {
        let id = self.tasks.free_slot().ok_or(TaskError::NoFreeTaskSlot)?;
        let stack = self.arena.allocate(STACK_SIZE)?;

        let stack_top = (self.arena_base + stack.offset() + stack.size()) & !0xf;
        let context = Context::for_task(trampoline_address(), stack_top, argument);

        self.tasks.insert(Task::new(
            id, entry, argument, burst_hint, stack, context, self.ticks,
        ));
        self.scheduler.enqueue(&mut self.tasks, id);

        log::debug!(target: "task", "created {} (burst hint {})", id, burst_hint);
        Ok(id)
    }

    /// Hands the running task's entry to the trampoline, once.
    pub(super) fn take_current_entry(&mut self) -> Option<TaskEntry> {
        let id = self.scheduler.current()?;
        self.tasks.get_mut(id)?.entry.take()
    }

    /// Marks the running task Zombie and folds its usage into the burst
    /// estimate. The caller must schedule away afterwards.
    pub fn exit_current(&mut self) -> Option<TaskId> {
        let id = self.scheduler.current().filter(|id| !id.is_idle())?;
        let now = self.ticks;
        let task = self.tasks.get_mut(id)?;

        task.state = TaskState::Zombie;
        task.entry = None;
        task.metrics.finish_time = Some(now);
        task.metrics.update_burst_estimate();

        log::debug!(
            target: "task",
            "{} exited after {} ticks",
            id,
            task.metrics.ticks_used
        );
        Some(id)
    }

    /// Frees a zombie's stack and slot. Silently refuses the idle task,
    /// live tasks, the running task and free slots.
    pub fn reap(&mut self, id: TaskId) -> bool {
        if id.is_idle() || self.scheduler.current() == Some(id) {
            return false;
        }
        if self.tasks.get(id).map(|t| t.state) != Some(TaskState::Zombie) {
            return false;
        }

        self.scheduler.dequeue(id);
        let Some(task) = self.tasks.remove(id) else {
            return false;
        };
        if let Err(e) = self.arena.free(task.stack) {
            log::error!(target: "mem", "freeing stack of {}: {}", id, e);
        }

        log::debug!(target: "task", "reaped {}", id);
        true
    }

    /// Forces `id` into the Zombie state, dropping it from the ready queue.
    /// Killing a zombie again is a no-op.
    pub fn kill(&mut self, id: TaskId) -> Result<(), TaskError> {
        if id.is_idle() || self.scheduler.current() == Some(id) {
            return Err(TaskError::Protected);
        }

        let now = self.ticks;
        let task = self.tasks.get_mut(id).ok_or(TaskError::InvalidTaskId)?;
        if task.state == TaskState::Zombie {
            return Ok(());
        }

        task.state = TaskState::Zombie;
        task.entry = None;
        task.wake_at = None;
        task.wait_ticket = None;
        task.metrics.finish_time = Some(now);
        self.scheduler.dequeue(id);

        log::info!(target: "task", "killed {}", id);
        Ok(())
    }

    /// Takes the running task off the ready set until `wake_at` (a tick) or
    /// an explicit wake. The idle task cannot park.
    fn park(&mut self, wake_at: Option<u64>) -> Option<Waiter> {
        let id = self.scheduler.current().filter(|id| !id.is_idle())?;
        let ticket = self.parks + 1;
        let task = self.tasks.get_mut(id)?;
        if task.state != TaskState::Running {
            return None;
        }
        task.state = TaskState::Sleeping;
        task.wake_at = wake_at;
        task.wait_ticket = Some(ticket);
        self.parks = ticket;
        Some(Waiter::new(id, ticket))
    }

    /// Parks the running task until [`Kernel::wake_waiter`] is called with
    /// the returned ticket.
    pub fn park_current(&mut self) -> Option<Waiter> {
        self.park(None)
    }

    pub(super) fn sleep_current(&mut self, ticks: u64) -> Option<TaskId> {
        let deadline = self.ticks.saturating_add(ticks);
        self.park(Some(deadline)).map(|waiter| waiter.id)
    }

    /// Wakes the parking `waiter` describes. Fails if that task has since
    /// been woken, killed or replaced in its slot.
    pub fn wake_waiter(&mut self, waiter: Waiter) -> bool {
        let parked = self.tasks.get(waiter.id).is_some_and(|t| {
            t.state == TaskState::Sleeping && t.wait_ticket == Some(waiter.ticket())
        });
        parked && self.wake(waiter.id)
    }

    /// Re-enqueues a parked task.
    fn wake(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(id) {
            Some(task) if task.state == TaskState::Sleeping => {
                task.wake_at = None;
                task.wait_ticket = None;
            }
            _ => return false,
        }
        self.scheduler.enqueue(&mut self.tasks, id)
    }

    /// Whether `id` is parked and waiting.
    pub fn is_parked(&self, id: TaskId) -> bool {
        self.tasks.get(id).map(|t| t.state) == Some(TaskState::Sleeping)
    }

    /// Timer tick: advance time, wake due sleepers, account and request a
    /// reschedule. Runs in interrupt context, so it must not allocate.
    pub fn tick(&mut self) {
        self.ticks += 1;
        let now = self.ticks;

        for index in 0..MAX_TASKS {
            let id = TaskId::new(index);
            let due = self.tasks.get(id).is_some_and(|t| {
                t.state == TaskState::Sleeping && t.wake_at.is_some_and(|at| at <= now)
            });
            if due {
                self.wake(id);
            }
        }

        self.scheduler.on_tick(&mut self.tasks);
        self.scheduler.request_reschedule();
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{entry, kernel};
    use super::*;
    use crate::config::HEAP_SIZE;
    use crate::memory::arena::HEADER_SIZE;

    #[test]
    fn create_fills_slots_in_order() {
        let mut k = kernel();
        let a = k.create(entry(), 7, 3).unwrap();
        let b = k.create(entry(), 8, 4).unwrap();
        assert_eq!((a.index(), b.index()), (1, 2));

        let info = k.lookup(b).unwrap();
        assert_eq!(info.state, TaskState::Ready);
        assert_eq!(info.argument, 8);
        assert_eq!(info.metrics.burst_estimate, 4);
        assert!(info.stack_size >= STACK_SIZE);
    }

    #[test]
    fn table_exhaustion_is_reported() {
        let mut k = Kernel::new(0x8000_0000, (MAX_TASKS + 2) * (STACK_SIZE + HEADER_SIZE), false);
        for _ in 0..MAX_TASKS {
            k.create(entry(), 0, 1).unwrap();
        }
        assert_eq!(k.create(entry(), 0, 1), Err(TaskError::NoFreeTaskSlot));
        assert_eq!(k.snapshot().len(), MAX_TASKS);
    }

    #[test]
    fn stack_exhaustion_is_reported() {
        let mut k = Kernel::new(0x8000_0000, HEAP_SIZE, false);
        let mut created = 0;
        let err = loop {
            match k.create(entry(), 0, 1) {
                Ok(_) => created += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(err, TaskError::OutOfMemory);
        assert!(created < MAX_TASKS);

        // Failure leaves nothing behind.
        assert_eq!(k.snapshot().len(), created);
    }

    #[test]
    fn stacks_are_aligned_and_disjoint() {
        let mut k = kernel();
        let a = k.create(entry(), 0, 1).unwrap();
        let b = k.create(entry(), 0, 1).unwrap();
        let sp_a = k.tasks.get(a).unwrap().context.sp();
        let sp_b = k.tasks.get(b).unwrap().context.sp();
        assert_eq!(sp_a % 16, 0);
        assert_eq!(sp_b % 16, 0);
        assert!(sp_b - sp_a >= STACK_SIZE);
    }

    #[test]
    fn reap_reclaims_only_zombies() {
        let mut k = kernel();
        let id = k.create(entry(), 0, 1).unwrap();
        let before = k.memory_stats();

        assert!(!k.reap(id));
        k.kill(id).unwrap();
        assert!(k.reap(id));
        assert!(!k.reap(id));
        assert!(k.lookup(id).is_none());
        assert!(k.memory_stats().free > before.free);

        // The slot is reused.
        assert_eq!(k.create(entry(), 0, 1).unwrap(), id);
    }

    #[test]
    fn idle_is_never_reaped_or_killed() {
        let mut k = kernel();
        assert_eq!(k.kill(TaskId::IDLE), Err(TaskError::Protected));
        k.tasks.get_mut(TaskId::IDLE).unwrap().state = TaskState::Zombie;
        assert!(!k.reap(TaskId::IDLE));
        assert!(k.lookup(TaskId::IDLE).is_some());
    }

    #[test]
    fn kill_purges_the_ready_queue() {
        let mut k = kernel();
        let a = k.create(entry(), 0, 1).unwrap();
        let b = k.create(entry(), 0, 1).unwrap();
        assert!(k.scheduler.is_queued(a));

        k.kill(a).unwrap();
        assert!(!k.scheduler.is_queued(a));
        assert_eq!(k.lookup(a).unwrap().state, TaskState::Zombie);
        assert_eq!(k.schedule().unwrap().next, b);
    }

    #[test]
    fn the_running_task_cannot_be_killed() {
        let mut k = kernel();
        let a = k.create(entry(), 0, 1).unwrap();
        k.schedule().unwrap();
        assert_eq!(k.kill(a), Err(TaskError::Protected));
        assert_eq!(k.kill(TaskId::new(17)), Err(TaskError::InvalidTaskId));
    }

    #[test]
    fn exit_records_completion() {
        let mut k = kernel();
        let id = k.create(entry(), 0, 20).unwrap();
        k.schedule().unwrap();
        for _ in 0..10 {
            k.tick();
        }
        assert_eq!(k.exit_current(), Some(id));

        let m = k.lookup(id).unwrap().metrics;
        assert_eq!(m.ticks_used, 10);
        assert_eq!(m.finish_time, Some(10));
        assert_eq!(m.burst_estimate, 15);
        assert_eq!(m.turnaround(), Some(10));

        // The zombie is not re-enqueued; idle takes over.
        assert_eq!(k.schedule().unwrap().next, TaskId::IDLE);
    }

    #[test]
    fn sleepers_wake_on_their_deadline() {
        let mut k = kernel();
        let id = k.create(entry(), 0, 1).unwrap();
        k.schedule().unwrap();
        assert_eq!(k.sleep_current(3), Some(id));
        assert_eq!(k.schedule().unwrap().next, TaskId::IDLE);

        k.tick();
        k.tick();
        assert!(k.is_parked(id));
        k.tick();
        assert!(!k.is_parked(id));
        assert!(k.scheduler.is_queued(id));
        assert_eq!(k.schedule().unwrap().next, id);
    }

    #[test]
    fn parked_tasks_wait_for_an_explicit_wake() {
        let mut k = kernel();
        let id = k.create(entry(), 0, 1).unwrap();
        k.schedule().unwrap();
        let waiter = k.park_current().unwrap();
        assert_eq!(waiter.id, id);
        for _ in 0..100 {
            k.tick();
        }
        assert!(k.is_parked(id));
        assert!(k.wake_waiter(waiter));
        assert!(!k.wake_waiter(waiter));
        assert_eq!(k.lookup(id).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn stale_waiter_cannot_wake_the_slots_next_task() {
        let mut k = kernel();
        let a = k.create(entry(), 0, 1).unwrap();
        let b = k.create(entry(), 0, 1).unwrap();
        k.schedule().unwrap();
        let stale = k.park_current().unwrap();
        assert_eq!(k.schedule().unwrap().next, b);

        k.kill(a).unwrap();
        assert!(k.reap(a));
        let c = k.create(entry(), 0, 1).unwrap();
        assert_eq!(c, a);
        assert_eq!(k.schedule().unwrap().next, c);
        let parked = k.park_current().unwrap();

        assert!(!k.wake_waiter(stale));
        assert!(k.is_parked(c));
        assert!(k.wake_waiter(parked));
        assert!(!k.is_parked(c));
    }

    #[test]
    fn killing_a_parked_task_voids_its_ticket() {
        let mut k = kernel();
        let a = k.create(entry(), 0, 1).unwrap();
        k.create(entry(), 0, 1).unwrap();
        k.schedule().unwrap();
        let waiter = k.park_current().unwrap();
        k.schedule().unwrap();

        k.kill(a).unwrap();
        assert!(!k.wake_waiter(waiter));
        assert_eq!(k.lookup(a).unwrap().state, TaskState::Zombie);
    }

    #[test]
    fn idle_cannot_park() {
        let mut k = kernel();
        assert_eq!(k.schedule().unwrap().next, TaskId::IDLE);
        assert_eq!(k.park_current(), None);
    }

    #[test]
    fn ticks_advance_by_one() {
        let mut k = kernel();
        let mut last = k.ticks();
        for _ in 0..50 {
            k.tick();
            assert_eq!(k.ticks(), last + 1);
            last = k.ticks();
        }
        assert!(k.reschedule_requested());
    }
}
