//! The kernel owner and its global instance.
//!
//! All mutable kernel state (task table, scheduler, stack arena, tick
//! counter) lives in one [`Kernel`] value. The global instance sits behind a
//! spin lock that is only ever taken with interrupts masked, so the lock
//! also excludes the timer interrupt and is never contended on one core.
//!
//! Initialization order: `memory::init`, then [`init`] (creates the idle
//! task), then task creation, then `trap::init` and the first timer
//! deadline, and finally [`start`].
//!
//! A context switch happens with interrupts masked but after the lock is
//! released; [`Switch`] carries raw pointers into the task table for that
//! window. The table lives inside the static instance and the two tasks
//! involved cannot be reaped before the switch completes.

mod dispatch;
mod lifecycle;

use alloc::boxed::Box;
use alloc::vec::Vec;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::{self, interrupts};
use crate::config::{HEAP_SIZE, PREEMPT_DEFAULT, RR_QUANTUM};
use crate::memory::{self, arena::Arena};
use crate::task::scheduler::{Policy, Scheduler};
use crate::task::{TaskEntry, TaskError, TaskId, TaskInfo, TaskTable, Waiter};

pub use dispatch::Switch;

/// Burst hint of the idle task.
const IDLE_BURST_HINT: u64 = 1;

/// Kernel state: one per core, and there is one core.
pub struct Kernel {
    tasks: TaskTable,
    scheduler: Scheduler,
    arena: Arena,
    arena_base: usize,
    ticks: u64,
    /// Parkings handed out so far; the last one is the newest ticket.
    parks: u64,
}

/// Stack arena usage, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub capacity: usize,
    pub allocated: usize,
    pub free: usize,
    pub free_blocks: usize,
    pub blocks: usize,
}

impl Kernel {
    /// Creates a kernel whose stacks come from `arena_size` bytes at
    /// `arena_base`.
    pub fn new(arena_base: usize, arena_size: usize, preempt: bool) -> Self {
        Kernel {
            tasks: TaskTable::new(),
            scheduler: Scheduler::new(RR_QUANTUM, preempt),
            arena: Arena::new(arena_size),
            arena_base,
            ticks: 0,
            parks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn current(&self) -> Option<TaskId> {
        self.scheduler.current()
    }

    pub fn policy(&self) -> Policy {
        self.scheduler.policy()
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.scheduler.set_policy(policy);
        log::info!(target: "sched", "policy set to {}", policy);
    }

    pub fn preempt(&self) -> bool {
        self.scheduler.preempt()
    }

    pub fn set_preempt(&mut self, on: bool) {
        self.scheduler.set_preempt(on);
        log::info!(target: "sched", "preemption {}", if on { "on" } else { "off" });
    }

    pub fn reschedule_requested(&self) -> bool {
        self.scheduler.reschedule_requested()
    }

    pub fn lookup(&self, id: TaskId) -> Option<TaskInfo> {
        self.tasks.get(id).map(|t| t.info())
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.tasks.iter().map(|t| t.info()).collect()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            capacity: self.arena.capacity(),
            allocated: self.arena.allocated_bytes(),
            free: self.arena.free_bytes(),
            free_blocks: self.arena.free_blocks(),
            blocks: self.arena.live_blocks(),
        }
    }
}

lazy_static! {
    static ref KERNEL: Mutex<Kernel> =
        Mutex::new(Kernel::new(memory::stack_arena_base(), HEAP_SIZE, PREEMPT_DEFAULT));
}

/// Runs `f` on the global kernel with interrupts masked.
fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    interrupts::without_interrupts(|| f(&mut KERNEL.lock()))
}

/// Where every task starts: runs the entry taken from the task's slot,
/// then exits. `argument` arrives in the first argument register.
extern "C" fn task_trampoline(argument: usize) -> ! {
    if let Some(entry) = with_kernel(|k| k.take_current_entry()) {
        entry.invoke(argument);
    }
    exit()
}

/// Address the first context of every task resumes at.
pub(crate) fn trampoline_address() -> usize {
    task_trampoline as *const () as usize
}

/// Creates the idle task. Must run once, before any other task is created.
pub fn init() -> Result<(), TaskError> {
    let id = with_kernel(|k| k.create(TaskEntry::Function(idle_task), 0, IDLE_BURST_HINT))?;
    debug_assert!(id.is_idle());
    log::info!(target: "task", "idle task created");
    Ok(())
}

/// Runs when nothing else is runnable.
fn idle_task(_: usize) {
    loop {
        yield_now();
        arch::wait_for_interrupt();
    }
}

/// Dispatches the first task. The boot flow is abandoned.
pub fn start() -> ! {
    with_kernel(|k| k.scheduler.request_reschedule());
    yield_now();
    log::error!(target: "sched", "nothing to run");
    arch::halt()
}

/// Creates a task running `entry(argument)`.
pub fn create(entry: fn(usize), argument: usize, burst_hint: u64) -> Result<TaskId, TaskError> {
    with_kernel(|k| k.create(TaskEntry::Function(entry), argument, burst_hint))
}

/// Creates a task running the closure `f`.
pub fn spawn<F>(f: F, burst_hint: u64) -> Result<TaskId, TaskError>
where
    F: FnOnce() + Send + 'static,
{
    // Box outside the critical section.
    let entry = TaskEntry::Closure(Box::new(f));
    with_kernel(|k| k.create(entry, 0, burst_hint))
}

/// Gives up the core. Returns when this task is dispatched again, or right
/// away if nothing else can run.
pub fn yield_now() {
    let were_enabled = interrupts::are_enabled();
    interrupts::disable();

    let switch = KERNEL.lock().schedule();
    if let Some(switch) = switch {
        // SAFETY: interrupts are masked and the lock is released.
        unsafe { switch.perform() };
    }

    if were_enabled {
        interrupts::enable();
    }
}

/// Cooperative checkpoint: yields if a reschedule has been requested.
pub fn maybe_yield() {
    if with_kernel(|k| k.scheduler.take_reschedule()) {
        yield_now();
    }
}

/// Ends the calling task. Never returns.
pub fn exit() -> ! {
    retire_current();
    // Nothing else could run. Never resume the exited code.
    arch::halt()
}

/// Zombifies the running task and switches away, leaving interrupts
/// masked. Returns only if it did not switch.
fn retire_current() {
    interrupts::disable();

    let switch = {
        let mut kernel = KERNEL.lock();
        kernel.exit_current();
        kernel.schedule()
    };
    if let Some(switch) = switch {
        // SAFETY: as in `yield_now`.
        unsafe { switch.perform() };
    }
}

/// Sleeps for `ticks` timer ticks. `sleep(0)` is a plain yield.
pub fn sleep(ticks: u64) {
    if ticks > 0 && with_kernel(|k| k.sleep_current(ticks)).is_none() {
        return;
    }
    yield_now();
}

/// Reclaims a zombie's slot and stack. Returns whether it did.
pub fn reap(id: TaskId) -> bool {
    with_kernel(|k| k.reap(id))
}

/// Forces a task into the zombie state.
pub fn kill(id: TaskId) -> Result<(), TaskError> {
    with_kernel(|k| k.kill(id))
}

pub fn lookup(id: TaskId) -> Option<TaskInfo> {
    with_kernel(|k| k.lookup(id))
}

pub fn snapshot() -> Vec<TaskInfo> {
    with_kernel(|k| k.snapshot())
}

pub fn current() -> Option<TaskId> {
    with_kernel(|k| k.current())
}

pub fn set_mode(policy: Policy) {
    with_kernel(|k| k.set_policy(policy));
}

pub fn mode() -> Policy {
    with_kernel(|k| k.policy())
}

pub fn set_preempt(on: bool) {
    with_kernel(|k| k.set_preempt(on));
}

pub fn preempt() -> bool {
    with_kernel(|k| k.preempt())
}

/// Global tick counter.
pub fn ticks() -> u64 {
    with_kernel(|k| k.ticks())
}

pub fn memory_stats() -> MemoryStats {
    with_kernel(|k| k.memory_stats())
}

/// Timer hook; called from the trap path with interrupts already masked.
pub(crate) fn tick() {
    with_kernel(|k| k.tick());
}

/// Parks the running task off the ready queue until [`wake_waiter`]. The
/// caller must follow up with [`yield_now`].
pub(crate) fn park_current() -> Option<Waiter> {
    with_kernel(|k| k.park_current())
}

/// Makes a parked task runnable. Returns whether this exact parking was
/// still pending.
pub(crate) fn wake_waiter(waiter: Waiter) -> bool {
    with_kernel(|k| k.wake_waiter(waiter))
}

/// Whether `id` is still parked.
pub(crate) fn is_parked(id: TaskId) -> bool {
    with_kernel(|k| k.is_parked(id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::task::TaskState;
    use alloc::vec;

    fn noop(_: usize) {}

    pub(crate) fn entry() -> TaskEntry {
        TaskEntry::Function(noop)
    }

    /// A kernel over the full arena, idle task in slot 0, preemption off.
    pub(crate) fn kernel() -> Kernel {
        let mut k = Kernel::new(0x8010_0000, HEAP_SIZE, false);
        let idle = k.create(entry(), 0, IDLE_BURST_HINT).unwrap();
        assert!(idle.is_idle());
        k
    }

    fn running(k: &Kernel) -> usize {
        k.snapshot()
            .iter()
            .filter(|t| t.state == TaskState::Running)
            .count()
    }

    /// One cooperative checkpoint, as `maybe_yield` does it.
    fn checkpoint(k: &mut Kernel) {
        if k.scheduler.take_reschedule() {
            k.schedule();
        }
    }

    static GLOBAL: Mutex<()> = Mutex::new(());

    /// Resets the global kernel to [`kernel`] and keeps other tests off it
    /// until the guard drops.
    pub(crate) fn fresh_global() -> spin::MutexGuard<'static, ()> {
        let guard = GLOBAL.lock();
        with_kernel(|k| *k = kernel());
        guard
    }

    #[test]
    fn first_dispatch_delivers_argument_and_wait_time() {
        let mut k = kernel();
        let id = k.create(entry(), 42, 1).unwrap();
        for _ in 0..4 {
            k.tick();
        }

        let switch = k.schedule().unwrap();
        assert_eq!(switch.next, id);
        assert_eq!(switch.target().pc(), trampoline_address());
        assert_eq!(switch.target().argument(), 42);

        let m = k.lookup(id).unwrap().metrics;
        assert_eq!(m.start_time, Some(4));
        assert_eq!(m.wait_time, 4);

        // Later dispatches do not restamp.
        k.tick();
        k.schedule();
        assert_eq!(k.lookup(id).unwrap().metrics.start_time, Some(4));
    }

    #[test]
    fn sjf_runs_a_batch_in_burst_order() {
        let mut k = kernel();
        k.set_policy(Policy::ShortestJobFirst);
        let bursts = [10u64, 20, 15, 30, 25, 12];
        for &burst in &bursts {
            k.create(entry(), burst as usize, burst).unwrap();
        }

        let mut order = vec![];
        loop {
            let next = k.schedule().map(|s| s.next).or(k.current()).unwrap();
            if next.is_idle() {
                break;
            }
            let burst = k.lookup(next).unwrap().argument as u64;
            order.push(burst);
            for _ in 0..burst {
                k.tick();
                checkpoint(&mut k);
                assert_eq!(k.current(), Some(next));
            }
            k.exit_current();
        }
        assert_eq!(order, [10, 12, 15, 20, 25, 30]);
    }

    #[test]
    fn round_robin_dispatches_everyone_within_n_quanta() {
        let mut k = Kernel::new(0x8010_0000, HEAP_SIZE, true);
        k.create(entry(), 0, IDLE_BURST_HINT).unwrap();
        let n = 4;
        let ids: Vec<_> = (0..n).map(|_| k.create(entry(), 0, 5).unwrap()).collect();

        let mut seen = vec![false; crate::config::MAX_TASKS];
        k.schedule();
        seen[k.current().unwrap().index()] = true;
        for _ in 0..n * RR_QUANTUM as usize {
            k.tick();
            checkpoint(&mut k);
            seen[k.current().unwrap().index()] = true;
        }
        assert!(ids.iter().all(|id| seen[id.index()]));
        assert!(!seen[TaskId::IDLE.index()]);
    }

    #[test]
    fn at_most_one_task_runs() {
        let mut k = Kernel::new(0x8010_0000, HEAP_SIZE, true);
        k.create(entry(), 0, IDLE_BURST_HINT).unwrap();
        for i in 0..6 {
            k.create(entry(), i, 3).unwrap();
        }

        for step in 0..200u64 {
            match step % 7 {
                0 => {
                    k.exit_current();
                }
                3 => {
                    k.sleep_current(2);
                }
                5 => {
                    let _ = k.create(entry(), 0, 3);
                }
                _ => k.tick(),
            }
            checkpoint(&mut k);
            k.schedule();
            assert!(running(&k) <= 1);

            for zombie in k
                .snapshot()
                .iter()
                .filter(|t| t.state == TaskState::Zombie)
                .map(|t| t.id)
            {
                k.reap(zombie);
            }
            assert!(k.snapshot().len() <= k.tasks.capacity());
        }
    }

    #[test]
    fn switching_policy_is_reported() {
        let mut k = kernel();
        assert_eq!(k.policy(), Policy::RoundRobin);
        k.set_policy(Policy::ShortestJobFirst);
        assert_eq!(k.policy(), Policy::ShortestJobFirst);
        k.set_preempt(true);
        assert!(k.preempt());
    }

    #[test]
    fn maybe_yield_honours_a_pending_reschedule() {
        let _kernel = fresh_global();
        let a = create(noop, 0, 1).unwrap();
        let b = create(noop, 0, 1).unwrap();

        yield_now();
        assert_eq!(current(), Some(a));
        maybe_yield();
        assert_eq!(current(), Some(a));

        tick();
        maybe_yield();
        assert_eq!(current(), Some(b));
        assert_eq!(lookup(a).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn sleep_parks_until_the_deadline() {
        let _kernel = fresh_global();
        let a = create(noop, 0, 1).unwrap();
        yield_now();
        assert_eq!(current(), Some(a));

        sleep(2);
        assert_eq!(current(), Some(TaskId::IDLE));
        assert_eq!(lookup(a).unwrap().state, TaskState::Sleeping);

        tick();
        assert!(is_parked(a));
        tick();
        assert!(!is_parked(a));
        maybe_yield();
        assert_eq!(current(), Some(a));
    }

    #[test]
    fn sleeping_zero_ticks_is_a_yield() {
        let _kernel = fresh_global();
        let a = create(noop, 0, 1).unwrap();
        let b = create(noop, 0, 1).unwrap();
        yield_now();

        sleep(0);
        assert_eq!(current(), Some(b));
        assert_eq!(lookup(a).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn exiting_task_becomes_a_zombie_and_hands_over() {
        let _kernel = fresh_global();
        let a = create(noop, 0, 1).unwrap();
        let b = create(noop, 0, 1).unwrap();
        yield_now();
        for _ in 0..3 {
            tick();
        }

        retire_current();
        assert_eq!(current(), Some(b));
        let info = lookup(a).unwrap();
        assert_eq!(info.state, TaskState::Zombie);
        assert_eq!(info.metrics.finish_time, Some(3));
        assert_eq!(info.metrics.ticks_used, 3);
        assert!(reap(a));
        assert!(lookup(a).is_none());
    }
}
