//! Tasks: identity, lifecycle state, saved context and scheduling metrics.
//!
//! A task lives in one slot of a fixed-capacity [`TaskTable`]. Its id is
//! the slot index, unique among live tasks and reused only after the slot
//! is reclaimed by a reap. Id 0 is the idle task.

pub mod ready_queue;
pub mod scheduler;
mod table;

pub use table::TaskTable;

use alloc::boxed::Box;
use core::fmt;

use crate::arch::Context;
use crate::memory::arena::{Allocation, HeapError};

/// Task identifier (slot index in the task table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    /// The idle task. Never reaped, never queued.
    pub const IDLE: TaskId = TaskId(0);

    pub const fn new(index: usize) -> Self {
        TaskId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::IDLE
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

/// One parking of one task, as recorded by a wait queue.
///
/// The ticket is unique for the kernel's lifetime, so an entry left behind
/// by a killed task can never wake the next occupant of its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub id: TaskId,
    ticket: u64,
}

impl Waiter {
    pub(crate) const fn new(id: TaskId, ticket: u64) -> Self {
        Waiter { id, ticket }
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet handed to the scheduler.
    New,
    /// Runnable, waiting for the core.
    Ready,
    /// Owns the core. At most one task is in this state.
    Running,
    /// Parked off the ready queue until a deadline or an explicit wake.
    Sleeping,
    /// Exited or killed; stack still held until reaped.
    Zombie,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::New => "NEW",
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Sleeping => "SLEEPING",
            TaskState::Zombie => "ZOMBIE",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling metrics, all in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMetrics {
    /// Ticks charged while Running (never counted for idle).
    pub ticks_used: u64,
    /// Caller-supplied burst estimate.
    pub burst_hint: u64,
    /// Running estimate used by shortest-job-first.
    pub burst_estimate: u64,
    pub arrival_time: u64,
    /// Tick of the first dispatch.
    pub start_time: Option<u64>,
    pub finish_time: Option<u64>,
    /// `start_time - arrival_time`, stamped once at first dispatch.
    pub wait_time: u64,
}

impl TaskMetrics {
    fn new(burst_hint: u64, now: u64) -> Self {
        TaskMetrics {
            ticks_used: 0,
            burst_hint,
            burst_estimate: burst_hint,
            arrival_time: now,
            start_time: None,
            finish_time: None,
            wait_time: 0,
        }
    }

    /// Turnaround time, once the task has finished.
    pub fn turnaround(&self) -> Option<u64> {
        self.finish_time
            .map(|finish| finish.saturating_sub(self.arrival_time))
    }

    /// One-half-weighted moving average of the burst estimate:
    /// `estimate' = (ticks_used + estimate) / 2`.
    pub fn update_burst_estimate(&mut self) {
        self.burst_estimate = (self.ticks_used + self.burst_estimate) / 2;
    }
}

/// What a task runs. Invoked exactly once, by the entry trampoline.
pub enum TaskEntry {
    /// Called with the creation argument, delivered in the argument
    /// register of the first context.
    Function(fn(usize)),
    /// Owns whatever state it needs.
    Closure(Box<dyn FnOnce() + Send + 'static>),
}

impl TaskEntry {
    pub fn invoke(self, argument: usize) {
        match self {
            TaskEntry::Function(f) => f(argument),
            TaskEntry::Closure(f) => f(),
        }
    }
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskEntry::Function(func) => write!(f, "Function({:p})", *func as *const ()),
            TaskEntry::Closure(_) => write!(f, "Closure"),
        }
    }
}

/// A schedulable task (PCB).
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) state: TaskState,
    pub(crate) context: Context,
    /// Owned from creation until the slot is reclaimed.
    pub(crate) stack: Allocation,
    pub(crate) entry: Option<TaskEntry>,
    pub(crate) argument: usize,
    pub(crate) metrics: TaskMetrics,
    /// Tick at which a sleeping task becomes ready again; `None` while
    /// parked on a wait queue.
    pub(crate) wake_at: Option<u64>,
    /// Ticket of the current parking; `None` unless Sleeping.
    pub(crate) wait_ticket: Option<u64>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        entry: TaskEntry,
        argument: usize,
        burst_hint: u64,
        stack: Allocation,
        context: Context,
        now: u64,
    ) -> Self {
        Task {
            id,
            state: TaskState::New,
            context,
            stack,
            entry: Some(entry),
            argument,
            metrics: TaskMetrics::new(burst_hint, now),
            wake_at: None,
            wait_ticket: None,
        }
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            state: self.state,
            argument: self.argument,
            stack_size: self.stack.size(),
            metrics: self.metrics,
        }
    }
}

/// Copyable view of a task for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub state: TaskState,
    pub argument: usize,
    pub stack_size: usize,
    pub metrics: TaskMetrics,
}

/// Task management errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// Every table slot holds a live or unreaped task.
    NoFreeTaskSlot,
    /// The stack arena could not supply a stack.
    OutOfMemory,
    /// No task with this id.
    InvalidTaskId,
    /// The idle task or the running task cannot be killed.
    Protected,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskError::NoFreeTaskSlot => write!(f, "no free task slot"),
            TaskError::OutOfMemory => write!(f, "out of memory"),
            TaskError::InvalidTaskId => write!(f, "invalid task id"),
            TaskError::Protected => write!(f, "task is protected"),
        }
    }
}

impl From<HeapError> for TaskError {
    fn from(e: HeapError) -> Self {
        match e {
            HeapError::ZeroSize | HeapError::OutOfMemory => TaskError::OutOfMemory,
            HeapError::InvalidBlock | HeapError::DoubleFree => TaskError::InvalidTaskId,
        }
    }
}
