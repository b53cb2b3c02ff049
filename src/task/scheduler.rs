//! Scheduling policy: round-robin or shortest-job-first.
//!
//! The scheduler owns the ready queue and the dispatch bookkeeping (current
//! task, remaining quantum, preemption switch, reschedule request). It
//! never touches registers: the kernel asks it for a decision and performs
//! the context switch itself.
//!
//! The idle task is not kept in the ready queue. It is what `pick_next`
//! falls back to when nothing else is runnable, so it can never be chosen
//! over real work, whatever its burst estimate.

use core::fmt;

use super::ready_queue::ReadyQueue;
use super::{TaskId, TaskState, TaskTable};

/// Scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// FIFO ready queue with a fixed tick quantum.
    RoundRobin,
    /// Non-preemptive; smallest burst estimate first, ties by arrival.
    ShortestJobFirst,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Policy::RoundRobin => write!(f, "RR"),
            Policy::ShortestJobFirst => write!(f, "SJF"),
        }
    }
}

/// Dispatch state for the single core.
pub struct Scheduler {
    policy: Policy,
    current: Option<TaskId>,
    quantum: u32,
    quantum_left: u32,
    preempt: bool,
    need_resched: bool,
    ready: ReadyQueue,
}

impl Scheduler {
    pub fn new(quantum: u32, preempt: bool) -> Self {
        Scheduler {
            policy: Policy::RoundRobin,
            current: None,
            quantum,
            quantum_left: quantum,
            preempt,
            need_resched: false,
            ready: ReadyQueue::new(),
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
        if policy == Policy::RoundRobin {
            self.quantum_left = self.quantum;
        }
    }

    pub fn preempt(&self) -> bool {
        self.preempt
    }

    /// Turning preemption on under round-robin starts a fresh quantum and
    /// asks for a reschedule right away.
    pub fn set_preempt(&mut self, on: bool) {
        self.preempt = on;
        if on && self.policy == Policy::RoundRobin {
            self.need_resched = true;
            self.quantum_left = self.quantum;
        }
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn quantum_left(&self) -> u32 {
        self.quantum_left
    }

    pub fn reschedule_requested(&self) -> bool {
        self.need_resched
    }

    pub fn request_reschedule(&mut self) {
        self.need_resched = true;
    }

    /// Clears the reschedule request, returning whether one was pending.
    pub fn take_reschedule(&mut self) -> bool {
        core::mem::replace(&mut self.need_resched, false)
    }

    pub fn is_queued(&self, id: TaskId) -> bool {
        self.ready.contains(id)
    }

    /// Marks `id` Ready and queues it, requesting a reschedule.
    ///
    /// A full queue drops the task: its state is left as it was and the drop
    /// is logged, with `false` returned. The idle task is only marked.
    pub fn enqueue(&mut self, tasks: &mut TaskTable, id: TaskId) -> bool {
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };

        if id.is_idle() {
            task.state = TaskState::Ready;
            return true;
        }

        if self.ready.push_back(id).is_err() {
            log::warn!(target: "sched", "ready queue full, dropping {}", id);
            return false;
        }
        task.state = TaskState::Ready;
        self.need_resched = true;
        true
    }

    /// Drops any queued reference to `id`.
    pub fn dequeue(&mut self, id: TaskId) -> bool {
        self.ready.purge(id)
    }

    /// Takes the next task to run out of the ready set according to the
    /// policy, falling back to the idle task when the set is empty.
    pub fn pick_next(&mut self, tasks: &TaskTable) -> Option<TaskId> {
        let picked = match self.policy {
            Policy::RoundRobin => self.ready.pop_front(),
            Policy::ShortestJobFirst => self.pick_shortest(tasks),
        };

        picked.or_else(|| {
            tasks
                .get(TaskId::IDLE)
                .filter(|idle| matches!(idle.state, TaskState::Ready | TaskState::Running))
                .map(|idle| idle.id)
        })
    }

    fn pick_shortest(&mut self, tasks: &TaskTable) -> Option<TaskId> {
        let best = self
            .ready
            .iter()
            .enumerate()
            .filter_map(|(position, id)| tasks.get(id).map(|t| (position, t.metrics)))
            .min_by_key(|(_, m)| (m.burst_estimate, m.arrival_time))
            .map(|(position, _)| position)?;
        self.ready.remove_at(best)
    }

    /// Records that `id` now owns the core: clears the reschedule request
    /// and starts a fresh quantum.
    pub fn dispatched(&mut self, id: TaskId) {
        self.current = Some(id);
        self.need_resched = false;
        self.quantum_left = self.quantum;
    }

    /// Per-tick accounting and the policy's preemption rule.
    pub fn on_tick(&mut self, tasks: &mut TaskTable) {
        let Some(current) = self.current else {
            if !self.ready.is_empty() {
                self.need_resched = true;
            }
            return;
        };

        if !current.is_idle() {
            if let Some(task) = tasks.get_mut(current) {
                task.metrics.ticks_used += 1;
            }
        }

        match self.policy {
            Policy::RoundRobin => {
                if self.preempt {
                    self.quantum_left = self.quantum_left.saturating_sub(1);
                    if self.quantum_left == 0 {
                        self.need_resched = true;
                        self.quantum_left = self.quantum;
                    }
                }
            }
            Policy::ShortestJobFirst => {
                if current.is_idle() && !self.ready.is_empty() {
                    self.need_resched = true;
                }
            }
        }
    }
}
