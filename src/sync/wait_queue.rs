//! Bounded FIFO of parked tasks.

use crate::config::MAX_TASKS;
use crate::task::Waiter;

/// Ring buffer of waiters, oldest first. Const-constructible so it can sit
/// inside `static` primitives.
pub struct WaitQueue {
    slots: [Option<Waiter>; MAX_TASKS],
    head: usize,
    len: usize,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            slots: [None; MAX_TASKS],
            head: 0,
            len: 0,
        }
    }

    /// Appends a waiter, handing it back if the queue is full.
    pub fn push(&mut self, waiter: Waiter) -> Result<(), Waiter> {
        if self.len == MAX_TASKS {
            return Err(waiter);
        }
        self.slots[(self.head + self.len) % MAX_TASKS] = Some(waiter);
        self.len += 1;
        Ok(())
    }

    /// Oldest waiter.
    pub fn pop(&mut self) -> Option<Waiter> {
        if self.len == 0 {
            return None;
        }
        let waiter = self.slots[self.head].take();
        self.head = (self.head + 1) % MAX_TASKS;
        self.len -= 1;
        waiter
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;

    fn waiter(index: usize) -> Waiter {
        Waiter::new(TaskId::new(index), index as u64)
    }

    #[test]
    fn wakes_in_arrival_order() {
        let mut q = WaitQueue::new();
        for i in [4, 2, 9] {
            q.push(waiter(i)).unwrap();
        }
        assert_eq!(q.pop(), Some(waiter(4)));
        assert_eq!(q.pop(), Some(waiter(2)));
        assert_eq!(q.pop(), Some(waiter(9)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn wraps_around() {
        let mut q = WaitQueue::new();
        for round in 0..3 {
            for i in 0..MAX_TASKS {
                q.push(waiter(i)).unwrap();
            }
            assert_eq!(q.push(waiter(99)), Err(waiter(99)));
            for _ in 0..MAX_TASKS - 1 {
                q.pop().unwrap();
            }
            assert_eq!(q.pop(), Some(waiter(MAX_TASKS - 1)), "round {}", round);
        }
        assert!(q.is_empty());
    }
}
