//! Counting semaphore with FIFO hand-off.

use spin::Mutex;

use super::WaitQueue;
use crate::arch::interrupts;
use crate::kernel;
use crate::task::Waiter;

struct State {
    count: usize,
    waiters: WaitQueue,
}

/// A counting semaphore for tasks.
///
/// `post` with waiters present hands the permit straight to the oldest one
/// instead of raising the count, so a late `wait` cannot overtake a parked
/// task. Entries of waiters killed meanwhile are skipped.
pub struct Semaphore {
    state: Mutex<State>,
}

enum Attempt {
    Acquired,
    Parked(Waiter),
    Retry,
}

impl Semaphore {
    pub const fn new(count: usize) -> Self {
        Semaphore {
            state: Mutex::new(State {
                count,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Takes a permit, parking the calling task until one is handed over.
    pub fn wait(&self) {
        loop {
            match self.acquire_or_park() {
                Attempt::Acquired => return,
                Attempt::Parked(waiter) => {
                    // Resumed only once `post` has woken us with a permit.
                    while kernel::is_parked(waiter.id) {
                        kernel::yield_now();
                    }
                    return;
                }
                // No parkable caller (boot flow or idle): spin cooperatively.
                Attempt::Retry => kernel::yield_now(),
            }
        }
    }

    fn acquire_or_park(&self) -> Attempt {
        interrupts::without_interrupts(|| {
            let mut state = self.state.lock();
            if state.count > 0 {
                state.count -= 1;
                return Attempt::Acquired;
            }
            let Some(waiter) = kernel::park_current() else {
                return Attempt::Retry;
            };
            match state.waiters.push(waiter) {
                Ok(()) => Attempt::Parked(waiter),
                Err(waiter) => {
                    kernel::wake_waiter(waiter);
                    Attempt::Retry
                }
            }
        })
    }

    /// Takes a permit if one is available right now.
    pub fn try_wait(&self) -> bool {
        interrupts::without_interrupts(|| {
            let mut state = self.state.lock();
            if state.count == 0 {
                return false;
            }
            state.count -= 1;
            true
        })
    }

    /// Releases a permit to the oldest live waiter, or to the count.
    pub fn post(&self) {
        interrupts::without_interrupts(|| {
            let mut state = self.state.lock();
            while let Some(waiter) = state.waiters.pop() {
                if kernel::wake_waiter(waiter) {
                    return;
                }
            }
            state.count += 1;
        })
    }

    /// Permits currently available.
    pub fn count(&self) -> usize {
        interrupts::without_interrupts(|| self.state.lock().count)
    }

    /// Tasks currently parked on this semaphore.
    pub fn waiters(&self) -> usize {
        interrupts::without_interrupts(|| self.state.lock().waiters.len())
    }
}
