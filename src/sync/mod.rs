//! Blocking synchronization between tasks.
//!
//! Waiters are parked off the ready queue and woken explicitly in FIFO
//! order, instead of spinning through scheduling turns.

mod mutex;
mod semaphore;
mod wait_queue;

pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
pub use wait_queue::WaitQueue;
