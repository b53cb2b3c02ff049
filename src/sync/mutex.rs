//! Sleeping mutex built on a binary semaphore.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use super::Semaphore;

/// Mutual exclusion between tasks. Contended lockers park instead of
/// spinning; the lock passes to waiters in arrival order.
///
/// Not for use from interrupt context.
pub struct Mutex<T> {
    sem: Semaphore,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `sem`.
unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Mutex {
            sem: Semaphore::new(1),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.sem.wait();
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.sem.try_wait().then(|| MutexGuard { mutex: self })
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// Releases the lock when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the only permit.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the only permit.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.sem.post();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let m = Mutex::new(0u32);
        {
            let mut guard = m.lock();
            *guard += 5;
            assert!(m.try_lock().is_none());
        }
        let guard = m.try_lock().unwrap();
        assert_eq!(*guard, 5);
        drop(guard);
        assert_eq!(m.into_inner(), 5);
    }
}
