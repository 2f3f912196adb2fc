//! Spinlock guarding the task table's shape
//!
//! A plain spin-until-acquired lock that owns the data it protects. The
//! acquiring core is recorded so the scheduler can assert it is never
//! entered with the lock held; critical sections under this lock must not
//! call back into the scheduler.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::task::CpuId;

const NO_OWNER: usize = usize::MAX;

pub struct SpinLock<T> {
    locked: AtomicBool,
    owner: AtomicUsize,
    data: UnsafeCell<T>,
}

// SpinLock hands out access to `data` to one holder at a time
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new unlocked spinlock
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(NO_OWNER),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock on behalf of `cpu`, spinning until it is free.
    pub fn lock(&self, cpu: CpuId) -> SpinLockGuard<'_, T> {
        debug_assert!(!self.is_held_by(cpu), "cpu {} re-acquired a spinlock it holds", cpu);

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        self.owner.store(cpu, Ordering::Relaxed);

        SpinLockGuard { lock: self }
    }

    /// Whether `cpu` currently holds the lock.
    pub fn is_held_by(&self, cpu: CpuId) -> bool {
        self.locked.load(Ordering::Relaxed) && self.owner.load(Ordering::Relaxed) == cpu
    }

    fn unlock(&self) {
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
    }
}

/// RAII guard for spinlock
///
/// When dropped, releases the lock
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while the lock is held
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while the lock is held
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_tracks_owner() {
        let lock = SpinLock::new(0u32);
        {
            let mut guard = lock.lock(2);
            *guard += 1;
            assert!(lock.is_held_by(2));
            assert!(!lock.is_held_by(0));
        }
        assert!(!lock.is_held_by(2));
        assert_eq!(*lock.lock(0), 1);
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let lock = Arc::new(SpinLock::new(0u64));
        let workers: std::vec::Vec<_> = (0..4)
            .map(|cpu| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock(cpu) += 1;
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*lock.lock(0), 4000);
    }
}
