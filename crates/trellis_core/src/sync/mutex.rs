//! Mutex with debug-mode owner tracking, and its condition variable.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicU64, Ordering};

/// Returns a process-unique, non-zero token for the calling thread.
#[cfg(debug_assertions)]
fn thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|t| *t)
}

/// A mutual exclusion lock.
///
/// In debug builds the lock remembers which thread holds it, which enables
/// [`Mutex::is_locked_by_this_thread`] and turns a re-entrant `lock()` into an
/// assertion failure instead of a silent deadlock.
pub struct Mutex<T: ?Sized> {
    #[cfg(debug_assertions)]
    owner: AtomicU64,
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates a new unlocked mutex.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: AtomicU64::new(0),
            inner: parking_lot::const_mutex(value),
        }
    }

    /// Consumes the mutex, returning the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the lock, blocking until it is available.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the calling thread already holds the lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        #[cfg(debug_assertions)]
        assert!(
            !self.is_locked_by_this_thread(),
            "re-entrant lock: this thread already holds the mutex"
        );
        let guard = self.inner.lock();
        MutexGuard::claim(self, guard)
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner
            .try_lock()
            .map(|guard| MutexGuard::claim(self, guard))
    }

    /// Returns true if some thread holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Returns true if the calling thread holds the lock.
    ///
    /// Owner tracking only exists in debug builds; release builds
    /// conservatively report whether anyone holds the lock.
    #[must_use]
    pub fn is_locked_by_this_thread(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.owner.load(Ordering::Acquire) == thread_token()
        }
        #[cfg(not(debug_assertions))]
        {
            self.inner.is_locked()
        }
    }

    /// Returns a mutable reference to the value; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// RAII guard; the lock is released when the guard is dropped.
pub struct MutexGuard<'a, T: ?Sized> {
    #[cfg(debug_assertions)]
    mutex: &'a Mutex<T>,
    inner: parking_lot::MutexGuard<'a, T>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    #[cfg_attr(not(debug_assertions), allow(unused_variables))]
    fn claim(mutex: &'a Mutex<T>, inner: parking_lot::MutexGuard<'a, T>) -> Self {
        let guard = Self {
            #[cfg(debug_assertions)]
            mutex,
            inner,
        };
        guard.mark_owned();
        guard
    }

    #[inline]
    fn mark_owned(&self) {
        #[cfg(debug_assertions)]
        self.mutex.owner.store(thread_token(), Ordering::Release);
    }

    #[inline]
    fn mark_released(&self) {
        #[cfg(debug_assertions)]
        self.mutex.owner.store(0, Ordering::Release);
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // Runs before `inner` unlocks.
        self.mark_released();
    }
}

/// Condition variable paired with [`Mutex`].
///
/// Waiting releases ownership bookkeeping for the duration of the wait.
#[derive(Debug, Default)]
pub struct Condvar {
    inner: parking_lot::Condvar,
}

impl Condvar {
    /// Creates a new condition variable.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::Condvar::new(),
        }
    }

    /// Blocks until notified.
    pub fn wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>) {
        guard.mark_released();
        self.inner.wait(&mut guard.inner);
        guard.mark_owned();
    }

    /// Blocks until notified or `timeout` elapses. Returns true on timeout.
    pub fn wait_for<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        guard.mark_released();
        let result = self.inner.wait_for(&mut guard.inner, timeout);
        guard.mark_owned();
        result.timed_out()
    }

    /// Blocks until notified or `deadline` passes. Returns true on timeout.
    pub fn wait_until<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, deadline: Instant) -> bool {
        guard.mark_released();
        let result = self.inner.wait_until(&mut guard.inner, deadline);
        guard.mark_owned();
        result.timed_out()
    }

    /// Wakes one waiter.
    pub fn notify_one(&self) -> bool {
        self.inner.notify_one()
    }

    /// Wakes all waiters.
    pub fn notify_all(&self) -> usize {
        self.inner.notify_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_owner_tracking() {
        let mutex = Mutex::new(5);
        assert!(!mutex.is_locked_by_this_thread());
        {
            let mut guard = mutex.lock();
            *guard += 1;
            assert!(mutex.is_locked_by_this_thread());
        }
        assert!(!mutex.is_locked_by_this_thread());
        assert_eq!(*mutex.lock(), 6);
    }

    #[test]
    fn test_other_thread_is_not_owner() {
        let mutex = Arc::new(Mutex::new(()));
        let _guard = mutex.lock();
        let remote = Arc::clone(&mutex);
        let seen = thread::spawn(move || (remote.is_locked(), remote.try_lock().is_none()))
            .join()
            .unwrap();
        assert_eq!(seen, (true, true));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_other_thread_owner_flag() {
        let mutex = Arc::new(Mutex::new(()));
        let _guard = mutex.lock();
        let remote = Arc::clone(&mutex);
        let by_remote = thread::spawn(move || remote.is_locked_by_this_thread())
            .join()
            .unwrap();
        assert!(!by_remote);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "re-entrant lock")]
    fn test_reentrant_lock_panics() {
        let mutex = Mutex::new(0);
        let _first = mutex.lock();
        let _second = mutex.lock();
    }

    #[test]
    fn test_condvar_handoff() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let remote = Arc::clone(&pair);
        let handle = thread::spawn(move || {
            let (lock, cvar) = &*remote;
            *lock.lock() = true;
            cvar.notify_all();
        });

        let (lock, cvar) = &*pair;
        let mut ready = lock.lock();
        while !*ready {
            cvar.wait(&mut ready);
            assert!(lock.is_locked_by_this_thread());
        }
        drop(ready);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_times_out() {
        let lock = Mutex::new(());
        let cvar = Condvar::new();
        let mut guard = lock.lock();
        assert!(cvar.wait_for(&mut guard, Duration::from_millis(5)));
    }
}
