use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Reusable acquire/release primitive backing the pinned connection in
/// `SingleConnection`/`SingleWriter`/`KeepAlive` modes. Supports both a
/// blocking acquisition (native `Condvar`, no "await on a task result"
/// trick — see the sync-over-async design note) and a suspension-point
/// acquisition (`tokio::sync::Notify`), sharing one `held` flag so mixed
/// sync/async callers still serialize correctly against each other.
///
/// Adapted from a counting semaphore to a single boolean permit: the core
/// never needs more than mutual exclusion around the pinned connection.
pub struct PinnedLock {
    held: Mutex<bool>,
    condvar: Condvar,
    notify: Notify,
}

impl Default for PinnedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl PinnedLock {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(false),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub fn acquire_blocking(&self) -> PinnedLockGuard<'_> {
        let mut held = lock_mutex(&self.held);
        while *held {
            held = condvar_wait(&self.condvar, held);
        }
        *held = true;
        PinnedLockGuard { lock: self }
    }

    /// `timeout == Duration::ZERO` plus contention returns `None`
    /// immediately without sleeping.
    pub fn try_acquire_blocking(&self, timeout: Duration) -> Option<PinnedLockGuard<'_>> {
        let mut held = lock_mutex(&self.held);

        if timeout.is_zero() {
            if *held {
                return None;
            }
            *held = true;
            return Some(PinnedLockGuard { lock: self });
        }

        let deadline = Instant::now() + timeout;
        while *held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (next_held, timeout_result) = match self.condvar.wait_timeout(held, remaining) {
                Ok(pair) => pair,
                Err(poisoned) => poisoned.into_inner(),
            };
            held = next_held;
            if timeout_result.timed_out() && *held {
                return None;
            }
        }
        *held = true;
        Some(PinnedLockGuard { lock: self })
    }

    pub async fn acquire(&self) -> PinnedLockGuard<'_> {
        loop {
            {
                let mut held = lock_mutex(&self.held);
                if !*held {
                    *held = true;
                    return PinnedLockGuard { lock: self };
                }
            }
            self.notify.notified().await;
        }
    }

    fn release(&self) {
        {
            let mut held = lock_mutex(&self.held);
            *held = false;
        }
        self.condvar.notify_one();
        self.notify.notify_one();
    }
}

/// Held while the pinned connection is in use. Release on drop is
/// idempotent by construction: ownership of the guard is the only way to
/// call `release`, and Rust drops a value at most once.
pub struct PinnedLockGuard<'a> {
    lock: &'a PinnedLock,
}

impl Drop for PinnedLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

fn lock_mutex<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn condvar_wait<'a, T>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, T>,
) -> std::sync::MutexGuard<'a, T> {
    match condvar.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The lock a connection strategy hands out. `Standard` mode has nothing
/// to serialize, so it vends `ConnectionLock::NoOp`, whose acquisitions
/// always succeed immediately and whose guard does nothing on drop.
pub enum ConnectionLock {
    Pinned(std::sync::Arc<PinnedLock>),
    NoOp,
}

impl ConnectionLock {
    pub fn acquire_blocking(&self) -> Option<PinnedLockGuard<'_>> {
        match self {
            ConnectionLock::Pinned(lock) => Some(lock.acquire_blocking()),
            ConnectionLock::NoOp => None,
        }
    }

    pub async fn acquire(&self) -> Option<PinnedLockGuard<'_>> {
        match self {
            ConnectionLock::Pinned(lock) => Some(lock.acquire().await),
            ConnectionLock::NoOp => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_blocking_acquire_waits_for_release() {
        let lock = Arc::new(PinnedLock::new());
        let guard = lock.acquire_blocking();

        let lock2 = lock.clone();
        let handle = thread::spawn(move || {
            let _guard = lock2.acquire_blocking();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn try_acquire_with_zero_timeout_fails_fast_under_contention() {
        let lock = PinnedLock::new();
        let _guard = lock.acquire_blocking();

        let start = Instant::now();
        let result = lock.try_acquire_blocking(Duration::ZERO);
        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn try_acquire_succeeds_once_released() {
        let lock = PinnedLock::new();
        {
            let _guard = lock.acquire_blocking();
        }
        assert!(lock.try_acquire_blocking(Duration::ZERO).is_some());
    }

    #[tokio::test]
    async fn async_acquire_waits_for_blocking_release() {
        let lock = Arc::new(PinnedLock::new());
        let guard = lock.acquire_blocking();

        let lock2 = lock.clone();
        let task = tokio::spawn(async move {
            let _guard = lock2.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        drop(guard);
        task.await.unwrap();
    }
}
