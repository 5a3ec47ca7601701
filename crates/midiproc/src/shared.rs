//! State shared between the RT callback and the worker threads
//!
//! The callback may only ever *try* to take a lock. [`RtLock`] makes that a
//! type-level rule: `try_lock` is available to everyone, but the blocking
//! `lock` needs a [`WorkerToken`], and tokens are only handed to code that
//! runs outside the callback (the worker threads and the control thread).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Proof that the holder runs on a thread allowed to block
#[derive(Debug)]
pub struct WorkerToken {
    _private: (),
}

impl WorkerToken {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Mutex with a non-blocking path for the RT side
///
/// Poisoning is ignored: nothing that holds these locks can panic halfway
/// through an update, so the data is still consistent.
#[derive(Debug, Default)]
pub struct RtLock<T> {
    inner: Mutex<T>,
}

impl<T> RtLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Take the lock if it is free right now
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Wait for the lock
    pub fn lock(&self, _token: &WorkerToken) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wakeup from the callback to the output worker
///
/// A pending flag under an [`RtLock`] plus a condvar. The callback sets the
/// flag only if it can get the lock immediately; otherwise the worker picks
/// the data up on its next timed wakeup.
#[derive(Debug, Default)]
pub struct HandoffSignal {
    pending: RtLock<bool>,
    ready: Condvar,
}

impl HandoffSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking notify; false if the lock was contended
    pub fn try_notify(&self) -> bool {
        match self.pending.try_lock() {
            Some(mut pending) => {
                *pending = true;
                self.ready.notify_one();
                true
            }
            None => false,
        }
    }

    /// Blocking notify, for shutdown
    pub fn notify(&self, token: &WorkerToken) {
        let mut pending = self.pending.lock(token);
        *pending = true;
        self.ready.notify_one();
    }

    /// Hold the pending flag, making `try_notify` fail until released
    #[cfg(test)]
    pub(crate) fn hold(&self, token: &WorkerToken) -> MutexGuard<'_, bool> {
        self.pending.lock(token)
    }

    /// Wait until notified or `timeout` passes, then clear the flag
    ///
    /// Returns true if a notification was consumed.
    pub fn wait(&self, token: &WorkerToken, timeout: Duration) -> bool {
        let mut pending = self.pending.lock(token);
        if !*pending {
            pending = self
                .ready
                .wait_timeout(pending, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        std::mem::replace(&mut *pending, false)
    }
}

/// Cooperative stop flag polled by the worker loops
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Diagnostic counters, bumped with relaxed atomics from any thread
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub callbacks: AtomicU64,
    /// Input events queued for the output worker
    pub captured: AtomicU64,
    /// Input events dropped because the handoff ring was full
    pub capture_dropped: AtomicU64,
    /// Records sent on the outbound channel
    pub forwarded: AtomicU64,
    /// Well-formed records received on the inbound channel
    pub received: AtomicU64,
    pub malformed: AtomicU64,
    pub pool_exhausted: AtomicU64,
    pub heap_full: AtomicU64,
    pub emitted: AtomicU64,
    /// Scheduled events rejected by the duplicate filter
    pub filtered: AtomicU64,
    /// Events lost because the output buffer refused them
    pub reserve_failed: AtomicU64,
    pub heap_lock_skipped: AtomicU64,
    pub signal_skipped: AtomicU64,
}

impl BridgeStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            callbacks: get(&self.callbacks),
            captured: get(&self.captured),
            capture_dropped: get(&self.capture_dropped),
            forwarded: get(&self.forwarded),
            received: get(&self.received),
            malformed: get(&self.malformed),
            pool_exhausted: get(&self.pool_exhausted),
            heap_full: get(&self.heap_full),
            emitted: get(&self.emitted),
            filtered: get(&self.filtered),
            reserve_failed: get(&self.reserve_failed),
            heap_lock_skipped: get(&self.heap_lock_skipped),
            signal_skipped: get(&self.signal_skipped),
        }
    }
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub callbacks: u64,
    pub captured: u64,
    pub capture_dropped: u64,
    pub forwarded: u64,
    pub received: u64,
    pub malformed: u64,
    pub pool_exhausted: u64,
    pub heap_full: u64,
    pub emitted: u64,
    pub filtered: u64,
    pub reserve_failed: u64,
    pub heap_lock_skipped: u64,
    pub signal_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_try_lock_fails_while_held() {
        let lock = RtLock::new(5u32);
        let token = WorkerToken::new();
        let guard = lock.lock(&token);
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert_eq!(*lock.try_lock().unwrap(), 5);
    }

    #[test]
    fn test_poisoned_lock_still_usable() {
        let lock = Arc::new(RtLock::new(1u32));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let token = WorkerToken::new();
            let _guard = poisoner.lock(&token);
            panic!("poison");
        })
        .join();
        assert_eq!(*lock.try_lock().unwrap(), 1);
    }

    #[test]
    fn test_try_notify_contended() {
        let signal = HandoffSignal::new();
        let token = WorkerToken::new();
        let guard = signal.pending.lock(&token);
        assert!(!signal.try_notify());
        drop(guard);
        assert!(signal.try_notify());
    }

    #[test]
    fn test_wait_consumes_notification() {
        let signal = HandoffSignal::new();
        let token = WorkerToken::new();
        assert!(signal.try_notify());
        assert!(signal.wait(&token, Duration::from_millis(1)));
        // Flag was cleared
        assert!(!signal.wait(&token, Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_wakes_on_notify_from_other_thread() {
        let signal = Arc::new(HandoffSignal::new());
        let notifier = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify(&WorkerToken::new());
        });

        let start = Instant::now();
        let token = WorkerToken::new();
        let mut woke = false;
        while !woke && start.elapsed() < Duration::from_secs(5) {
            woke = signal.wait(&token, Duration::from_millis(500));
        }
        handle.join().unwrap();
        assert!(woke);
    }

    #[test]
    fn test_shutdown_shared_between_clones() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        assert!(!other.is_set());
        shutdown.trigger();
        assert!(other.is_set());
    }

    #[test]
    fn test_snapshot_reads_counters() {
        let stats = BridgeStats::default();
        BridgeStats::bump(&stats.emitted);
        BridgeStats::bump(&stats.emitted);
        BridgeStats::bump(&stats.heap_full);
        let snap = stats.snapshot();
        assert_eq!(snap.emitted, 2);
        assert_eq!(snap.heap_full, 1);
        assert_eq!(snap.captured, 0);
    }
}
