//! Per-property write throttling.
//!
//! A [`Throttler`] is a single-slot leading debounce: the first submission of
//! a burst schedules the work after a fixed delay, and every further
//! submission while that work is scheduled or running is dropped. The work
//! itself is expected to read the latest state when it fires, so the value
//! that finally goes out is the newest one, and intermediate values of the
//! burst never reach the device.
//!
//! ```text
//! submit  ─┬──┬──┬──────────────┬──
//!          │  x  x              │
//!          └── delay ──> work ──┘ slot free
//! ```
//!
//! Work receives a [`SlotRelease`] so it can free the slot itself, inside the
//! same critical section in which it decides there is nothing left to do.
//! Otherwise a submission landing between that decision and the task's end
//! would be dropped with nobody left to act on it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

/// Default delay before a throttled write fires.
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Slot {
    /// Bumped on every acquisition and on cancel, so a stale release or
    /// completion leaves the current execution's slot alone.
    generation: u64,
    busy: bool,
    token: CancellationToken,
}

impl Slot {
    fn release(&mut self, generation: u64) {
        if self.generation == generation {
            self.busy = false;
        }
    }
}

/// Lets running work free its throttler slot before it returns.
#[derive(Debug)]
pub struct SlotRelease {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
}

impl SlotRelease {
    /// Free the slot now; the next submission schedules a new execution.
    ///
    /// A no-op if the slot was cancelled or already released.
    pub fn release(&self) {
        lock(&self.slot).release(self.generation);
    }
}

/// Leading debounce with at most one scheduled or running execution.
#[derive(Debug, Clone)]
pub struct Throttler {
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Throttler {
    /// Create a throttler with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                busy: false,
                token: CancellationToken::new(),
            })),
        }
    }

    /// The delay between the first submission of a burst and execution.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether an execution is scheduled or running.
    pub fn is_busy(&self) -> bool {
        lock(&self.slot).busy
    }

    /// Submit work.
    ///
    /// If idle, `work` is scheduled after the delay and a handle to its
    /// outcome is returned. If an execution is already scheduled or running,
    /// `work` is dropped and `None` is returned; the timer is not reset.
    ///
    /// The slot is freed once the work completes, whether it succeeded or
    /// not, unless the work already freed it through its [`SlotRelease`].
    /// Nothing is retried.
    pub fn submit<F, Fut>(&self, work: F) -> Option<JoinHandle<Result<()>>>
    where
        F: FnOnce(SlotRelease) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (generation, token) = {
            let mut slot = lock(&self.slot);
            if slot.busy {
                trace!("throttler busy, dropping submission");
                return None;
            }
            slot.busy = true;
            slot.generation = slot.generation.wrapping_add(1);
            (slot.generation, slot.token.clone())
        };

        let delay = self.delay;
        let release = SlotRelease {
            slot: Arc::clone(&self.slot),
            generation,
        };
        let slot = Arc::clone(&self.slot);

        Some(tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = async move {
                    tokio::time::sleep(delay).await;
                    work(release).await
                } => result,
            };

            lock(&slot).release(generation);
            result
        }))
    }

    /// Drop any scheduled or running execution and free the slot.
    ///
    /// Work that has not started yet never runs; work that is running is
    /// aborted at its next await point.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        slot.token.cancel();
        slot.token = CancellationToken::new();
        slot.generation = slot.generation.wrapping_add(1);
        slot.busy = false;
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_DELAY)
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    // Slot state stays consistent even if a holder panicked
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn write_latest(
        latest: &Arc<Mutex<String>>,
        log: &Log,
    ) -> impl Future<Output = Result<()>> + Send + 'static + use<> {
        let latest = Arc::clone(latest);
        let log = Arc::clone(log);
        async move {
            let value = latest.lock().unwrap().clone();
            log.lock().unwrap().push(value);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_sends_latest_value_once() {
        let throttler = Throttler::new(Duration::from_millis(100));
        let latest = Arc::new(Mutex::new(String::new()));
        let log: Log = Arc::default();
        let mut handles = Vec::new();

        for value in ["1", "2", "3"] {
            *latest.lock().unwrap() = value.to_string();
            let (latest, log) = (Arc::clone(&latest), Arc::clone(&log));
            if let Some(handle) = throttler.submit(move |_| write_latest(&latest, &log)) {
                handles.push(handle);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(handles.len(), 1);
        assert!(throttler.is_busy());

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["3".to_string()]);
        assert!(!throttler.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_is_not_reset() {
        let throttler = Throttler::new(Duration::from_millis(100));
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let handle = throttler
            .submit(move |_| async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(throttler.submit(|_| async { Ok(()) }).is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // fired at 100ms despite the submission at 90ms
        assert_eq!(count.load(Ordering::SeqCst), 1);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_frees_slot() {
        let throttler = Throttler::new(Duration::from_millis(10));
        let handle = throttler
            .submit(|_| async { Err(Error::NotConnected) })
            .unwrap();
        assert!(matches!(handle.await.unwrap(), Err(Error::NotConnected)));
        assert!(!throttler.is_busy());

        // a new burst is accepted
        let handle = throttler.submit(|_| async { Ok(()) }).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire() {
        let throttler = Throttler::new(Duration::from_millis(100));
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let handle = throttler
            .submit(move |_| async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        throttler.cancel();
        assert!(!throttler.is_busy());

        assert!(matches!(handle.await.unwrap(), Err(Error::Cancelled)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_completion_keeps_new_slot() {
        let throttler = Throttler::new(Duration::from_millis(10));

        let slow = throttler
            .submit(|_| async {
                tokio::time::sleep(Duration::from_millis(1000)).await;
                Ok(())
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        throttler.cancel();

        let fresh = throttler
            .submit(|_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .unwrap();

        // the cancelled task finishing must not free the fresh burst's slot
        assert!(matches!(slow.await.unwrap(), Err(Error::Cancelled)));
        assert!(throttler.is_busy());

        fresh.await.unwrap().unwrap();
        assert!(!throttler.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_release_accepts_next_submission() {
        let throttler = Throttler::new(Duration::from_millis(10));
        let (released_tx, released_rx) = tokio::sync::oneshot::channel();
        let (finish_tx, finish_rx) = tokio::sync::oneshot::channel::<()>();

        let first = throttler
            .submit(move |release| async move {
                release.release();
                let _ = released_tx.send(());
                let _ = finish_rx.await;
                Ok(())
            })
            .unwrap();
        released_rx.await.unwrap();

        // the first task is still running, yet its slot is free
        assert!(!throttler.is_busy());
        let second = throttler
            .submit(|_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .unwrap();

        // the first task's end must not free the second one's slot
        finish_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert!(throttler.is_busy());

        second.await.unwrap().unwrap();
        assert!(!throttler.is_busy());
    }

    #[test]
    fn test_default_delay() {
        assert_eq!(Throttler::default().delay(), Duration::from_millis(100));
    }
}
