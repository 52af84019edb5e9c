//! Inactivity timer for the personal vault.
//!
//! One watcher task per unlocked session sleeps until the current deadline.
//! Activity only moves the deadline forward; the watcher notices on wake-up
//! and goes back to sleep instead of being respawned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub(crate) struct AutoLock {
    timeout: Option<Duration>,
    deadline: Arc<Mutex<Instant>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl AutoLock {
    /// `None` disables the timer entirely.
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadline: Arc::new(Mutex::new(Instant::now())),
            watcher: Mutex::new(None),
        }
    }

    /// Start a fresh countdown and run `on_expiry` once it elapses without
    /// activity. Replaces (and cancels) any previous watcher.
    pub(crate) fn arm<F, Fut>(&self, on_expiry: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(timeout) = self.timeout else {
            return;
        };
        *self.deadline.lock() = Instant::now() + timeout;
        let deadline = Arc::clone(&self.deadline);
        let handle = tokio::spawn(async move {
            loop {
                let target = *deadline.lock();
                sleep_until(target).await;
                let current = *deadline.lock();
                if Instant::now() >= current {
                    break;
                }
            }
            on_expiry().await;
        });
        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Push the deadline out by a full timeout.
    pub(crate) fn reset(&self) {
        if let Some(timeout) = self.timeout {
            *self.deadline.lock() = Instant::now() + timeout;
        }
    }

    pub(crate) fn disarm(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }

    /// Forget the watcher without cancelling it. Called from inside the
    /// watcher, which must not abort itself.
    pub(crate) fn detach(&self) {
        self.watcher.lock().take();
    }

    pub(crate) fn expired(&self) -> bool {
        self.timeout.is_some() && Instant::now() >= *self.deadline.lock()
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.timeout?;
        Some(self.deadline.lock().saturating_duration_since(Instant::now()))
    }
}

impl Drop for AutoLock {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_expiry(fired: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let fired = Arc::clone(fired);
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = AutoLock::new(Some(Duration::from_secs(60)));
        timer.arm(counter_expiry(&fired));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timer.remaining(), Some(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_postpones() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = AutoLock::new(Some(Duration::from_secs(60)));
        timer.arm(counter_expiry(&fired));
        tokio::time::sleep(Duration::from_secs(50)).await;
        timer.reset();
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_and_disabled() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = AutoLock::new(Some(Duration::from_secs(10)));
        timer.arm(counter_expiry(&fired));
        timer.disarm();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let off = AutoLock::new(None);
        off.arm(counter_expiry(&fired));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!off.expired());
        assert_eq!(off.remaining(), None);
    }
}
