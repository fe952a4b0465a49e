//! Latest-wins coalescing of delayed work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// The one task waiting for its quiet period to end.
struct Pending {
    cancel_flag: Arc<AtomicBool>,
    fire_now: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Holds at most one pending task. Scheduling a new task cancels the pending
/// one and restarts the delay, so a burst of requests runs only the last.
///
/// Runs never overlap: each task waits for its predecessor to finish before
/// starting, so a slow earlier run cannot land after a later one.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<Pending>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Run `task` once `delay` passes without another call to `schedule`.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let fire_now = Arc::new(Notify::new());
        let delay = self.delay;

        let mut pending = self.lock();
        let predecessor = pending.take().map(|previous| {
            previous.cancel_flag.store(true, Ordering::SeqCst);
            previous.fire_now.notify_one();
            previous.handle
        });

        let flag = Arc::clone(&cancel_flag);
        let wake = Arc::clone(&fire_now);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wake.notified() => {}
            }
            if let Some(predecessor) = predecessor {
                let _ = predecessor.await;
            }
            if flag.load(Ordering::SeqCst) {
                return;
            }
            task.await;
        });

        *pending = Some(Pending {
            cancel_flag,
            fire_now,
            handle,
        });
    }

    /// Whether a scheduled task has not finished yet.
    pub fn is_pending(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Drop the pending task without running it, and wait for any run that
    /// had already started.
    pub async fn cancel(&self) {
        let pending = self.lock().take();
        if let Some(previous) = pending {
            previous.cancel_flag.store(true, Ordering::SeqCst);
            previous.fire_now.notify_one();
            let _ = previous.handle.await;
        }
    }

    /// Run the pending task now, if any, and wait for it and every earlier
    /// run to finish.
    pub async fn flush(&self) {
        let pending = self.lock().take();
        if let Some(pending) = pending {
            pending.fire_now.notify_one();
            let _ = pending.handle.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
