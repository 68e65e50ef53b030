//! Coordinated shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cloneable signal observed by pollers and websocket sessions.
///
/// Idempotent: only the first `shutdown()` has effect. Poller threads check
/// [`is_shutdown`](Self::is_shutdown) between probes; async tasks await
/// [`wait`](Self::wait).
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    initiated: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        if !self.inner.initiated.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::Acquire)
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        while !self.is_shutdown() {
            let notified = self.inner.notify.notified();
            // Re-check: shutdown may have landed between the flag load and
            // registering the waiter.
            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_shutdown() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.wait().await });

        assert!(!signal.is_shutdown());
        signal.shutdown();
        signal.shutdown(); // idempotent
        task.await.unwrap();
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn wait_after_shutdown_is_immediate() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        signal.wait().await;
    }
}
