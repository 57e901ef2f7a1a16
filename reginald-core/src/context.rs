//! The host-wide cancellation context (§5 "Cancellation semantics").
//!
//! The root context is cancelled once, on the first fatal error or on
//! SIGINT/SIGTERM; every suspension point in the crate (`Transport::call`,
//! stage execution, shutdown) accepts a [`Shutdown`] clone and races it
//! against its own work so cancellation always wins promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A cheaply-clonable, one-shot cancellation signal.
#[derive(Clone)]
pub struct Shutdown {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve immediately if already cancelled, otherwise suspend until
    /// [`Shutdown::cancel`] is called.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_after_cancel() {
        let shutdown = Shutdown::new();
        shutdown.cancel();
        shutdown.cancelled().await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn waiters_are_released_when_cancel_is_called() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
