//! Cooperative cancellation and deadline propagation for outbound fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One-shot cancellation signal shared by a group of tasks.
#[derive(Debug, Default)]
pub struct Cancellation {
    canceled: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            canceled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Signals cancellation. Waiters are woken only on the first call.
    pub fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn canceled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

/// Per-request context threaded through the coordinator, day tasks and fetcher.
#[derive(Debug, Clone)]
pub struct FetchContext {
    cancel: Arc<Cancellation>,
    deadline: Option<Instant>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self {
            cancel: Cancellation::shared(),
            deadline: None,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A context with a fresh cancellation signal and the same deadline.
    ///
    /// Canceling the child never cancels the parent; callers forward parent
    /// cancellation explicitly.
    pub fn child(&self) -> Self {
        Self {
            cancel: Cancellation::shared(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub async fn canceled(&self) {
        self.cancel.canceled().await
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new()
    }
}
