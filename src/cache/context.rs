//! Operation Context Module
//!
//! Carries an optional deadline and cancellation signal into every cache call.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{CacheError, Result};

// == Context ==
/// Per-call cancellation and deadline scope.
///
/// Cloning is cheap; clones observe the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every `Context` derived from the same `with_cancel` call.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| !std::mem::replace(cancelled, true));
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    /// Returns a copy with the given deadline, keeping the earlier one if already set.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns a cancellable copy and the handle that cancels it.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the context error if it is already cancelled or past its deadline.
    pub fn err(&self) -> Option<CacheError> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(CacheError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CacheError::DeadlineExceeded),
            _ => None,
        }
    }

    // == Run ==
    /// Drives `fut` to completion unless the context ends first.
    ///
    /// When cancellation or the deadline wins, `fut` is dropped and the
    /// matching context error is returned.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            res = fut => res,
            _ = self.cancelled() => Err(CacheError::Cancelled),
            _ = self.expired() => Err(CacheError::DeadlineExceeded),
        }
    }

    async fn cancelled(&self) {
        let signalled = match &self.cancel {
            Some(rx) => rx.clone().wait_for(|cancelled| *cancelled).await.is_ok(),
            None => false,
        };
        if signalled {
            return;
        }
        // Handle dropped without cancelling, or no signal at all
        std::future::pending::<()>().await
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
