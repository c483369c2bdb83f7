use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use super::error::ProbeError;

/// A cloneable, idempotent cancellation signal backed by a `watch` channel.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Cancels the token. Returns `true` only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token has been cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Execution context of a single attempt: a deadline plus the run-level
/// cancellation it is bounded by.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    deadline: Instant,
    run: CancelToken,
}

impl AttemptContext {
    pub fn new(run: &CancelToken, timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            run: run.clone(),
        }
    }

    /// Context that is never cancelled from outside, for one-off probes.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(&CancelToken::new(), timeout)
    }

    /// Derives a context whose deadline is the earlier of both.
    pub fn bounded(&self, timeout: Duration) -> Self {
        Self {
            deadline: self.deadline.min(Instant::now() + timeout),
            run: self.run.clone(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.run.is_cancelled()
    }

    /// Runs `fut` until it completes, the deadline passes or the context is
    /// cancelled, whichever comes first. `phase` names the step in timeout
    /// errors.
    pub async fn run<T, F>(&self, phase: &'static str, fut: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        if self.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.run.cancelled() => Err(ProbeError::Cancelled),
            _ = sleep_until(self.deadline) => Err(ProbeError::Timeout(phase)),
            res = fut => res,
        }
    }
}
