use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use super::stats::Aggregator;
use super::{
    AttemptContext, CancelToken, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, RunError, RunningStats,
    Target,
};
use crate::probe::Probe;

type Sink = Box<dyn Write + Send>;
type SharedAggregator = Arc<Mutex<Aggregator<Sink>>>;

/// How a run that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `stop()` was called.
    Stopped,
    /// The configured number of attempts has been made.
    CounterReached,
}

/// Drives repeated attempts of one probe against one target.
pub struct Pinger {
    probe: Arc<Probe>,
    aggregator: SharedAggregator,
    stop: CancelToken,
    finished: CancelToken,
    parent: Option<CancelToken>,
    interval: Duration,
    counter: u32,
    timeout: Duration,
    task: Option<JoinHandle<Result<RunOutcome, RunError>>>,
}

impl Pinger {
    /// `counter == 0` runs until stopped. A zero `interval` or `timeout`
    /// falls back to the defaults.
    pub fn new<W>(
        out: W,
        target: Target,
        probe: Probe,
        interval: Duration,
        counter: u32,
        timeout: Duration,
    ) -> Self
    where
        W: Write + Send + 'static,
    {
        let interval = if interval.is_zero() { DEFAULT_INTERVAL } else { interval };
        let timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        Self {
            probe: Arc::new(probe),
            aggregator: Arc::new(Mutex::new(Aggregator::new(target, Box::new(out)))),
            stop: CancelToken::new(),
            finished: CancelToken::new(),
            parent: None,
            interval,
            counter,
            timeout,
            task: None,
        }
    }

    /// Ties the run to an outer cancellation. Cancelling `parent` ends the
    /// run with [`RunError::Cancelled`].
    pub fn with_cancel(mut self, parent: CancelToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Starts the run in the background. Calling it twice has no effect.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let run = Run {
            probe: self.probe.clone(),
            aggregator: self.aggregator.clone(),
            stop: self.stop.clone(),
            parent: self.parent.clone(),
            interval: self.interval,
            counter: self.counter,
            timeout: self.timeout,
        };
        let finished = self.finished.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = run.execute().await;
            finished.cancel();
            outcome
        }));
    }

    /// Asks the run to stop. Safe to call any number of times.
    pub fn stop(&self) {
        if self.stop.cancel() {
            log::debug!("pinger stop requested");
        }
    }

    /// Resolves once the run has been asked to stop or has ended.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.stop.cancelled() => {}
            _ = self.finished.cancelled() => {}
        }
    }

    /// Waits for the background run to end and returns how it ended.
    pub async fn wait(&mut self) -> Result<RunOutcome, RunError> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(RunOutcome::Stopped),
        }
    }

    pub fn stats(&self) -> RunningStats {
        lock(&self.aggregator).stats().clone()
    }

    /// Writes the final summary to the output sink.
    pub fn summarize(&self) -> io::Result<()> {
        lock(&self.aggregator).summarize()
    }
}

impl Drop for Pinger {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn lock(aggregator: &SharedAggregator) -> MutexGuard<'_, Aggregator<Sink>> {
    aggregator.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Run {
    probe: Arc<Probe>,
    aggregator: SharedAggregator,
    stop: CancelToken,
    parent: Option<CancelToken>,
    interval: Duration,
    counter: u32,
    timeout: Duration,
}

impl Run {
    async fn execute(self) -> Result<RunOutcome, RunError> {
        let ctx = CancelToken::new();

        let watcher = async {
            let parent = self.parent.clone();
            let interrupted = async move {
                match parent {
                    Some(parent) => parent.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = self.stop.cancelled() => {
                    ctx.cancel();
                    Ok(())
                }
                _ = interrupted => {
                    ctx.cancel();
                    Err(RunError::Cancelled)
                }
                // Cancelled by the attempt loop, which reports its own error.
                _ = ctx.cancelled() => Ok(()),
            }
        };

        let attempts = async {
            let res = self.attempt_loop(&ctx).await;
            if res.is_err() {
                ctx.cancel();
            }
            res
        };

        let (watched, looped) = tokio::join!(watcher, attempts);
        let outcome = watched.and(looped);
        if let Err(err) = &outcome {
            log::warn!("pinger run ended with error: {err}");
            let _ = lock(&self.aggregator).report_error(err);
        }
        outcome
    }

    async fn attempt_loop(&self, ctx: &CancelToken) -> Result<RunOutcome, RunError> {
        let timer = sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut total: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(RunOutcome::Stopped),
                _ = &mut timer => {}
            }

            let attempt = AttemptContext::new(ctx, self.timeout);
            let result = self.probe.attempt(&attempt).await;

            lock(&self.aggregator).consume(result)?;

            total += 1;
            if self.counter > 0 && total >= self.counter {
                self.stop.cancel();
                return Ok(RunOutcome::CounterReached);
            }

            // The next attempt is due one interval after this one was handled.
            timer.as_mut().reset(Instant::now() + self.interval);
        }
    }
}
