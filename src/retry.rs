use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::debug;

/// Polling policy for blocking waits: fixed interval between attempts, an
/// optional overall deadline, and an optional external cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RetryPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            cancel: None,
        }
    }

    /// Poll `f` until it yields a value.
    ///
    /// `Ok(Some(v))` completes the wait, `Ok(None)` means not ready yet and
    /// is retried after `interval`, `Err` aborts immediately. Without a
    /// deadline or cancellation flag the wait is unbounded.
    pub fn wait_for<T, F>(&self, label: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        let started = Instant::now();

        loop {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::SeqCst) {
                    bail!("{} interrupted", label);
                }
            }
            if let Some(limit) = self.deadline {
                if started.elapsed() >= limit {
                    bail!("{} timed out after {}s", label, limit.as_secs());
                }
            }

            if let Some(value) = f()? {
                return Ok(value);
            }

            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "{} not ready, polling again", label,
            );
            thread::sleep(self.interval);
        }
    }
}
