//! Polling for long-running remote operations.
//!
//! A submitted job is re-fetched on a fixed interval until the service marks
//! it done. By default this waits forever, matching the service's own
//! behavior; callers can cap the number of status checks and cancel the wait.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Interval between status checks when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// A remote job handle that reports whether it has finished.
pub trait LongRunning {
    fn name(&self) -> &str;
    fn is_done(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until the job completes, however long that takes.
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Trigger side of a cancellation pair.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation pair; clone freely.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// [`Canceller`] is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_pair() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelSignal { rx })
}

/// Wait for `operation` to finish, re-fetching it once per interval.
///
/// Each `fetch` receives the current handle and returns its replacement.
/// No fetch is issued for an operation that is already done.
pub async fn poll_until_done<Op, F, Fut>(
    mut operation: Op,
    config: &PollConfig,
    cancel: Option<&CancelSignal>,
    mut fetch: F,
) -> Result<Op>
where
    Op: LongRunning,
    F: FnMut(Op) -> Fut,
    Fut: Future<Output = Result<Op>>,
{
    let mut attempts: u32 = 0;

    while !operation.is_done() {
        if let Some(max) = config.max_attempts {
            if attempts >= max {
                return Err(Error::PollLimitExceeded { attempts });
            }
        }

        match cancel {
            Some(signal) => {
                if signal.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                tokio::select! {
                    _ = tokio::time::sleep(config.interval) => {}
                    _ = signal.cancelled() => {
                        info!(operation = %operation.name(), "polling cancelled");
                        return Err(Error::Cancelled);
                    }
                }
            }
            None => tokio::time::sleep(config.interval).await,
        }

        attempts += 1;
        debug!(
            operation = %operation.name(),
            attempt = attempts,
            "checking long-running operation"
        );
        operation = fetch(operation).await?;
    }

    Ok(operation)
}
