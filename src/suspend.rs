//! Cancellation and time budgets for suspension points.
//!
//! Every provider call, every operation poll and every sleep between polls
//! goes through a [`Suspender`], which races the work against the caller's
//! [`CancelSignal`] and the phase's time budget.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Phase of a reconciliation, used to label timeouts and cancellations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial read.
    Read,
    /// Create call and its polling.
    Create,
    /// Update call and its polling.
    Update,
    /// Delete call and its polling.
    Delete,
    /// A single operation poll.
    Poll,
    /// Waiting for a deleted resource to disappear.
    DeleteLag,
    /// Read after a mutation.
    Reread,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Poll => "poll",
            Self::DeleteLag => "delete lag",
            Self::Reread => "reread",
        };
        f.write_str(name)
    }
}

/// Sender side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    /// Channel sender.
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation of every run holding the paired signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver side of a cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    /// Channel receiver; `None` never fires.
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// Creates a connected handle and signal.
    #[must_use]
    pub fn pair() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Self { rx: Some(rx) })
    }

    /// Creates a signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self { rx: None }
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested.
    ///
    /// Never resolves if the handle is dropped without canceling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Runs suspension points under a cancel signal and time budgets.
#[derive(Debug, Clone, Copy)]
pub struct Suspender<'a> {
    /// Caller's cancellation signal.
    cancel: &'a CancelSignal,
}

impl<'a> Suspender<'a> {
    /// Creates a suspender bound to `cancel`.
    #[must_use]
    pub const fn new(cancel: &'a CancelSignal) -> Self {
        Self { cancel }
    }

    /// Awaits `work`, failing with `Canceled` or `Timeout` if either fires first.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, or a cancellation/timeout error.
    pub async fn run<T, F>(&self, phase: Phase, budget: Duration, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Canceled {
                phase: phase.to_string(),
            }
            .into());
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Canceled during {phase}");
                Err(ReconcileError::Canceled { phase: phase.to_string() }.into())
            }
            outcome = tokio::time::timeout(budget, work) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    debug!("Timed out during {phase} after {budget:?}");
                    Err(ReconcileError::Timeout {
                        phase: phase.to_string(),
                        after_ms: budget.as_millis(),
                    }
                    .into())
                }
            },
        }
    }

    /// Sleeps for `interval` unless canceled first.
    ///
    /// # Errors
    ///
    /// Returns a cancellation error if the signal fires.
    pub async fn sleep(&self, phase: Phase, interval: Duration) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(ReconcileError::Canceled { phase: phase.to_string() }.into())
            }
            () = tokio::time::sleep(interval) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConvergeError, ErrorKind};

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let signal = CancelSignal::never();
        let suspender = Suspender::new(&signal);
        let value = tokio_test::assert_ok!(
            suspender
                .run(Phase::Read, Duration::from_secs(1), async { Ok(7) })
                .await
        );
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let signal = CancelSignal::never();
        let suspender = Suspender::new(&signal);
        let err = suspender
            .run(Phase::Poll, Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_pre_cancelled_never_runs_work() {
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();
        let suspender = Suspender::new(&signal);

        let err = suspender
            .run(Phase::Create, Duration::from_secs(1), async {
                Err::<(), _>(ConvergeError::internal("work must not run"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let (handle, signal) = CancelSignal::pair();
        let suspender = Suspender::new(&signal);

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(suspender.sleep(Phase::Poll, Duration::from_secs(30)), cancel);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Canceled);
    }

    #[test]
    fn test_cancelled_resolves_once_fired() {
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();
        tokio_test::block_on(signal.cancelled());
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_never_signal() {
        assert!(!CancelSignal::never().is_cancelled());
        assert!(!CancelSignal::default().is_cancelled());
    }
}
