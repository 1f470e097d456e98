//! Long-running operation handling.
//!
//! Mutating provider calls either finish immediately or hand back an
//! [`OperationHandle`]. The [`OperationDriver`] polls handles until they reach a
//! terminal state. It has no retry policy of its own: a failed operation is
//! surfaced as-is, and the only bound on polling is the caller's time budget.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ConvergeError, ProviderError, Result};
use crate::suspend::{Phase, Suspender};

/// Failure reported by a terminal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    /// Provider error code.
    pub code: Option<String>,
    /// Provider message.
    pub message: String,
    /// Structured details.
    pub details: Option<Value>,
}

impl OperationFailure {
    /// Creates a failure with a message only.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
        }
    }
}

/// Status returned by a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still running.
    Pending,
    /// Finished; may carry the resulting resource.
    Succeeded(Option<Value>),
    /// Finished unsuccessfully.
    Failed(OperationFailure),
    /// Canceled on the provider side.
    Canceled(OperationFailure),
}

/// Opaque token for an in-flight provider operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperationHandle: Send + Sync {
    /// Identifier used in logs and error reports.
    fn id(&self) -> String;

    /// Queries the operation's current status.
    ///
    /// # Errors
    ///
    /// Returns a provider error if the status cannot be fetched.
    async fn poll(&self) -> Result<OperationStatus>;
}

/// Result of a mutating provider call.
pub enum OperationOutcome {
    /// The call completed synchronously.
    Done(Option<Value>),
    /// The call started a long-running operation.
    Pending(Box<dyn OperationHandle>),
}

impl fmt::Debug for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(value) => f.debug_tuple("Done").field(value).finish(),
            Self::Pending(handle) => f.debug_tuple("Pending").field(&handle.id()).finish(),
        }
    }
}

/// Polls operation handles to completion.
#[derive(Debug, Clone, Copy)]
pub struct OperationDriver {
    /// Delay between polls.
    poll_interval: Duration,
    /// Budget for a single poll.
    poll_timeout: Duration,
}

impl OperationDriver {
    /// Creates a driver.
    #[must_use]
    pub const fn new(poll_interval: Duration, poll_timeout: Duration) -> Self {
        Self {
            poll_interval,
            poll_timeout,
        }
    }

    /// Drives `outcome` to a terminal state and returns the final result.
    ///
    /// Returns only after the poll that observed the terminal state.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` for failed or canceled operations, the
    /// provider error of a failing poll, or a cancellation/timeout error.
    pub async fn drive(&self, outcome: OperationOutcome, suspender: &Suspender<'_>) -> Result<Option<Value>> {
        let handle = match outcome {
            OperationOutcome::Done(result) => return Ok(result),
            OperationOutcome::Pending(handle) => handle,
        };

        let id = handle.id();
        debug!("Polling operation {id}");
        let mut polls: u32 = 0;

        loop {
            let status = suspender
                .run(Phase::Poll, self.poll_timeout, handle.poll())
                .await?;
            polls = polls.saturating_add(1);

            match status {
                OperationStatus::Pending => {
                    trace!("Operation {id} still pending after {polls} poll(s)");
                    suspender.sleep(Phase::Poll, self.poll_interval).await?;
                }
                OperationStatus::Succeeded(result) => {
                    debug!("Operation {id} succeeded after {polls} poll(s)");
                    return Ok(result);
                }
                OperationStatus::Failed(failure) => return Err(Self::failed(&id, "Failed", failure)),
                OperationStatus::Canceled(failure) => {
                    return Err(Self::failed(&id, "Canceled", failure));
                }
            }
        }
    }

    fn failed(id: &str, status: &str, failure: OperationFailure) -> ConvergeError {
        let details = match (failure.code, failure.details) {
            (Some(code), Some(details)) => Some(serde_json::json!({"code": code, "details": details})),
            (Some(code), None) => Some(serde_json::json!({"code": code})),
            (None, details) => details,
        };
        ProviderError::OperationFailed {
            operation: id.to_string(),
            status: status.to_string(),
            message: failure.message,
            details,
        }
        .into()
    }
}
