//! Verdicts returned by a reconciliation.
//!
//! A verdict has the same shape whatever happened: the selected action,
//! whether a mutation was issued, the projection of the final state, the
//! divergence witness for updates and recreates, and at most one error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConvergeError, ErrorKind};
use crate::planner::{Action, Divergence};

/// Divergence witness as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceReport {
    /// Slash-separated path of the first divergence.
    pub path: String,
    /// Observed value at `path`.
    pub old: Value,
    /// Desired value at `path`.
    pub new: Value,
}

impl From<&Divergence> for DivergenceReport {
    fn from(divergence: &Divergence) -> Self {
        Self {
            path: divergence.path.clone(),
            old: divergence.observed.clone(),
            new: divergence.desired.clone(),
        }
    }
}

/// Error as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Structured provider details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&ConvergeError> for ErrorReport {
    fn from(error: &ConvergeError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            details: error.details(),
        }
    }
}

/// Result of reconciling one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// True if a mutation was issued, or would have been in dry-run.
    pub changed: bool,
    /// Selected transition.
    pub action: Action,
    /// Canonical identity.
    pub identity: String,
    /// Adapter projection of the final state.
    pub projection: Option<Value>,
    /// First divergence, for updates and recreates only.
    pub divergence: Option<DivergenceReport>,
    /// Failure, if any.
    pub error: Option<ErrorReport>,
}

impl Verdict {
    /// Creates a verdict with no projection, divergence or error.
    #[must_use]
    pub fn new(identity: impl Into<String>, action: Action, changed: bool) -> Self {
        Self {
            changed,
            action,
            identity: identity.into(),
            projection: None,
            divergence: None,
            error: None,
        }
    }

    /// Attaches the projection.
    #[must_use]
    pub fn with_projection(mut self, projection: Option<Value>) -> Self {
        self.projection = projection;
        self
    }

    /// Attaches the divergence witness when the action carries one.
    #[must_use]
    pub fn with_divergence(mut self, divergence: Option<&Divergence>) -> Self {
        self.divergence = match self.action {
            Action::Update | Action::Recreate => divergence.map(DivergenceReport::from),
            _ => None,
        };
        self
    }

    /// Attaches an error. Failed verdicts never carry a projection.
    #[must_use]
    pub fn with_error(mut self, error: &ConvergeError) -> Self {
        self.error = Some(ErrorReport::from(error));
        self.projection = None;
        self
    }

    /// Returns true if the run finished without error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if the run was canceled or timed out.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.kind.is_cancellation())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.identity)?;
        if self.changed {
            write!(f, " (changed)")?;
        }
        if let Some(divergence) = &self.divergence {
            write!(f, " at {}: {} -> {}", divergence.path, divergence.old, divergence.new)?;
        }
        if let Some(error) = &self.error {
            write!(f, " failed: {}: {}", error.kind, error.message)?;
        }
        Ok(())
    }
}
