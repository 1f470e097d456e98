//! Error types for the reconciliation engine.
//!
//! Errors are grouped by concern (request files, provider calls, the
//! reconciliation state machine) and every error can be classified into an
//! [`ErrorKind`], the stable taxonomy reported inside a verdict.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Request file and configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors returned by the cloud provider.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Errors raised by the reconciliation state machine.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request file and configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The request file was not found.
    #[error("Request file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The request file could not be parsed.
    #[error("Failed to parse request: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Request validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Errors returned by the cloud provider or its client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The addressed resource does not exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Resource that was addressed.
        resource: String,
    },

    /// The resource already exists or is being modified concurrently.
    #[error("Conflict on {resource}: {message}")]
    Conflict {
        /// Resource that was addressed.
        resource: String,
        /// Provider message.
        message: String,
    },

    /// The provider rejected the request payload.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Provider or validation message.
        message: String,
        /// Offending field, when known.
        field: Option<String>,
    },

    /// Authentication or authorization failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The provider throttled the request.
    #[error("Provider rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The provider could not be reached or answered with a server error.
    #[error("Provider unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A long-running operation reached a failed or canceled terminal state.
    #[error("Operation {operation} ended as {status}: {message}")]
    OperationFailed {
        /// Operation identifier.
        operation: String,
        /// Terminal status reported by the provider.
        status: String,
        /// Provider message.
        message: String,
        /// Structured error details from the provider.
        details: Option<Value>,
    },

    /// The provider returned a response that could not be interpreted.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised by the reconciliation state machine itself.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A suspension point exceeded its time budget.
    #[error("Timed out during {phase} after {after_ms} ms")]
    Timeout {
        /// Phase that was suspended.
        phase: String,
        /// Budget that was exceeded, in milliseconds.
        after_ms: u128,
    },

    /// The run was canceled by its caller.
    #[error("Canceled during {phase}")]
    Canceled {
        /// Phase that was suspended.
        phase: String,
    },

    /// No adapter is registered for the requested kind.
    #[error("Unknown resource kind: {kind}")]
    UnknownKind {
        /// Requested kind.
        kind: String,
    },

    /// The request is malformed for the selected adapter.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
        /// Offending field, when known.
        field: Option<String>,
    },

    /// The adapter could not project the observed state.
    #[error("Projection failed: {message}")]
    ProjectionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The provider reported success but the resource could not be observed.
    #[error("Resource {resource} missing after {action}")]
    VanishedAfterMutation {
        /// Resource identity.
        resource: String,
        /// Action that was performed.
        action: String,
    },
}

/// Stable error classification reported in verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The resource does not exist.
    NotFound,
    /// The resource exists or is being modified concurrently.
    Conflict,
    /// The desired state was rejected.
    InvalidArgument,
    /// The provider could not be reached.
    ProviderUnavailable,
    /// A long-running operation failed.
    ProviderOperationFailed,
    /// A suspension point exceeded its budget.
    Timeout,
    /// The caller canceled the run.
    Canceled,
    /// Engine or adapter defect.
    InternalError,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::InvalidArgument => "InvalidArgument",
            Self::ProviderUnavailable => "ProviderUnavailable",
            Self::ProviderOperationFailed => "ProviderOperationFailed",
            Self::Timeout => "Timeout",
            Self::Canceled => "Canceled",
            Self::InternalError => "InternalError",
        }
    }

    /// Returns true for the kinds reported as a canceled run.
    #[must_use]
    pub const fn is_cancellation(self) -> bool {
        matches!(self, Self::Timeout | Self::Canceled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classifies this error into the verdict taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::InvalidArgument,
            Self::Provider(err) => match err {
                ProviderError::NotFound { .. } => ErrorKind::NotFound,
                ProviderError::Conflict { .. } => ErrorKind::Conflict,
                ProviderError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
                ProviderError::AuthenticationFailed { .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. } => ErrorKind::ProviderUnavailable,
                ProviderError::OperationFailed { .. } => ErrorKind::ProviderOperationFailed,
                ProviderError::InvalidResponse { .. } => ErrorKind::InternalError,
            },
            Self::Reconcile(err) => match err {
                ReconcileError::Timeout { .. } => ErrorKind::Timeout,
                ReconcileError::Canceled { .. } => ErrorKind::Canceled,
                ReconcileError::UnknownKind { .. } | ReconcileError::InvalidRequest { .. } => {
                    ErrorKind::InvalidArgument
                }
                ReconcileError::ProjectionFailed { .. }
                | ReconcileError::VanishedAfterMutation { .. } => ErrorKind::InternalError,
            },
            Self::Io(_) => ErrorKind::ProviderUnavailable,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Returns structured details attached to this error, if any.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Provider(ProviderError::OperationFailed { details, .. }) => details.clone(),
            Self::Provider(ProviderError::InvalidArgument {
                field: Some(field), ..
            })
            | Self::Reconcile(ReconcileError::InvalidRequest {
                field: Some(field), ..
            })
            | Self::Config(ConfigError::ValidationError {
                field: Some(field), ..
            }) => Some(serde_json::json!({ "field": field })),
            _ => None,
        }
    }

    /// Returns true if this error is a not-found signal from the provider.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::NotFound { .. }))
    }

    /// Returns true if this error is a conflict signal from the provider.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::Conflict { .. }))
    }

    /// Returns true if the HTTP client may retry the call that produced this error.
    ///
    /// The reconciler never retries; this only drives throttling back-off.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::RateLimited { .. }))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ProviderError {
    /// Creates an invalid-argument error for a specific field.
    #[must_use]
    pub fn invalid_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}

impl ReconcileError {
    /// Creates an invalid-request error for a specific field.
    #[must_use]
    pub fn invalid(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}
