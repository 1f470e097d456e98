//! Resource manager wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error envelope returned by the resource manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmErrorResponse {
    /// Error body.
    pub error: ArmErrorDetail,
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmErrorDetail {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Nested errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Offending property path, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ArmErrorDetail {
    /// Formats the error as `code: message`.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.code {
            Some(code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// Body of an `Azure-AsyncOperation` status resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncOperationStatus {
    /// `InProgress`, `Succeeded`, `Failed` or `Canceled`.
    pub status: String,
    /// Failure details for failed operations.
    #[serde(default)]
    pub error: Option<ArmErrorDetail>,
}

/// Reading of `properties.provisioningState`.
pub mod provisioning_state {
    use serde_json::Value;

    /// Terminal success state.
    pub const SUCCEEDED: &str = "Succeeded";
    /// Terminal failure state.
    pub const FAILED: &str = "Failed";
    /// Terminal canceled state.
    pub const CANCELED: &str = "Canceled";

    /// Returns the provisioning state of a resource body, if any.
    #[must_use]
    pub fn of(resource: &Value) -> Option<&str> {
        resource
            .get("properties")
            .and_then(|p| p.get("provisioningState"))
            .and_then(Value::as_str)
    }

    /// Returns true for states the resource will not leave on its own.
    #[must_use]
    pub fn is_terminal(state: &str) -> bool {
        [SUCCEEDED, FAILED, CANCELED]
            .iter()
            .any(|t| t.eq_ignore_ascii_case(state))
    }
}
