//! Long-running operation handles for the resource manager.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::trace;

use crate::error::{ProviderError, Result};
use crate::operation::{OperationFailure, OperationHandle, OperationStatus};

use super::client::ArmClient;
use super::types::{ArmErrorDetail, AsyncOperationStatus, provisioning_state};

/// How an operation reports progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollMode {
    /// Poll an `Azure-AsyncOperation` status resource, then optionally fetch
    /// the resource for the final result.
    AsyncOperation {
        /// Status URL.
        status_url: String,
        /// Resource URL fetched after success.
        resource_url: Option<String>,
    },
    /// Poll a `Location` URL until it stops answering 202.
    Location {
        /// Location URL.
        url: String,
    },
    /// Poll the resource until its provisioning state is terminal.
    ProvisioningState {
        /// Resource URL.
        resource_url: String,
    },
}

/// Handle for an in-flight resource manager operation.
#[derive(Debug, Clone)]
pub struct ArmOperationHandle {
    /// Client used for polling.
    client: ArmClient,
    /// Polling strategy.
    mode: PollMode,
}

impl ArmOperationHandle {
    /// Creates a handle.
    #[must_use]
    pub const fn new(client: ArmClient, mode: PollMode) -> Self {
        Self { client, mode }
    }

    /// Returns the polling strategy.
    #[must_use]
    pub const fn mode(&self) -> &PollMode {
        &self.mode
    }

    fn failure(error: Option<ArmErrorDetail>, fallback: &str) -> OperationFailure {
        error.map_or_else(
            || OperationFailure::message(fallback),
            |e| OperationFailure {
                code: e.code,
                message: e.message,
                details: e.details,
            },
        )
    }

    async fn poll_async_operation(&self, status_url: &str, resource_url: Option<&str>) -> Result<OperationStatus> {
        let response = self.client.get_url(status_url).await?;
        let body = response.body.ok_or_else(|| ProviderError::InvalidResponse {
            message: format!("empty operation status from {status_url}"),
        })?;
        let status: AsyncOperationStatus = serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse {
            message: format!("unreadable operation status: {e}"),
        })?;
        trace!("Operation {status_url}: {}", status.status);

        match status.status.as_str() {
            s if s.eq_ignore_ascii_case(provisioning_state::SUCCEEDED) => {
                let result = match resource_url {
                    Some(url) => self.client.get_url(url).await?.body,
                    None => None,
                };
                Ok(OperationStatus::Succeeded(result))
            }
            s if s.eq_ignore_ascii_case(provisioning_state::FAILED) => Ok(OperationStatus::Failed(
                Self::failure(status.error, "operation failed"),
            )),
            s if s.eq_ignore_ascii_case(provisioning_state::CANCELED) => Ok(OperationStatus::Canceled(
                Self::failure(status.error, "operation canceled"),
            )),
            _ => Ok(OperationStatus::Pending),
        }
    }

    async fn poll_location(&self, url: &str) -> Result<OperationStatus> {
        let response = self.client.get_url(url).await?;
        if response.status == StatusCode::ACCEPTED {
            return Ok(OperationStatus::Pending);
        }
        Ok(OperationStatus::Succeeded(response.body))
    }

    async fn poll_provisioning_state(&self, resource_url: &str) -> Result<OperationStatus> {
        let body = self.client.get_url(resource_url).await?.body.unwrap_or(Value::Null);
        let state = provisioning_state::of(&body).unwrap_or(provisioning_state::SUCCEEDED);
        trace!("Resource {resource_url} provisioning state: {state}");

        let status = if state.eq_ignore_ascii_case(provisioning_state::SUCCEEDED) {
            OperationStatus::Succeeded(Some(body))
        } else if state.eq_ignore_ascii_case(provisioning_state::FAILED) {
            OperationStatus::Failed(OperationFailure::message(format!("provisioning state {state}")))
        } else if state.eq_ignore_ascii_case(provisioning_state::CANCELED) {
            OperationStatus::Canceled(OperationFailure::message(format!("provisioning state {state}")))
        } else {
            OperationStatus::Pending
        };
        Ok(status)
    }
}

#[async_trait]
impl OperationHandle for ArmOperationHandle {
    fn id(&self) -> String {
        match &self.mode {
            PollMode::AsyncOperation { status_url, .. } => status_url.clone(),
            PollMode::Location { url } => url.clone(),
            PollMode::ProvisioningState { resource_url } => resource_url.clone(),
        }
    }

    async fn poll(&self) -> Result<OperationStatus> {
        match &self.mode {
            PollMode::AsyncOperation {
                status_url,
                resource_url,
            } => self.poll_async_operation(status_url, resource_url.as_deref()).await,
            PollMode::Location { url } => self.poll_location(url).await,
            PollMode::ProvisioningState { resource_url } => self.poll_provisioning_state(resource_url).await,
        }
    }
}
