//! Resource manager HTTP client.
//!
//! Every call carries its own `x-ms-client-request-id`. Throttled calls (429)
//! are retried here with a linear back-off; every other failure is mapped to
//! a [`ProviderError`] and returned to the engine untouched.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{ConvergeError, ProviderError, Result};
use crate::normalize::resource_id::resource_group_id;
use crate::operation::OperationOutcome;

use super::operation::{ArmOperationHandle, PollMode};
use super::types::{ArmErrorResponse, provisioning_state};
use super::{CloudClient, PutMode, ResourceAddress};

/// Public resource manager endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// API version used for resource group lookups.
const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for throttled calls.
const MAX_RETRIES: u32 = 3;

/// Base delay between throttled attempts in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Header carrying the async operation status URL.
const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Header carrying the per-call request id.
const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Resource manager HTTP client.
#[derive(Debug, Clone)]
pub struct ArmClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    endpoint: String,
    /// Bearer token.
    token: String,
    /// Base delay between throttled attempts.
    retry_delay: Duration,
}

/// A successful HTTP exchange.
#[derive(Debug)]
pub(crate) struct ArmResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// `Azure-AsyncOperation` header.
    pub async_operation: Option<String>,
    /// `Location` header.
    pub location: Option<String>,
    /// Parsed JSON body, if any.
    pub body: Option<Value>,
}

impl ArmClient {
    /// Creates a client for the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, token)
    }

    /// Creates a client for a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_endpoint(endpoint: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Sets the base delay between throttled attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, address: &ResourceAddress) -> String {
        format!("{}{}?api-version={}", self.endpoint, address.id, address.api_version)
    }

    /// Sends a request, retrying throttled attempts.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        create_only: bool,
    ) -> Result<ArmResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.send_once(method.clone(), url, body, create_only).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    warn!("Throttled on {method} {url}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::unavailable("Max retries exceeded").into()))
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        create_only: bool,
    ) -> Result<ArmResponse> {
        let request_id = Uuid::new_v4();
        trace!("{method} {url} ({REQUEST_ID_HEADER}: {request_id})");

        let mut request = self
            .client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(REQUEST_ID_HEADER, request_id.to_string());
        if create_only {
            request = request.header(header::IF_NONE_MATCH, "*");
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(format!("Request failed: {e}")))?;

        let status = response.status();
        let header_value = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };
        let async_operation = header_value(ASYNC_OPERATION_HEADER);
        let location = header_value(header::LOCATION.as_str());
        let retry_after = header_value(header::RETRY_AFTER.as_str());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::unavailable(format!("Failed to read response: {e}")))?;
        let body: Option<Value> = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        if status.is_success() {
            return Ok(ArmResponse {
                status,
                async_operation,
                location,
                body,
            });
        }

        Err(Self::classify(status, url, body.as_ref(), retry_after.as_deref()))
    }

    fn classify(status: StatusCode, url: &str, body: Option<&Value>, retry_after: Option<&str>) -> ConvergeError {
        let detail = body
            .cloned()
            .and_then(|b| serde_json::from_value::<ArmErrorResponse>(b).ok())
            .map(|r| r.error);
        let message = detail
            .as_ref()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), super::ArmErrorDetail::summary);
        let resource = url.split('?').next().unwrap_or(url).to_string();

        let error = match status.as_u16() {
            404 => ProviderError::NotFound { resource },
            409 | 412 => ProviderError::Conflict { resource, message },
            400 | 422 => ProviderError::InvalidArgument {
                message,
                field: detail.and_then(|d| d.target),
            },
            401 | 403 => ProviderError::AuthenticationFailed { message },
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after.and_then(|s| s.parse().ok()).unwrap_or(1),
            },
            _ => ProviderError::Unavailable { message },
        };
        error.into()
    }

    /// Fetches an absolute URL (operation status or resource).
    pub(crate) async fn get_url(&self, url: &str) -> Result<ArmResponse> {
        self.send(Method::GET, url, None, false).await
    }

    fn mutation_outcome(&self, response: ArmResponse, address: &ResourceAddress, reread: bool) -> OperationOutcome {
        let resource_url = reread.then(|| self.url(address));

        if let Some(status_url) = response.async_operation {
            return self.pending(PollMode::AsyncOperation {
                status_url,
                resource_url,
            });
        }
        if response.status == StatusCode::ACCEPTED {
            if let Some(url) = response.location {
                return self.pending(PollMode::Location { url });
            }
            if let Some(url) = resource_url {
                return self.pending(PollMode::ProvisioningState { resource_url: url });
            }
            return OperationOutcome::Done(None);
        }
        if let (Some(url), Some(body)) = (&resource_url, &response.body) {
            if provisioning_state::of(body).is_some_and(|s| !provisioning_state::is_terminal(s)) {
                return self.pending(PollMode::ProvisioningState {
                    resource_url: url.clone(),
                });
            }
        }
        OperationOutcome::Done(response.body)
    }

    fn pending(&self, mode: PollMode) -> OperationOutcome {
        OperationOutcome::Pending(Box::new(ArmOperationHandle::new(self.clone(), mode)))
    }
}

#[async_trait]
impl CloudClient for ArmClient {
    async fn get_resource(&self, address: &ResourceAddress) -> Result<Option<Value>> {
        debug!("Reading {address}");
        match self.send(Method::GET, &self.url(address), None, false).await {
            Ok(response) => Ok(response.body),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_resource(&self, address: &ResourceAddress, body: &Value, mode: PutMode) -> Result<OperationOutcome> {
        debug!("Putting {address} ({mode:?})");
        let response = self
            .send(Method::PUT, &self.url(address), Some(body), mode == PutMode::CreateOnly)
            .await?;
        Ok(self.mutation_outcome(response, address, true))
    }

    async fn patch_resource(&self, address: &ResourceAddress, body: &Value) -> Result<OperationOutcome> {
        debug!("Patching {address}");
        let response = self.send(Method::PATCH, &self.url(address), Some(body), false).await?;
        Ok(self.mutation_outcome(response, address, true))
    }

    async fn delete_resource(&self, address: &ResourceAddress) -> Result<Option<OperationOutcome>> {
        debug!("Deleting {address}");
        match self.send(Method::DELETE, &self.url(address), None, false).await {
            Ok(response) if response.status == StatusCode::NO_CONTENT => Ok(None),
            Ok(response) => Ok(Some(self.mutation_outcome(response, address, false))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn resource_group_location(&self, subscription: &str, resource_group: &str) -> Result<Option<String>> {
        let address = ResourceAddress::new(
            resource_group_id(subscription, resource_group),
            RESOURCE_GROUP_API_VERSION,
        );
        Ok(self
            .get_resource(&address)
            .await?
            .and_then(|rg| rg.get("location").and_then(Value::as_str).map(ToString::to_string)))
    }
}
