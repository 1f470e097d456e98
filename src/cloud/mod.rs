//! Cloud management clients.
//!
//! The engine talks to the cloud exclusively through [`CloudClient`], a
//! resource-manager shaped interface addressed by resource ID and API version.
//!
//! - [`ArmClient`]: HTTP client for the resource manager API
//! - [`LocalCloud`]: file-backed cloud for offline use

mod client;
mod local;
mod operation;
mod types;

pub use client::ArmClient;
pub use local::LocalCloud;
pub use operation::{ArmOperationHandle, PollMode};
pub use types::{ArmErrorDetail, ArmErrorResponse, AsyncOperationStatus, provisioning_state};

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::operation::OperationOutcome;

/// Address of a resource: its fully-qualified ID and the API version to use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    /// Fully-qualified resource ID.
    pub id: String,
    /// API version for this resource type.
    pub api_version: String,
}

impl ResourceAddress {
    /// Creates an address.
    pub fn new(id: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_version: api_version.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// How a PUT treats an existing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with `Conflict` if the resource already exists.
    CreateOnly,
    /// Create or replace.
    Upsert,
}

/// Typed resource-manager operations used by adapters.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Fetches a resource; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a provider error for anything other than not-found.
    async fn get_resource(&self, address: &ResourceAddress) -> Result<Option<Value>>;

    /// Creates or replaces a resource.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when `mode` is `CreateOnly` and the resource exists,
    /// `InvalidArgument` when the body is rejected, or another provider error.
    async fn put_resource(&self, address: &ResourceAddress, body: &Value, mode: PutMode) -> Result<OperationOutcome>;

    /// Partially updates a resource.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidArgument` or another provider error.
    async fn patch_resource(&self, address: &ResourceAddress, body: &Value) -> Result<OperationOutcome>;

    /// Deletes a resource; `None` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a provider error for anything other than not-found.
    async fn delete_resource(&self, address: &ResourceAddress) -> Result<Option<OperationOutcome>>;

    /// Returns the location of a resource group, if it exists.
    ///
    /// # Errors
    ///
    /// Returns a provider error if the lookup fails.
    async fn resource_group_location(&self, subscription: &str, resource_group: &str) -> Result<Option<String>>;
}

#[async_trait]
impl CloudClient for Box<dyn CloudClient> {
    async fn get_resource(&self, address: &ResourceAddress) -> Result<Option<Value>> {
        (**self).get_resource(address).await
    }

    async fn put_resource(&self, address: &ResourceAddress, body: &Value, mode: PutMode) -> Result<OperationOutcome> {
        (**self).put_resource(address, body, mode).await
    }

    async fn patch_resource(&self, address: &ResourceAddress, body: &Value) -> Result<OperationOutcome> {
        (**self).patch_resource(address, body).await
    }

    async fn delete_resource(&self, address: &ResourceAddress) -> Result<Option<OperationOutcome>> {
        (**self).delete_resource(address).await
    }

    async fn resource_group_location(&self, subscription: &str, resource_group: &str) -> Result<Option<String>> {
        (**self).resource_group_location(subscription, resource_group).await
    }
}
