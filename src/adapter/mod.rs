//! Resource adapters.
//!
//! An adapter maps one resource kind onto [`CloudClient`] calls. Adapters are
//! stateless: everything they need per call is passed in, so one instance can
//! serve any number of concurrent reconciliations.
//!
//! - [`schema`]: argument schemas
//! - [`arm`]: the generic resource manager adapter
//! - [`catalog`]: built-in kinds

pub mod arm;
pub mod catalog;
pub mod schema;

pub use arm::{AddressScope, ArmAdapter, UpdateMethod};
pub use schema::{FieldDescriptor, FieldType, RESOURCE_GROUP_SEGMENT, ResourceSchema, SUBSCRIPTION_SEGMENT};

pub use crate::normalize::EnumCase;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cloud::CloudClient;
use crate::error::{ProviderError, Result};
use crate::operation::OperationOutcome;
use crate::request::Identity;

/// Contract between the engine and one resource kind.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Returns the argument schema.
    fn schema(&self) -> &ResourceSchema;

    /// Renders the canonical identity reported in verdicts.
    fn display_identity(&self, identity: &Identity) -> String {
        identity.to_string()
    }

    /// Reads the current state; `None` if the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns a provider error when the resource cannot be read.
    async fn read(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<Value>>;

    /// Converts a raw provider document into the observed mapping that
    /// [`ResourceAdapter::read`] would return for it.
    fn observe(&self, resource: &Value) -> Value {
        resource.clone()
    }

    /// Creates the resource from canonical desired state.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if it already exists, `InvalidArgument` if the
    /// provider rejects the payload, or another provider error.
    async fn create(
        &self,
        client: &dyn CloudClient,
        identity: &Identity,
        desired: &Map<String, Value>,
    ) -> Result<OperationOutcome>;

    /// Returns true if [`ResourceAdapter::update`] is supported. Adapters
    /// that implement `update` must override this; otherwise divergence is
    /// resolved by recreating the resource.
    fn supports_update(&self) -> bool {
        false
    }

    /// Updates the resource in place.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload is rejected or the adapter
    /// cannot update, or another provider error.
    async fn update(
        &self,
        _client: &dyn CloudClient,
        _identity: &Identity,
        _desired: &Map<String, Value>,
    ) -> Result<OperationOutcome> {
        Err(ProviderError::InvalidArgument {
            message: format!("kind '{}' cannot be updated in place", self.schema().kind),
            field: None,
        }
        .into())
    }

    /// Deletes the resource; `None` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a provider error when the delete is rejected.
    async fn delete(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<OperationOutcome>>;

    /// Derives the user-facing result from observed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the observed state has an unexpected shape.
    fn project(&self, observed: &Value) -> Result<Value>;
}

/// Kinds known to the engine.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    /// Adapters by kind.
    adapters: BTreeMap<String, Arc<dyn ResourceAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for adapter in catalog::all() {
            let kind = adapter.schema().kind.clone();
            registry.register(kind, Arc::new(adapter));
        }
        registry
    }

    /// Registers `adapter` under `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, adapter: Arc<dyn ResourceAdapter>) -> &mut Self {
        self.adapters.insert(kind.into(), adapter);
        self
    }

    /// Looks up the adapter for `kind`.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn ResourceAdapter>> {
        self.adapters.get(kind).cloned()
    }

    /// Returns registered kinds in sorted order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
