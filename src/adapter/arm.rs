//! Generic resource manager adapter.
//!
//! Resource manager bodies keep a handful of keys at the top level
//! (`location`, `tags`, `sku`, ...) and everything else under `properties`.
//! Reads flatten `properties` into the observed mapping so it lines up with
//! the flat desired mapping; writes split the desired mapping back apart.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cloud::{CloudClient, PutMode, ResourceAddress};
use crate::error::{ReconcileError, Result};
use crate::normalize::resource_id::{format_resource_id, resource_group_id};
use crate::normalize::to_snake_case;
use crate::operation::OperationOutcome;
use crate::request::Identity;

use super::schema::{FieldType, ResourceSchema};
use super::ResourceAdapter;

/// Body keys kept outside `properties` unless configured otherwise.
const DEFAULT_TOP_LEVEL: &[&str] = &["location", "tags", "sku", "kind", "zones", "identity", "etag"];

/// Read-only keys stripped from projections.
const PROJECTION_HIDDEN: &[&str] = &["systemData"];

/// How in-place updates are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    /// Full replacement with PUT.
    Put,
    /// Partial update with PATCH.
    Patch,
    /// The kind cannot be updated in place.
    Unsupported,
}

/// Where resources of a kind live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressScope {
    /// `[subscription, resource_group, names...]` inside a resource group.
    ResourceGroup,
    /// `[subscription, name]`: the resource is a resource group.
    Subscription,
}

/// Adapter for one resource manager resource type.
#[derive(Debug, Clone)]
pub struct ArmAdapter {
    /// Argument schema.
    schema: ResourceSchema,
    /// Full resource type, e.g. `Microsoft.Network/dnsZones`.
    resource_type: String,
    /// API version.
    api_version: String,
    /// Addressing scope.
    scope: AddressScope,
    /// Wire keys kept at the top level of the body.
    top_level: Vec<String>,
    /// Wire keys holding lists of `{"id": ...}` references.
    sub_resource_lists: Vec<String>,
    /// Update strategy.
    update_method: UpdateMethod,
    /// Wire keys included in projections; empty means all.
    projection: Vec<String>,
}

impl ArmAdapter {
    /// Creates an adapter for a resource-group scoped type.
    #[must_use]
    pub fn new(schema: ResourceSchema, resource_type: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            schema,
            resource_type: resource_type.into(),
            api_version: api_version.into(),
            scope: AddressScope::ResourceGroup,
            top_level: DEFAULT_TOP_LEVEL.iter().map(ToString::to_string).collect(),
            sub_resource_lists: Vec::new(),
            update_method: UpdateMethod::Put,
            projection: Vec::new(),
        }
    }

    /// Sets the addressing scope.
    #[must_use]
    pub const fn scoped(mut self, scope: AddressScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the update strategy.
    #[must_use]
    pub const fn with_update_method(mut self, method: UpdateMethod) -> Self {
        self.update_method = method;
        self
    }

    /// Disables in-place updates; divergence then always recreates.
    #[must_use]
    pub const fn without_update(self) -> Self {
        self.with_update_method(UpdateMethod::Unsupported)
    }

    /// Declares wire keys whose lists hold `{"id": ...}` references.
    #[must_use]
    pub fn with_sub_resource_lists(mut self, keys: &[&str]) -> Self {
        self.sub_resource_lists = keys.iter().map(ToString::to_string).collect();
        self
    }

    /// Restricts projections to these wire keys (plus `id`).
    #[must_use]
    pub fn with_projection(mut self, keys: &[&str]) -> Self {
        self.projection = keys.iter().map(ToString::to_string).collect();
        self
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the API version.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Builds the address of `identity`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the identity does not fit the schema.
    pub fn address(&self, identity: &Identity) -> Result<ResourceAddress> {
        self.schema
            .check_identity(identity)
            .map_err(|message| ReconcileError::invalid(message, "identity"))?;

        let segments = identity.segments();
        let id = match (self.scope, segments.first(), segments.get(1)) {
            (AddressScope::Subscription, Some(subscription), Some(group)) if segments.len() == 2 => {
                Some(resource_group_id(subscription, group))
            }
            (AddressScope::ResourceGroup, Some(subscription), Some(group)) => {
                let names: Vec<&str> = segments.get(2..).unwrap_or_default().iter().map(String::as_str).collect();
                format_resource_id(subscription, group, &self.resource_type, &names)
            }
            _ => None,
        };

        id.map(|id| ResourceAddress::new(id, self.api_version.clone()))
            .ok_or_else(|| {
                ReconcileError::invalid(
                    format!("identity {identity} does not match resource type {}", self.resource_type),
                    "identity",
                )
                .into()
            })
    }

    /// Flattens a resource body into the observed mapping.
    #[must_use]
    pub fn flatten(&self, resource: &Value) -> Value {
        let Value::Object(body) = resource else {
            return resource.clone();
        };

        let mut flat: Map<String, Value> = body
            .iter()
            .filter(|(k, _)| k.as_str() != "properties")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(Value::Object(properties)) = body.get("properties") {
            for (key, value) in properties {
                flat.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        for key in &self.sub_resource_lists {
            if let Some(Value::Array(items)) = flat.get_mut(key) {
                for item in items.iter_mut() {
                    if let Some(id) = item.get("id").cloned() {
                        *item = id;
                    }
                }
            }
        }
        Value::Object(flat)
    }

    /// Builds a request body from canonical desired state.
    #[must_use]
    pub fn body(&self, desired: &Map<String, Value>) -> Value {
        let mut body = Map::new();
        let mut properties = Map::new();

        for (key, value) in desired {
            let value = if self.sub_resource_lists.contains(key) {
                wrap_references(value)
            } else {
                value.clone()
            };
            if self.top_level.contains(key) {
                body.insert(key.clone(), value);
            } else {
                properties.insert(key.clone(), value);
            }
        }

        if !properties.is_empty() || self.scope == AddressScope::ResourceGroup {
            body.insert("properties".to_string(), Value::Object(properties));
        }
        Value::Object(body)
    }

    fn is_opaque(&self, wire_key: &str) -> bool {
        self.schema
            .fields
            .iter()
            .any(|f| f.wire() == wire_key && f.field_type == FieldType::Map)
    }
}

fn wrap_references(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(id) => serde_json::json!({ "id": id }),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn snake_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (to_snake_case(k), snake_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(snake_keys).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl ResourceAdapter for ArmAdapter {
    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn display_identity(&self, identity: &Identity) -> String {
        self.address(identity)
            .map_or_else(|_| identity.to_string(), |address| address.id)
    }

    async fn read(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<Value>> {
        let address = self.address(identity)?;
        Ok(client
            .get_resource(&address)
            .await?
            .map(|resource| self.observe(&resource)))
    }

    fn observe(&self, resource: &Value) -> Value {
        self.flatten(resource)
    }

    async fn create(
        &self,
        client: &dyn CloudClient,
        identity: &Identity,
        desired: &Map<String, Value>,
    ) -> Result<OperationOutcome> {
        let address = self.address(identity)?;
        debug!("Creating {} {address}", self.schema.kind);
        client
            .put_resource(&address, &self.body(desired), PutMode::CreateOnly)
            .await
    }

    fn supports_update(&self) -> bool {
        self.update_method != UpdateMethod::Unsupported
    }

    async fn update(
        &self,
        client: &dyn CloudClient,
        identity: &Identity,
        desired: &Map<String, Value>,
    ) -> Result<OperationOutcome> {
        let address = self.address(identity)?;
        debug!("Updating {} {address} via {:?}", self.schema.kind, self.update_method);
        let body = self.body(desired);
        match self.update_method {
            UpdateMethod::Put => client.put_resource(&address, &body, PutMode::Upsert).await,
            UpdateMethod::Patch => client.patch_resource(&address, &body).await,
            UpdateMethod::Unsupported => Err(ReconcileError::InvalidRequest {
                message: format!("kind '{}' cannot be updated in place", self.schema.kind),
                field: None,
            }
            .into()),
        }
    }

    async fn delete(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<OperationOutcome>> {
        let address = self.address(identity)?;
        debug!("Deleting {} {address}", self.schema.kind);
        client.delete_resource(&address).await
    }

    fn project(&self, observed: &Value) -> Result<Value> {
        let Value::Object(flat) = self.flatten(observed) else {
            return Err(ReconcileError::ProjectionFailed {
                message: format!("expected a mapping for {}, got {observed}", self.schema.kind),
            }
            .into());
        };

        let mut projection = Map::new();
        for (key, value) in &flat {
            if PROJECTION_HIDDEN.contains(&key.as_str()) {
                continue;
            }
            if !self.projection.is_empty() && key != "id" && !self.projection.contains(key) {
                continue;
            }
            let value = if self.is_opaque(key) {
                value.clone()
            } else {
                snake_keys(value)
            };
            projection.insert(to_snake_case(key), value);
        }
        Ok(Value::Object(projection))
    }
}
