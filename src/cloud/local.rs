//! File-backed cloud for offline use.
//!
//! Resources live in one JSON document keyed by case-folded resource ID and
//! are written atomically (temp file, then rename). Every mutation completes
//! synchronously, so no operation handle is ever returned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ConvergeError, ProviderError, Result};
use crate::normalize::resource_id::{ResourceId, resource_group_id, resource_id_key};
use crate::operation::OperationOutcome;

use super::{CloudClient, PutMode, ResourceAddress};

/// Directory name under the user data directory.
const DATA_DIR: &str = "converge";

/// Store file name.
const STORE_FILE: &str = "resources.json";

/// Current store format version.
const STORE_VERSION: &str = "1";

/// On-disk document.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    /// Format version.
    version: String,
    /// Resources by case-folded ID.
    resources: BTreeMap<String, Value>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            resources: BTreeMap::new(),
        }
    }
}

/// File-backed implementation of [`CloudClient`].
#[derive(Debug)]
pub struct LocalCloud {
    /// Directory holding the store.
    base_dir: PathBuf,
    /// Path of the store file.
    store_path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl LocalCloud {
    /// Creates a local cloud rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let store_path = base_dir.join(STORE_FILE);
        Self {
            base_dir,
            store_path,
            guard: Mutex::new(()),
        }
    }

    /// Returns the default directory, under the user's data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join(DATA_DIR))
            .ok_or_else(|| ConvergeError::internal("Cannot determine user data directory"))
    }

    /// Returns the store file path.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    async fn load(&self) -> Result<StoreDocument> {
        if !self.store_path.exists() {
            return Ok(StoreDocument::default());
        }
        let content = fs::read_to_string(&self.store_path).await?;
        serde_json::from_str(&content).map_err(|e| {
            ProviderError::InvalidResponse {
                message: format!("Failed to parse {}: {e}", self.store_path.display()),
            }
            .into()
        })
    }

    async fn save(&self, document: &StoreDocument) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating local cloud directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await?;
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| ConvergeError::internal(format!("Failed to serialize store: {e}")))?;

        let temp_path = self.store_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.store_path).await?;
        Ok(())
    }

    fn parse(address: &ResourceAddress) -> Result<ResourceId> {
        ResourceId::parse(&address.id).ok_or_else(|| {
            ProviderError::invalid_field(format!("Malformed resource ID: {}", address.id), "id").into()
        })
    }

    fn etag(body: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.to_string().as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    /// Adds the read-only fields the provider would report.
    fn stamp(address: &ResourceAddress, parsed: &ResourceId, body: &Value, existing: Option<&Value>) -> Value {
        let mut resource = match body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let etag = Self::etag(&Value::Object(resource.clone()));
        let now = Utc::now().to_rfc3339();
        let created_at = existing
            .and_then(|e| e.pointer("/systemData/createdAt"))
            .cloned()
            .unwrap_or_else(|| Value::String(now.clone()));

        resource.insert("id".to_string(), Value::String(address.id.clone()));
        resource.insert("name".to_string(), Value::String(parsed.name().to_string()));
        resource.insert("type".to_string(), Value::String(parsed.resource_type()));
        resource.insert("etag".to_string(), Value::String(etag));
        resource.insert(
            "systemData".to_string(),
            json!({"createdAt": created_at, "lastModifiedAt": now}),
        );

        if parsed.namespace.is_some() {
            let properties = resource
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(properties) = properties {
                properties.insert("provisioningState".to_string(), Value::String("Succeeded".to_string()));
            }
        }
        Value::Object(resource)
    }
}

/// Applies a JSON merge patch: mappings merge recursively, `null` removes.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[async_trait]
impl CloudClient for LocalCloud {
    async fn get_resource(&self, address: &ResourceAddress) -> Result<Option<Value>> {
        let document = self.load().await?;
        Ok(document.resources.get(&resource_id_key(&address.id)).cloned())
    }

    async fn put_resource(&self, address: &ResourceAddress, body: &Value, mode: PutMode) -> Result<OperationOutcome> {
        let parsed = Self::parse(address)?;
        let _guard = self.guard.lock().await;
        let mut document = self.load().await?;
        let key = resource_id_key(&address.id);
        let existing = document.resources.get(&key);

        if mode == PutMode::CreateOnly && existing.is_some() {
            return Err(ProviderError::Conflict {
                resource: address.id.clone(),
                message: "resource already exists".to_string(),
            }
            .into());
        }

        let stamped = Self::stamp(address, &parsed, body, existing);
        info!("Local cloud: put {}", address.id);
        document.resources.insert(key, stamped.clone());
        self.save(&document).await?;
        Ok(OperationOutcome::Done(Some(stamped)))
    }

    async fn patch_resource(&self, address: &ResourceAddress, body: &Value) -> Result<OperationOutcome> {
        let parsed = Self::parse(address)?;
        let _guard = self.guard.lock().await;
        let mut document = self.load().await?;
        let key = resource_id_key(&address.id);

        let Some(existing) = document.resources.get(&key) else {
            return Err(ProviderError::not_found(address.id.clone()).into());
        };
        let mut merged = existing.clone();
        merge_patch(&mut merged, body);
        let stamped = Self::stamp(address, &parsed, &merged, Some(existing));

        info!("Local cloud: patch {}", address.id);
        document.resources.insert(key, stamped.clone());
        self.save(&document).await?;
        Ok(OperationOutcome::Done(Some(stamped)))
    }

    async fn delete_resource(&self, address: &ResourceAddress) -> Result<Option<OperationOutcome>> {
        let _guard = self.guard.lock().await;
        let mut document = self.load().await?;
        if document.resources.remove(&resource_id_key(&address.id)).is_none() {
            return Ok(None);
        }
        info!("Local cloud: delete {}", address.id);
        self.save(&document).await?;
        Ok(Some(OperationOutcome::Done(None)))
    }

    async fn resource_group_location(&self, subscription: &str, resource_group: &str) -> Result<Option<String>> {
        let document = self.load().await?;
        let key = resource_id_key(&resource_group_id(subscription, resource_group));
        Ok(document
            .resources
            .get(&key)
            .and_then(|rg| rg.get("location"))
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }
}
