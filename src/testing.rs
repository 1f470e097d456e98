//! In-memory cloud with scripted behavior for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::adapter::ArmAdapter;
use crate::cloud::{CloudClient, PutMode, ResourceAddress};
use crate::error::{ProviderError, Result};
use crate::normalize::resource_id_key;
use crate::operation::{OperationFailure, OperationHandle, OperationOutcome, OperationStatus};
use crate::request::Identity;

/// Identity of a DNS zone in the test subscription.
pub fn zone_identity(name: &str) -> Identity {
    Identity::new(["sub-1", "rg-1", name])
}

#[derive(Debug, Default)]
struct Script {
    /// Pending polls before each mutation's operation completes.
    pending_polls: u32,
    /// Reads that still return a resource after it was deleted.
    lag_reads: u32,
    /// Create calls that lose a race: the resource appears and `Conflict` is returned.
    create_conflicts: u32,
    /// Failure reported by the next operations.
    operation_failure: Option<OperationFailure>,
    /// Error returned by every read.
    read_error: Option<String>,
    /// Resource state that should have been created by a racing writer.
    racer_body: Option<Value>,
}

/// Scripted [`CloudClient`].
#[derive(Debug, Default)]
pub struct ScriptedCloud {
    resources: Mutex<HashMap<String, Value>>,
    ghosts: Mutex<HashMap<String, Value>>,
    script: Mutex<Script>,
    reads: AtomicU32,
    puts: AtomicU32,
    patches: AtomicU32,
    deletes: AtomicU32,
    polls: Arc<AtomicU32>,
}

impl ScriptedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a resource built from a flat wire-named mapping.
    pub fn seed(&self, adapter: &ArmAdapter, identity: &Identity, flat: Value) {
        let address = adapter.address(identity).unwrap();
        let body = adapter.body(flat.as_object().unwrap());
        self.resources
            .lock()
            .unwrap()
            .insert(resource_id_key(&address.id), stamp(&address, &body));
    }

    /// Returns the stored body of a resource.
    pub fn stored(&self, adapter: &ArmAdapter, identity: &Identity) -> Option<Value> {
        let address = adapter.address(identity).unwrap();
        self.resources
            .lock()
            .unwrap()
            .get(&resource_id_key(&address.id))
            .cloned()
    }

    pub fn set_pending_polls(&self, polls: u32) {
        self.script.lock().unwrap().pending_polls = polls;
    }

    pub fn set_lag_reads(&self, reads: u32) {
        self.script.lock().unwrap().lag_reads = reads;
    }

    /// Makes the next `times` creates fail with `Conflict`. With a `body`, the
    /// racing writer's resource becomes visible; without one it stays hidden.
    pub fn lose_create_race(&self, times: u32, body: Option<Value>) {
        let mut script = self.script.lock().unwrap();
        script.create_conflicts = times;
        script.racer_body = body;
    }

    pub fn fail_operations(&self, failure: OperationFailure) {
        self.script.lock().unwrap().operation_failure = Some(failure);
    }

    pub fn fail_reads(&self, message: &str) {
        self.script.lock().unwrap().read_error = Some(message.to_string());
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn patches(&self) -> u32 {
        self.patches.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u32 {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    /// Number of calls that could have changed the cloud.
    pub fn mutations(&self) -> u32 {
        self.puts() + self.patches() + self.deletes()
    }

    fn outcome(&self, result: Option<Value>) -> OperationOutcome {
        let script = self.script.lock().unwrap();
        if script.pending_polls == 0 && script.operation_failure.is_none() {
            return OperationOutcome::Done(result);
        }
        OperationOutcome::Pending(Box::new(ScriptedHandle {
            id: format!("op-{}", self.mutations()),
            remaining: AtomicU32::new(script.pending_polls),
            result,
            failure: script.operation_failure.clone(),
            polls: Arc::clone(&self.polls),
        }))
    }
}

fn stamp(address: &ResourceAddress, body: &Value) -> Value {
    let mut resource = body.as_object().cloned().unwrap_or_default();
    resource.insert("id".to_string(), json!(address.id));
    resource.insert(
        "name".to_string(),
        json!(address.id.rsplit('/').next().unwrap_or_default()),
    );
    let properties = resource
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(properties) = properties {
        properties.insert("provisioningState".to_string(), json!("Succeeded"));
    }
    Value::Object(resource)
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait]
impl CloudClient for ScriptedCloud {
    async fn get_resource(&self, address: &ResourceAddress) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.script.lock().unwrap().read_error.clone() {
            return Err(ProviderError::unavailable(message).into());
        }

        let key = resource_id_key(&address.id);
        {
            let mut script = self.script.lock().unwrap();
            let ghosts = self.ghosts.lock().unwrap();
            if script.lag_reads > 0 {
                if let Some(ghost) = ghosts.get(&key) {
                    script.lag_reads -= 1;
                    return Ok(Some(ghost.clone()));
                }
            }
        }
        Ok(self.resources.lock().unwrap().get(&key).cloned())
    }

    async fn put_resource(&self, address: &ResourceAddress, body: &Value, mode: PutMode) -> Result<OperationOutcome> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let key = resource_id_key(&address.id);

        if mode == PutMode::CreateOnly {
            let race = {
                let mut script = self.script.lock().unwrap();
                if script.create_conflicts > 0 {
                    script.create_conflicts -= 1;
                    Some(script.racer_body.clone())
                } else {
                    None
                }
            };
            if let Some(racer) = race {
                if let Some(racer) = racer {
                    self.resources
                        .lock()
                        .unwrap()
                        .insert(key, stamp(address, &racer));
                }
                return Err(ProviderError::Conflict {
                    resource: address.id.clone(),
                    message: "created concurrently".to_string(),
                }
                .into());
            }
            if self.resources.lock().unwrap().contains_key(&key) {
                return Err(ProviderError::Conflict {
                    resource: address.id.clone(),
                    message: "already exists".to_string(),
                }
                .into());
            }
        }

        let resource = stamp(address, body);
        self.resources.lock().unwrap().insert(key, resource.clone());
        Ok(self.outcome(Some(resource)))
    }

    async fn patch_resource(&self, address: &ResourceAddress, body: &Value) -> Result<OperationOutcome> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        let key = resource_id_key(&address.id);
        let resource = {
            let mut resources = self.resources.lock().unwrap();
            let Some(existing) = resources.get_mut(&key) else {
                return Err(ProviderError::not_found(address.id.clone()).into());
            };
            merge(existing, body);
            existing.clone()
        };
        Ok(self.outcome(Some(resource)))
    }

    async fn delete_resource(&self, address: &ResourceAddress) -> Result<Option<OperationOutcome>> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let key = resource_id_key(&address.id);
        let Some(removed) = self.resources.lock().unwrap().remove(&key) else {
            return Ok(None);
        };
        self.ghosts.lock().unwrap().insert(key, removed);
        Ok(Some(self.outcome(None)))
    }

    async fn resource_group_location(&self, _subscription: &str, _resource_group: &str) -> Result<Option<String>> {
        Ok(Some("westeurope".to_string()))
    }
}

/// Operation that stays pending for a scripted number of polls.
struct ScriptedHandle {
    id: String,
    remaining: AtomicU32,
    result: Option<Value>,
    failure: Option<OperationFailure>,
    polls: Arc<AtomicU32>,
}

#[async_trait]
impl OperationHandle for ScriptedHandle {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn poll(&self) -> Result<OperationStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.remaining.load(Ordering::SeqCst) > 0 {
            self.remaining.fetch_sub(1, Ordering::SeqCst);
            return Ok(OperationStatus::Pending);
        }
        Ok(match &self.failure {
            Some(failure) => OperationStatus::Failed(failure.clone()),
            None => OperationStatus::Succeeded(self.result.clone()),
        })
    }
}
