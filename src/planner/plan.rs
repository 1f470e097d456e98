//! Action selection.
//!
//! Deciding what to do is a pure function of intent, the observed state and
//! the comparison result, kept apart from the reconciler so it can be tested
//! without any I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapter::ResourceAdapter;
use crate::error::{ReconcileError, Result};
use crate::normalize::Normalizer;
use crate::request::{Intent, Request};

use super::diff::{Comparator, Divergence};

/// State transition selected for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Nothing to do.
    #[default]
    None,
    /// Create the resource.
    Create,
    /// Update the resource in place.
    Update,
    /// Delete and create the resource.
    Recreate,
    /// Delete the resource.
    Delete,
}

impl Action {
    /// Returns true if this action mutates the resource.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Returns true if the resource is re-read after this action.
    #[must_use]
    pub const fn rereads(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Recreate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Recreate => write!(f, "recreate"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Outcome of the decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Selected action.
    pub action: Action,
    /// Witness for update and recreate.
    pub divergence: Option<Divergence>,
}

impl Plan {
    const fn of(action: Action) -> Self {
        Self {
            action,
            divergence: None,
        }
    }

    /// Returns true if nothing needs to change.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self.action, Action::None)
    }
}

/// Inputs to the decision besides the states being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionFlags {
    /// Presence intent.
    pub intent: Intent,
    /// Replace instead of update.
    pub force_update: bool,
    /// Whether the adapter can update in place.
    pub supports_update: bool,
}

/// Selects the action converging `observed` towards `desired`.
///
/// A divergent resource is either updated or recreated, never both:
/// recreation wins when forced or when the adapter cannot update in place.
#[must_use]
pub fn decide(
    flags: DecisionFlags,
    observed: Option<&Value>,
    desired: &Map<String, Value>,
    comparator: &Comparator<'_>,
) -> Plan {
    match (flags.intent, observed) {
        (Intent::Absent, None) => Plan::of(Action::None),
        (Intent::Absent, Some(_)) => Plan::of(Action::Delete),
        (Intent::Present, None) => Plan::of(Action::Create),
        (Intent::Present, Some(observed)) => {
            let desired = Value::Object(desired.clone());
            match comparator.compare(&desired, observed) {
                None => Plan::of(Action::None),
                Some(divergence) => {
                    let action = if flags.force_update || !flags.supports_update {
                        Action::Recreate
                    } else {
                        Action::Update
                    };
                    Plan {
                        action,
                        divergence: Some(divergence),
                    }
                }
            }
        }
    }
}

/// Predicts the action for `request` against a provider document supplied
/// by the caller instead of read from the cloud.
///
/// `resource` goes through [`ResourceAdapter::observe`] first, so a raw
/// provider body can be passed as-is.
///
/// # Errors
///
/// Returns an invalid-request error if the identity or desired state cannot
/// be normalized.
pub fn plan_offline(adapter: &dyn ResourceAdapter, request: &Request, resource: Option<&Value>) -> Result<Plan> {
    let schema = adapter.schema();
    schema
        .check_identity(&request.identity)
        .map_err(|message| ReconcileError::invalid(message, "identity"))?;

    let normalizer = Normalizer::for_request(schema, request);
    let desired = match request.intent {
        Intent::Present => normalizer.canonicalize_desired(&request.desired)?,
        Intent::Absent => Map::new(),
    };
    let observed = resource.map(|r| adapter.observe(r));
    let flags = DecisionFlags {
        intent: request.intent,
        force_update: request.force_update,
        supports_update: adapter.supports_update(),
    };
    Ok(decide(flags, observed.as_ref(), &desired, &Comparator::new(&normalizer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{FieldDescriptor, ResourceSchema};
    use crate::normalize::{Normalizer, Scope};
    use serde_json::json;

    fn flags(intent: Intent, force_update: bool, supports_update: bool) -> DecisionFlags {
        DecisionFlags {
            intent,
            force_update,
            supports_update,
        }
    }

    fn run(flags: DecisionFlags, observed: Option<Value>, desired: Value) -> Plan {
        let schema = ResourceSchema::new("t", &["name"], vec![FieldDescriptor::string("location")]);
        let normalizer = Normalizer::new(&schema, Scope::default());
        let comparator = Comparator::new(&normalizer);
        let desired = desired.as_object().cloned().unwrap_or_default();
        decide(flags, observed.as_ref(), &desired, &comparator)
    }

    #[test]
    fn test_absent_and_missing_is_noop() {
        let plan = run(flags(Intent::Absent, false, true), None, json!({}));
        assert_eq!(plan.action, Action::None);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_absent_and_present_deletes() {
        let plan = run(flags(Intent::Absent, false, true), Some(json!({"location": "x"})), json!({}));
        assert_eq!(plan.action, Action::Delete);
        assert!(plan.divergence.is_none());
    }

    #[test]
    fn test_present_and_missing_creates() {
        let plan = run(flags(Intent::Present, false, true), None, json!({"location": "x"}));
        assert_eq!(plan.action, Action::Create);
    }

    #[test]
    fn test_present_and_equal_is_noop() {
        let plan = run(
            flags(Intent::Present, true, true),
            Some(json!({"location": "x"})),
            json!({"location": "x"}),
        );
        assert_eq!(plan.action, Action::None);
    }

    #[test]
    fn test_divergent_updates_or_recreates() {
        let observed = Some(json!({"location": "x"}));
        let desired = json!({"location": "y"});

        let update = run(flags(Intent::Present, false, true), observed.clone(), desired.clone());
        assert_eq!(update.action, Action::Update);
        assert_eq!(update.divergence.unwrap().path, "/location");

        let forced = run(flags(Intent::Present, true, true), observed.clone(), desired.clone());
        assert_eq!(forced.action, Action::Recreate);

        let no_update = run(flags(Intent::Present, false, false), observed, desired);
        assert_eq!(no_update.action, Action::Recreate);
    }

    #[test]
    fn test_plan_offline_flattens_provider_body() {
        let registry = crate::adapter::AdapterRegistry::builtin();
        let adapter = registry.get("storage-account").unwrap();
        let request = Request::present(
            "storage-account",
            crate::request::Identity::new(["s", "rg", "acct"]),
            json!({"location": "West Europe", "sku": {"name": "Standard_GRS"}, "kind": "StorageV2"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let resource = json!({
            "location": "westeurope",
            "kind": "StorageV2",
            "sku": {"name": "Standard_LRS"},
            "properties": {"provisioningState": "Succeeded"}
        });

        let plan = plan_offline(adapter.as_ref(), &request, Some(&resource)).unwrap();
        assert_eq!(plan.action, Action::Update);
        assert_eq!(plan.divergence.unwrap().path, "/sku/name");

        let missing = plan_offline(adapter.as_ref(), &request, None).unwrap();
        assert_eq!(missing.action, Action::Create);
    }

    #[test]
    fn test_plan_offline_rejects_bad_identity() {
        let registry = crate::adapter::AdapterRegistry::builtin();
        let adapter = registry.get("dns-zone").unwrap();
        let request = Request::absent("dns-zone", crate::request::Identity::new(["only-one"]));
        assert!(plan_offline(adapter.as_ref(), &request, None).is_err());
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(Action::Recreate.to_string(), "recreate");
        assert_eq!(serde_json::to_value(Action::None).unwrap(), json!("none"));
        assert!(Action::Create.rereads());
        assert!(!Action::Delete.rereads());
    }
}
