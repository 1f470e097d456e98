//! Canonicalization of desired and observed values.
//!
//! The normalizer is pure: it never performs I/O. Everything it needs from
//! outside (subscription, resource group, default location) is captured in a
//! [`Scope`] when it is built.
//!
//! - [`case`]: snake_case to provider casing
//! - [`location`]: whitespace and case folding of locations
//! - [`resource_id`]: expansion and comparison of resource references

pub mod case;
pub mod location;
pub mod resource_id;

pub use case::{EnumCase, to_camel_case, to_pascal_case, to_snake_case};
pub use location::canonical_location;
pub use resource_id::{ResourceId, expand_reference, format_resource_id, is_resource_id, resource_id_key};

use serde_json::{Map, Value};

use crate::adapter::{FieldDescriptor, FieldType, RESOURCE_GROUP_SEGMENT, ResourceSchema, SUBSCRIPTION_SEGMENT};
use crate::error::{ReconcileError, Result};
use crate::request::Request;

/// Wire name of the location field.
pub const LOCATION_FIELD: &str = "location";

/// Context the normalizer needs from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Subscription used to expand short resource references.
    pub subscription: Option<String>,
    /// Resource group used to expand short resource references.
    pub resource_group: Option<String>,
    /// Location substituted when a required location is missing.
    pub default_location: Option<String>,
}

impl Scope {
    /// Derives the scope from a request and the schema's identity layout.
    #[must_use]
    pub fn for_request(schema: &ResourceSchema, request: &Request) -> Self {
        Self {
            subscription: schema
                .identity_segment(&request.identity, SUBSCRIPTION_SEGMENT)
                .map(ToString::to_string),
            resource_group: schema
                .identity_segment(&request.identity, RESOURCE_GROUP_SEGMENT)
                .map(ToString::to_string),
            default_location: request.defaults.location.clone(),
        }
    }
}

/// Canonicalizes values against a resource schema.
#[derive(Debug)]
pub struct Normalizer<'a> {
    /// Schema of the resource kind.
    schema: &'a ResourceSchema,
    /// Request-derived context.
    scope: Scope,
}

impl<'a> Normalizer<'a> {
    /// Creates a normalizer.
    #[must_use]
    pub const fn new(schema: &'a ResourceSchema, scope: Scope) -> Self {
        Self { schema, scope }
    }

    /// Creates a normalizer for a request.
    #[must_use]
    pub fn for_request(schema: &'a ResourceSchema, request: &Request) -> Self {
        Self::new(schema, Scope::for_request(schema, request))
    }

    /// Returns the schema.
    #[must_use]
    pub const fn schema(&self) -> &'a ResourceSchema {
        self.schema
    }

    /// Produces the canonical wire form of a desired-state mapping.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error when a required field is missing, a
    /// value has the wrong shape, or a resource reference cannot be expanded.
    pub fn canonicalize_desired(&self, desired: &Map<String, Value>) -> Result<Map<String, Value>> {
        self.canonicalize_fields(desired, &self.schema.fields, "", true)
    }

    fn canonicalize_fields(
        &self,
        input: &Map<String, Value>,
        fields: &[FieldDescriptor],
        path: &str,
        top_level: bool,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();

        for (key, value) in input {
            if value.is_null() {
                continue;
            }
            let field_path = format!("{path}/{key}");
            match fields.iter().find(|f| f.name == *key || f.wire() == *key) {
                Some(descriptor) => {
                    let canonical = self.canonicalize_value(value, descriptor, &field_path)?;
                    out.insert(descriptor.wire(), canonical);
                }
                None => {
                    out.insert(to_camel_case(key), strip_nulls(value));
                }
            }
        }

        for descriptor in fields.iter().filter(|f| f.required) {
            let wire = descriptor.wire();
            if out.contains_key(&wire) {
                continue;
            }
            if top_level && descriptor.name == LOCATION_FIELD {
                if let Some(default) = &self.scope.default_location {
                    out.insert(wire, Value::String(canonical_location(default)));
                    continue;
                }
            }
            let field = format!("{path}/{}", descriptor.name);
            return Err(ReconcileError::invalid(format!("missing required field '{field}'"), field).into());
        }

        Ok(out)
    }

    fn canonicalize_value(&self, value: &Value, descriptor: &FieldDescriptor, path: &str) -> Result<Value> {
        if let Some(resource_type) = &descriptor.resource_id {
            return match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| self.expand(item, resource_type, path))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => self.expand(other, resource_type, path),
            };
        }

        if !descriptor.field_type.accepts(value) {
            return Err(ReconcileError::invalid(
                format!("field '{path}' expects {}", descriptor.field_type.label()),
                path,
            )
            .into());
        }

        match (&descriptor.field_type, value) {
            (FieldType::Object(fields), Value::Object(map)) => {
                Ok(Value::Object(self.canonicalize_fields(map, fields, path, false)?))
            }
            (FieldType::List(inner), Value::Array(items)) => {
                let element_path = format!("{path}/*");
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let canonical = match (inner.as_ref(), item) {
                        (FieldType::Object(fields), Value::Object(map)) => {
                            Value::Object(self.canonicalize_fields(map, fields, &element_path, false)?)
                        }
                        _ if !inner.accepts(item) => {
                            return Err(ReconcileError::invalid(
                                format!("field '{element_path}' expects {}", inner.label()),
                                element_path.as_str(),
                            )
                            .into());
                        }
                        _ => self.canonical_scalar(item, inner, descriptor.enum_case, &element_path),
                    };
                    out.push(canonical);
                }
                Ok(Value::Array(out))
            }
            (FieldType::Map | FieldType::Any, _) => Ok(strip_nulls(value)),
            _ => Ok(self.canonical_scalar(value, &descriptor.field_type, descriptor.enum_case, path)),
        }
    }

    /// Converts an accepted scalar to its declared JSON type, then applies
    /// location and enum folding to strings.
    fn canonical_scalar(&self, value: &Value, field_type: &FieldType, enum_case: Option<EnumCase>, path: &str) -> Value {
        let value = typed_scalar(value, field_type);
        let Value::String(text) = &value else {
            return value;
        };
        if path == "/location" {
            return Value::String(canonical_location(text));
        }
        match enum_case {
            Some(case) => Value::String(case.apply(text)),
            None => value,
        }
    }

    fn expand(&self, value: &Value, resource_type: &str, path: &str) -> Result<Value> {
        expand_reference(
            value,
            resource_type,
            self.scope.subscription.as_deref(),
            self.scope.resource_group.as_deref(),
        )
        .map(Value::String)
        .map_err(|message| ReconcileError::invalid(format!("field '{path}': {message}"), path).into())
    }

    /// Returns the comparison key of a scalar at `path` (wire segments, `*`
    /// for list elements), or `None` for mappings and sequences.
    ///
    /// Both sides of a comparison go through this independently, so observed
    /// values get the same location, enum and resource-ID folding as desired ones.
    #[must_use]
    pub fn scalar_key(&self, path: &[String], value: &Value) -> Option<String> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => return None,
        };

        if path.len() == 1 && path[0] == LOCATION_FIELD {
            return Some(canonical_location(&text));
        }

        let key = match self.schema.lookup(path) {
            Some(descriptor) if descriptor.resource_id.is_some() => resource_id_key(&text),
            Some(FieldDescriptor {
                enum_case: Some(case), ..
            }) => case.apply(&text).to_lowercase(),
            _ => text,
        };
        Some(key)
    }
}

/// Converts textual scalars to the declared type (`"100"` for an integer
/// becomes `100`) and numbers or booleans to text for string fields. Values
/// that do not parse are returned unchanged.
fn typed_scalar(value: &Value, field_type: &FieldType) -> Value {
    match (field_type, value) {
        (FieldType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_or_else(|_| value.clone(), Value::from),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        (FieldType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        (FieldType::String, Value::Number(n)) => Value::String(n.to_string()),
        (FieldType::String, Value::Bool(b)) => Value::String(b.to_string()),
        _ => value.clone(),
    }
}

/// Removes `null` values from mappings, recursively.
#[must_use]
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ResourceAdapter, catalog};
    use crate::error::ErrorKind;
    use crate::request::Identity;
    use serde_json::json;

    fn desired(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn dns_request(body: Value) -> Request {
        Request::present(
            "dns-zone",
            Identity::new(["sub-1", "rg-1", "example.com"]),
            desired(body),
        )
    }

    #[test]
    fn test_location_and_enum_canonicalized() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({"location": "East US", "zone_type": "public"}));
        let normalizer = Normalizer::for_request(&schema, &request);

        let out = normalizer.canonicalize_desired(&request.desired).unwrap();
        assert_eq!(out["location"], json!("eastus"));
        assert_eq!(out["zoneType"], json!("Public"));
    }

    #[test]
    fn test_nulls_are_dropped() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({"location": "eastus", "zone_type": null, "tags": {"a": null, "b": "1"}}));
        let normalizer = Normalizer::for_request(&schema, &request);

        let out = normalizer.canonicalize_desired(&request.desired).unwrap();
        assert!(!out.contains_key("zoneType"));
        assert_eq!(out["tags"], json!({"b": "1"}));
    }

    #[test]
    fn test_default_location_fills_missing() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({})).with_default_location("West Europe");
        let normalizer = Normalizer::for_request(&schema, &request);

        let out = normalizer.canonicalize_desired(&request.desired).unwrap();
        assert_eq!(out["location"], json!("westeurope"));
    }

    #[test]
    fn test_missing_required_location_is_invalid() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({"zone_type": "public"}));
        let normalizer = Normalizer::for_request(&schema, &request);

        let err = normalizer.canonicalize_desired(&request.desired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_short_references_expand() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({
            "location": "eastus",
            "zone_type": "private",
            "registration_virtual_networks": ["vnet1", {"name": "vnet2", "resource_group": "net-rg"}]
        }));
        let normalizer = Normalizer::for_request(&schema, &request);

        let out = normalizer.canonicalize_desired(&request.desired).unwrap();
        assert_eq!(
            out["registrationVirtualNetworks"],
            json!([
                "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Network/virtualNetworks/vnet1",
                "/subscriptions/sub-1/resourceGroups/net-rg/providers/Microsoft.Network/virtualNetworks/vnet2"
            ])
        );
    }

    #[test]
    fn test_unknown_keys_pass_through_camel_cased() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({"location": "eastus", "max_number_of_record_sets": 5}));
        let normalizer = Normalizer::for_request(&schema, &request);

        let out = normalizer.canonicalize_desired(&request.desired).unwrap();
        assert_eq!(out["maxNumberOfRecordSets"], json!(5));
    }

    #[test]
    fn test_shape_mismatch_is_invalid() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({"location": "eastus", "tags": "oops"}));
        let normalizer = Normalizer::for_request(&schema, &request);

        assert!(normalizer.canonicalize_desired(&request.desired).is_err());
    }

    #[test]
    fn test_textual_scalars_take_declared_type() {
        let schema = catalog::network_security_group().schema().clone();
        let request = Request::present(
            "network-security-group",
            Identity::new(["sub-1", "rg-1", "nsg1"]),
            desired(json!({
                "location": "eastus",
                "security_rules": [{
                    "name": "ssh",
                    "properties": {
                        "priority": "100",
                        "protocol": "tcp",
                        "access": "allow",
                        "direction": "inbound"
                    }
                }]
            })),
        );
        let normalizer = Normalizer::for_request(&schema, &request);

        let out = normalizer.canonicalize_desired(&request.desired).unwrap();
        let properties = &out["securityRules"][0]["properties"];
        assert_eq!(properties["priority"], json!(100));
        assert_eq!(properties["protocol"], json!("Tcp"));
    }

    #[test]
    fn test_scalar_list_elements_are_typed() {
        let schema = catalog::public_ip_address().schema().clone();
        let identity = Identity::new(["sub-1", "rg-1", "ip1"]);
        let zoned = Request::present(
            "public-ip-address",
            identity.clone(),
            desired(json!({"location": "eastus", "zones": [1, "2"], "idle_timeout_in_minutes": "4"})),
        );
        let out = Normalizer::for_request(&schema, &zoned)
            .canonicalize_desired(&zoned.desired)
            .unwrap();
        assert_eq!(out["zones"], json!(["1", "2"]));
        assert_eq!(out["idleTimeoutInMinutes"], json!(4));

        let nested = Request::present(
            "public-ip-address",
            identity,
            desired(json!({"location": "eastus", "zones": [{"zone": 1}]})),
        );
        let err = Normalizer::for_request(&schema, &nested)
            .canonicalize_desired(&nested.desired)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_typed_scalar_conversions() {
        assert_eq!(typed_scalar(&json!(" 7 "), &FieldType::Integer), json!(7));
        assert_eq!(typed_scalar(&json!("1.5"), &FieldType::Number), json!(1.5));
        assert_eq!(typed_scalar(&json!("true"), &FieldType::Boolean), json!(true));
        assert_eq!(typed_scalar(&json!(42), &FieldType::String), json!("42"));
        assert_eq!(typed_scalar(&json!("many"), &FieldType::Integer), json!("many"));
        assert_eq!(typed_scalar(&json!(3), &FieldType::Integer), json!(3));
    }

    #[test]
    fn test_scalar_keys() {
        let schema = catalog::dns_zone().schema().clone();
        let request = dns_request(json!({}));
        let normalizer = Normalizer::for_request(&schema, &request);
        let path = |p: &[&str]| p.iter().map(ToString::to_string).collect::<Vec<_>>();

        assert_eq!(
            normalizer.scalar_key(&path(&["location"]), &json!("East US")),
            normalizer.scalar_key(&path(&["location"]), &json!("eastus"))
        );
        assert_eq!(
            normalizer.scalar_key(&path(&["zoneType"]), &json!("public")),
            normalizer.scalar_key(&path(&["zoneType"]), &json!("Public"))
        );
        assert_eq!(
            normalizer.scalar_key(&path(&["other"]), &json!("10")),
            normalizer.scalar_key(&path(&["other"]), &json!(10))
        );
        assert_ne!(
            normalizer.scalar_key(&path(&["other"]), &json!("A")),
            normalizer.scalar_key(&path(&["other"]), &json!("a"))
        );
        assert!(normalizer.scalar_key(&path(&["tags"]), &json!({})).is_none());
    }
}
