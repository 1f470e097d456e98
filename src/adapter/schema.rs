//! Argument schemas published by adapters.
//!
//! A schema is an opaque descriptor from the engine's point of view: the
//! normalizer walks it to decide which values need location, enum or
//! resource-ID canonicalization, and the validator walks it to report
//! unknown or missing fields.

use serde::Serialize;
use serde_json::Value;

use crate::normalize::{EnumCase, to_camel_case};
use crate::request::Identity;

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// String value.
    String,
    /// Integer value.
    Integer,
    /// Floating point value.
    Number,
    /// Boolean value.
    Boolean,
    /// Nested mapping with declared fields.
    Object(Vec<FieldDescriptor>),
    /// Sequence of elements of one type.
    List(Box<FieldType>),
    /// Free-form mapping whose keys are user data (tags).
    Map,
    /// Anything.
    Any,
}

impl FieldType {
    /// Returns true if `value` is acceptable for this type.
    ///
    /// Scalars are accepted in their textual form too (`"10"` for an integer).
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::String, Value::String(_) | Value::Number(_) | Value::Bool(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
            (Self::Number, Value::Number(_)) => true,
            (Self::Number, Value::String(s)) => s.trim().parse::<f64>().is_ok(),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Boolean, Value::String(s)) => matches!(s.as_str(), "true" | "false"),
            (Self::Object(_) | Self::Map, Value::Object(_)) | (Self::List(_), Value::Array(_)) => {
                true
            }
            _ => false,
        }
    }

    /// Short name used in messages and tables.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::List(inner) => format!("list<{}>", inner.label()),
            Self::Map => "map".to_string(),
            Self::Any => "any".to_string(),
        }
    }
}

/// Descriptor of one field in a desired-state mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// User-facing snake_case name.
    pub name: String,
    /// Provider wire name when it is not the camelCase form of `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wire_name: Option<String>,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether the field must be supplied for a present resource.
    pub required: bool,
    /// Case policy for enum-like string values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_case: Option<EnumCase>,
    /// Resource type referenced by this field's values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl FieldDescriptor {
    /// Creates an optional field of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            wire_name: None,
            field_type,
            required: false,
            enum_case: None,
            resource_id: None,
        }
    }

    /// Creates a string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// Creates an integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    /// Creates a boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// Creates a nested object field.
    #[must_use]
    pub fn object(name: impl Into<String>, fields: Vec<Self>) -> Self {
        Self::new(name, FieldType::Object(fields))
    }

    /// Creates a list field.
    #[must_use]
    pub fn list(name: impl Into<String>, element: FieldType) -> Self {
        Self::new(name, FieldType::List(Box::new(element)))
    }

    /// Creates a free-form map field.
    #[must_use]
    pub fn map(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Map)
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets an explicit wire name.
    #[must_use]
    pub fn wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    /// Declares the field as enum-like with the given case policy.
    #[must_use]
    pub const fn enum_case(mut self, case: EnumCase) -> Self {
        self.enum_case = Some(case);
        self
    }

    /// Declares the field (or its list elements) as references to `resource_type`.
    #[must_use]
    pub fn resource_id(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_id = Some(resource_type.into());
        self
    }

    /// Returns the provider wire name.
    #[must_use]
    pub fn wire(&self) -> String {
        self.wire_name.clone().unwrap_or_else(|| to_camel_case(&self.name))
    }

    /// Returns nested field descriptors for objects and lists of objects.
    #[must_use]
    pub fn children(&self) -> Option<&[Self]> {
        match &self.field_type {
            FieldType::Object(fields) => Some(fields),
            FieldType::List(inner) => match inner.as_ref() {
                FieldType::Object(fields) => Some(fields),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Schema of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    /// Kind identifier.
    pub kind: String,
    /// Names of the identity segments, e.g. `["subscription", "resource_group", "name"]`.
    pub identity: Vec<String>,
    /// Top-level fields.
    pub fields: Vec<FieldDescriptor>,
}

/// Name of the identity segment holding the subscription.
pub const SUBSCRIPTION_SEGMENT: &str = "subscription";

/// Name of the identity segment holding the resource group.
pub const RESOURCE_GROUP_SEGMENT: &str = "resource_group";

impl ResourceSchema {
    /// Creates a schema.
    #[must_use]
    pub fn new(kind: impl Into<String>, identity: &[&str], fields: Vec<FieldDescriptor>) -> Self {
        Self {
            kind: kind.into(),
            identity: identity.iter().map(ToString::to_string).collect(),
            fields,
        }
    }

    /// Finds a top-level field by its user name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds a field by its wire path. `*` segments step into list elements.
    #[must_use]
    pub fn lookup(&self, path: &[String]) -> Option<&FieldDescriptor> {
        let mut fields: &[FieldDescriptor] = &self.fields;
        let mut current: Option<&FieldDescriptor> = None;

        for segment in path {
            if segment == "*" {
                continue;
            }
            let found = fields.iter().find(|f| f.wire() == *segment)?;
            current = Some(found);
            fields = found.children().unwrap_or(&[]);
        }
        current
    }

    /// Returns true if the schema requires a `location` field.
    #[must_use]
    pub fn requires_location(&self) -> bool {
        self.field("location").is_some_and(|f| f.required)
    }

    /// Returns the identity segment named `segment`.
    #[must_use]
    pub fn identity_segment<'a>(&self, identity: &'a Identity, segment: &str) -> Option<&'a str> {
        let index = self.identity.iter().position(|s| s == segment)?;
        identity.get(index)
    }

    /// Checks that `identity` has one segment per declared name.
    ///
    /// # Errors
    ///
    /// Returns a message naming the expected segments.
    pub fn check_identity(&self, identity: &Identity) -> std::result::Result<(), String> {
        if identity.len() == self.identity.len() {
            Ok(())
        } else {
            Err(format!(
                "kind '{}' expects identity [{}], got {} segment(s)",
                self.kind,
                self.identity.join(", "),
                identity.len()
            ))
        }
    }
}
