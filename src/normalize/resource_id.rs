//! Fully-qualified resource IDs.
//!
//! Resource IDs have the form
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`,
//! optionally followed by `/{childType}/{childName}` pairs. Comparisons are
//! case-insensitive.

use serde_json::Value;

/// A parsed resource ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    /// Subscription ID.
    pub subscription: String,
    /// Resource group name, absent for subscription-scoped IDs.
    pub resource_group: Option<String>,
    /// Provider namespace, e.g. `Microsoft.Network`.
    pub namespace: Option<String>,
    /// `(type, name)` pairs from outermost to leaf.
    pub segments: Vec<(String, String)>,
}

impl ResourceId {
    /// Parses a fully-qualified ID. Returns `None` for anything malformed.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let parts: Vec<&str> = id.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 || !parts[0].eq_ignore_ascii_case("subscriptions") {
            return None;
        }
        let subscription = parts[1].to_string();
        let mut rest = &parts[2..];

        let mut resource_group = None;
        if rest.len() >= 2 && rest[0].eq_ignore_ascii_case("resourceGroups") {
            resource_group = Some(rest[1].to_string());
            rest = &rest[2..];
        }

        if rest.is_empty() {
            return Some(Self {
                subscription,
                resource_group,
                namespace: None,
                segments: Vec::new(),
            });
        }

        if rest.len() < 4 || !rest[0].eq_ignore_ascii_case("providers") || (rest.len() - 2) % 2 != 0 {
            return None;
        }
        let namespace = Some(rest[1].to_string());
        let segments = rest[2..]
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Some(Self {
            subscription,
            resource_group,
            namespace,
            segments,
        })
    }

    /// Returns the full resource type, e.g. `Microsoft.Network/virtualNetworks/subnets`.
    #[must_use]
    pub fn resource_type(&self) -> String {
        match &self.namespace {
            Some(namespace) => {
                let mut parts = vec![namespace.as_str()];
                parts.extend(self.segments.iter().map(|(t, _)| t.as_str()));
                parts.join("/")
            }
            None if self.resource_group.is_some() => "Microsoft.Resources/resourceGroups".to_string(),
            None => "Microsoft.Resources/subscriptions".to_string(),
        }
    }

    /// Returns the leaf name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .or(self.resource_group.as_deref())
            .unwrap_or(&self.subscription)
    }
}

/// Builds the ID of a resource group.
#[must_use]
pub fn resource_group_id(subscription: &str, resource_group: &str) -> String {
    format!("/subscriptions/{subscription}/resourceGroups/{resource_group}")
}

/// Builds a fully-qualified resource ID.
///
/// `resource_type` is `{namespace}/{type}[/{childType}...]` and `names` holds one
/// name per type segment. Returns `None` when the counts do not line up.
#[must_use]
pub fn format_resource_id(
    subscription: &str,
    resource_group: &str,
    resource_type: &str,
    names: &[&str],
) -> Option<String> {
    let mut type_parts = resource_type.split('/');
    let namespace = type_parts.next()?;
    let types: Vec<&str> = type_parts.collect();
    if types.is_empty() || types.len() != names.len() {
        return None;
    }

    let mut id = format!(
        "{}/providers/{namespace}",
        resource_group_id(subscription, resource_group)
    );
    for (t, name) in types.iter().zip(names) {
        id.push('/');
        id.push_str(t);
        id.push('/');
        id.push_str(name);
    }
    Some(id)
}

/// Returns true if `value` looks like a fully-qualified resource ID.
#[must_use]
pub fn is_resource_id(value: &str) -> bool {
    value.starts_with('/') && ResourceId::parse(value).is_some()
}

/// Case-folded comparison key for a resource ID.
#[must_use]
pub fn resource_id_key(value: &str) -> String {
    value.trim().trim_end_matches('/').to_lowercase()
}

/// Expands a resource reference into a fully-qualified ID.
///
/// Accepts a full ID (returned unchanged), a short name (`"vnet1"`, or
/// `"vnet1/subnet1"` for child types), or a mapping with `name` and optional
/// `resource_group` and `subscription_id`. Missing scope falls back to
/// `subscription` and `resource_group`.
///
/// # Errors
///
/// Returns a message describing why the reference cannot be expanded.
pub fn expand_reference(
    value: &Value,
    resource_type: &str,
    subscription: Option<&str>,
    resource_group: Option<&str>,
) -> std::result::Result<String, String> {
    let (name, rg, sub) = match value {
        Value::String(s) if is_resource_id(s) => return Ok(s.clone()),
        Value::String(s) => (s.as_str(), resource_group, subscription),
        Value::Object(map) => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| "reference mapping requires a string 'name'".to_string())?;
            let rg = map
                .get("resource_group")
                .and_then(Value::as_str)
                .or(resource_group);
            let sub = map
                .get("subscription_id")
                .and_then(Value::as_str)
                .or(subscription);
            (name, rg, sub)
        }
        other => return Err(format!("cannot expand {other} into a resource ID")),
    };

    let sub = sub.ok_or_else(|| format!("no subscription available to expand '{name}'"))?;
    let rg = rg.ok_or_else(|| format!("no resource group available to expand '{name}'"))?;
    let names: Vec<&str> = name.split('/').collect();

    format_resource_id(sub, rg, resource_type, &names)
        .ok_or_else(|| format!("'{name}' does not match resource type {resource_type}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VNET: &str = "Microsoft.Network/virtualNetworks";

    #[test]
    fn test_format_and_parse() {
        let id = format_resource_id("sub", "rg", VNET, &["vnet1"]).unwrap();
        assert_eq!(
            id,
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1"
        );

        let parsed = ResourceId::parse(&id).unwrap();
        assert_eq!(parsed.subscription, "sub");
        assert_eq!(parsed.resource_group.as_deref(), Some("rg"));
        assert_eq!(parsed.resource_type(), VNET);
        assert_eq!(parsed.name(), "vnet1");
    }

    #[test]
    fn test_child_resource_id() {
        let id = format_resource_id(
            "sub",
            "rg",
            "Microsoft.Network/virtualNetworks/subnets",
            &["vnet1", "default"],
        )
        .unwrap();
        assert!(id.ends_with("/virtualNetworks/vnet1/subnets/default"));
        assert_eq!(ResourceId::parse(&id).unwrap().name(), "default");

        assert!(format_resource_id("sub", "rg", VNET, &["a", "b"]).is_none());
    }

    #[test]
    fn test_resource_group_id_parses() {
        let parsed = ResourceId::parse(&resource_group_id("sub", "rg")).unwrap();
        assert_eq!(parsed.resource_type(), "Microsoft.Resources/resourceGroups");
        assert_eq!(parsed.name(), "rg");
    }

    #[test]
    fn test_reject_malformed() {
        assert!(ResourceId::parse("vnet1").is_none());
        assert!(ResourceId::parse("/subscriptions/sub/resourceGroups/rg/providers/X").is_none());
        assert!(!is_resource_id("vnet1"));
    }

    #[test]
    fn test_expand_short_name() {
        let id = expand_reference(&json!("vnet1"), VNET, Some("sub"), Some("rg")).unwrap();
        assert!(id.ends_with("/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1"));
    }

    #[test]
    fn test_expand_mapping_overrides_scope() {
        let id = expand_reference(
            &json!({"name": "vnet1", "resource_group": "other"}),
            VNET,
            Some("sub"),
            Some("rg"),
        )
        .unwrap();
        assert!(id.contains("/resourceGroups/other/"));
    }

    #[test]
    fn test_expand_keeps_full_id() {
        let full = "/subscriptions/s/resourceGroups/r/providers/Microsoft.Network/virtualNetworks/v";
        assert_eq!(
            expand_reference(&json!(full), VNET, Some("sub"), Some("rg")).unwrap(),
            full
        );
    }

    #[test]
    fn test_expand_without_scope_fails() {
        assert!(expand_reference(&json!("vnet1"), VNET, None, Some("rg")).is_err());
        assert!(expand_reference(&json!(5), VNET, Some("s"), Some("rg")).is_err());
    }

    #[test]
    fn test_id_key_is_case_insensitive() {
        assert_eq!(
            resource_id_key("/subscriptions/S/resourceGroups/RG/"),
            resource_id_key("/subscriptions/s/resourcegroups/rg")
        );
    }
}
