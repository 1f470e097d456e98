//! Case conversion between the user's snake_case vocabulary and provider
//! wire names.

use serde::{Deserialize, Serialize};

/// Case policy for enum-like string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumCase {
    /// `camelCase`, lowercase leader.
    Camel,
    /// `PascalCase`.
    Pascal,
}

impl EnumCase {
    /// Applies this policy to a snake_case value.
    #[must_use]
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Camel => to_camel_case(value),
            Self::Pascal => to_pascal_case(value),
        }
    }
}

/// Converts `snake_case` to `camelCase`.
///
/// Characters after the first of each segment are kept as written, so
/// already-cased values (`StandardLRS`) survive untouched apart from the leader.
#[must_use]
pub fn to_camel_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (index, segment) in value.split('_').enumerate() {
        if index == 0 {
            out.push_str(&lower_first(segment));
        } else if segment.is_empty() {
            out.push('_');
        } else {
            out.push_str(&upper_first(segment));
        }
    }
    out
}

/// Converts `snake_case` to `PascalCase`.
#[must_use]
pub fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .map(|segment| {
            if segment.is_empty() {
                "_".to_string()
            } else {
                upper_first(segment)
            }
        })
        .collect()
}

/// Converts `camelCase` or `PascalCase` to `snake_case`.
///
/// Runs of capitals are treated as one word (`publicIPAddress` becomes
/// `public_ip_address`).
#[must_use]
pub fn to_snake_case(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn upper_first(segment: &str) -> String {
    let mut chars = segment.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn lower_first(segment: &str) -> String {
    let mut chars = segment.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("zone_type"), "zoneType");
        assert_eq!(to_camel_case("registration_virtual_networks"), "registrationVirtualNetworks");
        assert_eq!(to_camel_case("location"), "location");
        assert_eq!(to_camel_case("Public"), "public");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("public"), "Public");
        assert_eq!(to_pascal_case("private"), "Private");
        assert_eq!(to_pascal_case("hot_tier"), "HotTier");
        assert_eq!(to_pascal_case("StandardLRS"), "StandardLRS");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("zoneType"), "zone_type");
        assert_eq!(to_snake_case("publicIPAllocationMethod"), "public_ip_allocation_method");
        assert_eq!(to_snake_case("addressPrefixes"), "address_prefixes");
        assert_eq!(to_snake_case("name"), "name");
        assert_eq!(to_snake_case("ipv4Address"), "ipv4_address");
    }

    #[test]
    fn test_enum_case_policy() {
        assert_eq!(EnumCase::Pascal.apply("public"), "Public");
        assert_eq!(EnumCase::Camel.apply("tcp_only"), "tcpOnly");
    }
}
