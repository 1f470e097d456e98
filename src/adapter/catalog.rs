//! Built-in resource kinds.

use super::arm::{AddressScope, ArmAdapter, UpdateMethod};
use super::schema::{FieldDescriptor, FieldType, ResourceSchema};
use crate::normalize::EnumCase;

const GROUP_IDENTITY: &[&str] = &["subscription", "resource_group", "name"];

const VIRTUAL_NETWORKS: &str = "Microsoft.Network/virtualNetworks";
const NETWORK_SECURITY_GROUPS: &str = "Microsoft.Network/networkSecurityGroups";

fn location() -> FieldDescriptor {
    FieldDescriptor::string("location").required()
}

fn tags() -> FieldDescriptor {
    FieldDescriptor::map("tags")
}

/// Resource groups.
#[must_use]
pub fn resource_group() -> ArmAdapter {
    ArmAdapter::new(
        ResourceSchema::new("resource-group", &["subscription", "name"], vec![location(), tags()]),
        "Microsoft.Resources/resourceGroups",
        "2021-04-01",
    )
    .scoped(AddressScope::Subscription)
}

/// DNS zones, public or private.
#[must_use]
pub fn dns_zone() -> ArmAdapter {
    ArmAdapter::new(
        ResourceSchema::new(
            "dns-zone",
            GROUP_IDENTITY,
            vec![
                location(),
                tags(),
                FieldDescriptor::string("zone_type").enum_case(EnumCase::Pascal),
                FieldDescriptor::list("registration_virtual_networks", FieldType::String)
                    .resource_id(VIRTUAL_NETWORKS),
                FieldDescriptor::list("resolution_virtual_networks", FieldType::String)
                    .resource_id(VIRTUAL_NETWORKS),
            ],
        ),
        "Microsoft.Network/dnsZones",
        "2018-05-01",
    )
    .with_sub_resource_lists(&["registrationVirtualNetworks", "resolutionVirtualNetworks"])
}

/// Virtual networks.
#[must_use]
pub fn virtual_network() -> ArmAdapter {
    ArmAdapter::new(
        ResourceSchema::new(
            "virtual-network",
            GROUP_IDENTITY,
            vec![
                location(),
                tags(),
                FieldDescriptor::object(
                    "address_space",
                    vec![FieldDescriptor::list("address_prefixes", FieldType::String).required()],
                )
                .required(),
                FieldDescriptor::object(
                    "dhcp_options",
                    vec![FieldDescriptor::list("dns_servers", FieldType::String)],
                ),
                FieldDescriptor::boolean("enable_ddos_protection"),
            ],
        ),
        VIRTUAL_NETWORKS,
        "2023-09-01",
    )
}

/// Subnets of a virtual network.
#[must_use]
pub fn subnet() -> ArmAdapter {
    ArmAdapter::new(
        ResourceSchema::new(
            "subnet",
            &["subscription", "resource_group", "virtual_network", "name"],
            vec![
                FieldDescriptor::string("address_prefix"),
                FieldDescriptor::list("address_prefixes", FieldType::String),
                FieldDescriptor::object(
                    "network_security_group",
                    vec![FieldDescriptor::string("id").resource_id(NETWORK_SECURITY_GROUPS)],
                ),
                FieldDescriptor::string("private_endpoint_network_policies").enum_case(EnumCase::Pascal),
            ],
        ),
        "Microsoft.Network/virtualNetworks/subnets",
        "2023-09-01",
    )
}

/// Network security groups with inline rules.
#[must_use]
pub fn network_security_group() -> ArmAdapter {
    let rule_properties = vec![
        FieldDescriptor::integer("priority").required(),
        FieldDescriptor::string("protocol").required().enum_case(EnumCase::Pascal),
        FieldDescriptor::string("access").required().enum_case(EnumCase::Pascal),
        FieldDescriptor::string("direction").required().enum_case(EnumCase::Pascal),
        FieldDescriptor::string("source_address_prefix"),
        FieldDescriptor::string("source_port_range"),
        FieldDescriptor::string("destination_address_prefix"),
        FieldDescriptor::string("destination_port_range"),
        FieldDescriptor::string("description"),
    ];
    let rule = FieldType::Object(vec![
        FieldDescriptor::string("name").required(),
        FieldDescriptor::object("properties", rule_properties).required(),
    ]);

    ArmAdapter::new(
        ResourceSchema::new(
            "network-security-group",
            GROUP_IDENTITY,
            vec![location(), tags(), FieldDescriptor::list("security_rules", rule)],
        ),
        NETWORK_SECURITY_GROUPS,
        "2023-09-01",
    )
}

/// Public IP addresses. The allocation method and SKU cannot change in
/// place on most SKUs, so divergence recreates.
#[must_use]
pub fn public_ip_address() -> ArmAdapter {
    ArmAdapter::new(
        ResourceSchema::new(
            "public-ip-address",
            GROUP_IDENTITY,
            vec![
                location(),
                tags(),
                FieldDescriptor::object(
                    "sku",
                    vec![
                        FieldDescriptor::string("name").enum_case(EnumCase::Pascal),
                        FieldDescriptor::string("tier").enum_case(EnumCase::Pascal),
                    ],
                ),
                FieldDescriptor::string("public_ip_allocation_method")
                    .wire_name("publicIPAllocationMethod")
                    .enum_case(EnumCase::Pascal),
                FieldDescriptor::string("public_ip_address_version")
                    .wire_name("publicIPAddressVersion")
                    .enum_case(EnumCase::Pascal),
                FieldDescriptor::integer("idle_timeout_in_minutes"),
                FieldDescriptor::object("dns_settings", vec![FieldDescriptor::string("domain_name_label")]),
                FieldDescriptor::list("zones", FieldType::String),
            ],
        ),
        "Microsoft.Network/publicIPAddresses",
        "2023-09-01",
    )
    .without_update()
}

/// Storage accounts, updated with PATCH.
#[must_use]
pub fn storage_account() -> ArmAdapter {
    ArmAdapter::new(
        ResourceSchema::new(
            "storage-account",
            GROUP_IDENTITY,
            vec![
                location(),
                tags(),
                FieldDescriptor::object("sku", vec![FieldDescriptor::string("name").required()]).required(),
                FieldDescriptor::string("kind").required(),
                FieldDescriptor::string("access_tier").enum_case(EnumCase::Pascal),
                FieldDescriptor::boolean("https_only").wire_name("supportsHttpsTrafficOnly"),
                FieldDescriptor::string("minimum_tls_version"),
                FieldDescriptor::boolean("allow_blob_public_access"),
            ],
        ),
        "Microsoft.Storage/storageAccounts",
        "2023-01-01",
    )
    .with_update_method(UpdateMethod::Patch)
    .with_projection(&[
        "location",
        "tags",
        "sku",
        "kind",
        "accessTier",
        "supportsHttpsTrafficOnly",
        "minimumTlsVersion",
        "allowBlobPublicAccess",
        "primaryEndpoints",
        "provisioningState",
    ])
}

/// Every built-in kind.
#[must_use]
pub fn all() -> Vec<ArmAdapter> {
    vec![
        resource_group(),
        dns_zone(),
        virtual_network(),
        subnet(),
        network_security_group(),
        public_ip_address(),
        storage_account(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ResourceAdapter;
    use crate::request::Identity;
    use std::collections::HashSet;

    #[test]
    fn test_kinds_are_unique() {
        let kinds: HashSet<String> = all().iter().map(|a| a.schema().kind.clone()).collect();
        assert_eq!(kinds.len(), all().len());
    }

    #[test]
    fn test_every_kind_addresses_its_identity() {
        for adapter in all() {
            let segments: Vec<String> = adapter
                .schema()
                .identity
                .iter()
                .map(|s| format!("{s}-x"))
                .collect();
            let address = adapter.address(&Identity::new(segments)).unwrap();
            assert!(address.id.starts_with("/subscriptions/subscription-x/resourceGroups/"));
        }
    }

    #[test]
    fn test_subnet_address() {
        let address = subnet()
            .address(&Identity::new(["s", "rg", "vnet1", "default"]))
            .unwrap();
        assert_eq!(
            address.id,
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/default"
        );
        assert!(!subnet().schema().requires_location());
    }

    #[test]
    fn test_wire_names() {
        let schema = public_ip_address().schema().clone();
        assert_eq!(
            schema.field("public_ip_allocation_method").unwrap().wire(),
            "publicIPAllocationMethod"
        );
        assert!(!public_ip_address().supports_update());
    }
}
