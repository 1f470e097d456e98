use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::*;
use crate::adapter::{ArmAdapter, ResourceSchema, catalog};
use crate::cloud::{LocalCloud, PutMode};
use crate::error::ErrorKind;
use crate::operation::{OperationFailure, OperationOutcome};
use crate::testing::{ScriptedCloud, zone_identity};

fn options() -> ReconcileOptions {
    ReconcileOptions::default()
        .with_poll_interval(Duration::from_millis(1))
        .with_delete_lag(Duration::from_millis(500), Duration::from_millis(1))
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn zone(desired: Value) -> Request {
    Request::present("dns-zone", zone_identity("z1"), object(desired))
}

async fn run(cloud: &ScriptedCloud, registry: &AdapterRegistry, request: &Request) -> Verdict {
    Reconciler::new(registry, cloud)
        .with_options(options())
        .reconcile(request)
        .await
}

struct BrokenProjection(ArmAdapter);

#[async_trait]
impl ResourceAdapter for BrokenProjection {
    fn schema(&self) -> &ResourceSchema {
        self.0.schema()
    }

    async fn read(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<Value>> {
        self.0.read(client, identity).await
    }

    async fn create(
        &self,
        client: &dyn CloudClient,
        identity: &Identity,
        desired: &Map<String, Value>,
    ) -> Result<OperationOutcome> {
        self.0.create(client, identity, desired).await
    }

    async fn delete(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<OperationOutcome>> {
        self.0.delete(client, identity).await
    }

    fn project(&self, _observed: &Value) -> Result<Value> {
        Err(ConvergeError::internal("projection exploded"))
    }
}

/// Implements only the required adapter methods.
struct CreateOnly(ArmAdapter);

#[async_trait]
impl ResourceAdapter for CreateOnly {
    fn schema(&self) -> &ResourceSchema {
        self.0.schema()
    }

    async fn read(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<Value>> {
        self.0.read(client, identity).await
    }

    async fn create(
        &self,
        client: &dyn CloudClient,
        identity: &Identity,
        desired: &Map<String, Value>,
    ) -> Result<OperationOutcome> {
        self.0.create(client, identity, desired).await
    }

    async fn delete(&self, client: &dyn CloudClient, identity: &Identity) -> Result<Option<OperationOutcome>> {
        self.0.delete(client, identity).await
    }

    fn project(&self, observed: &Value) -> Result<Value> {
        self.0.project(observed)
    }
}

#[tokio::test]
async fn test_create_new_zone_with_canonical_location() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let verdict = run(&cloud, &registry, &zone(json!({"location": " EastUS ", "zone_type": "public"}))).await;

    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Create);
    assert!(verdict.changed);
    assert!(verdict.divergence.is_none());
    assert_eq!(
        verdict.identity,
        "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Network/dnsZones/z1"
    );

    let stored = cloud.stored(&catalog::dns_zone(), &zone_identity("z1")).unwrap();
    assert_eq!(stored["location"], json!("eastus"));
    assert_eq!(stored["properties"]["zoneType"], json!("Public"));

    let projection = verdict.projection.unwrap();
    assert_eq!(projection["location"], json!("eastus"));
    assert_eq!(projection["zone_type"], json!("Public"));
    assert_eq!(cloud.puts(), 1);
}

#[tokio::test]
async fn test_equal_state_is_a_noop() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.seed(
        &catalog::dns_zone(),
        &zone_identity("z1"),
        json!({"location": "eastus", "zoneType": "Public", "registrationVirtualNetworks": []}),
    );

    let verdict = run(&cloud, &registry, &zone(json!({"location": " EastUS ", "zone_type": "public"}))).await;
    assert_eq!(verdict.action, Action::None);
    assert!(!verdict.changed);
    assert!(verdict.projection.is_some());
    assert_eq!(cloud.mutations(), 0);
    assert_eq!(cloud.reads(), 1);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let request = zone(json!({"location": "westeurope", "zone_type": "private", "tags": {"env": "dev"}}));

    let first = run(&cloud, &registry, &request).await;
    let second = run(&cloud, &registry, &request).await;

    assert!(first.changed);
    assert_eq!(first.action, Action::Create);
    assert!(!second.changed);
    assert_eq!(second.action, Action::None);
    assert_eq!(first.projection, second.projection);
    assert_eq!(cloud.puts(), 1);
}

#[tokio::test]
async fn test_scalar_divergence_updates() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let adapter = catalog::storage_account();
    let identity = zone_identity("acct1");
    cloud.seed(
        &adapter,
        &identity,
        json!({"location": "eastus", "kind": "StorageV2", "sku": {"name": "Basic"}}),
    );

    let request = Request::present(
        "storage-account",
        identity.clone(),
        object(json!({"location": "eastus", "kind": "StorageV2", "sku": {"name": "Standard"}})),
    );
    let verdict = run(&cloud, &registry, &request).await;

    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Update);
    assert!(verdict.changed);
    let divergence = verdict.divergence.unwrap();
    assert_eq!(divergence.path, "/sku/name");
    assert_eq!(divergence.old, json!("Basic"));
    assert_eq!(divergence.new, json!("Standard"));
    assert_eq!(verdict.projection.unwrap()["sku"]["name"], json!("Standard"));
    assert_eq!(cloud.patches(), 1);
    assert_eq!(cloud.puts(), 0);
    assert_eq!(cloud.reads(), 2);
}

#[tokio::test]
async fn test_keyed_rule_reorder_is_a_noop() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let rule = |name: &str, priority: u32, protocol: &str| {
        json!({
            "name": name,
            "properties": {"priority": priority, "protocol": protocol, "access": "Allow", "direction": "Inbound"}
        })
    };
    cloud.seed(
        &catalog::network_security_group(),
        &zone_identity("nsg1"),
        json!({"location": "eastus", "securityRules": [rule("b", 200, "Udp"), rule("a", 100, "Tcp")]}),
    );

    let request = Request::present(
        "network-security-group",
        zone_identity("nsg1"),
        object(json!({
            "location": "eastus",
            "security_rules": [
                {"name": "a", "properties": {"priority": 100, "protocol": "tcp", "access": "allow", "direction": "inbound"}},
                {"name": "b", "properties": {"priority": 200, "protocol": "udp", "access": "allow", "direction": "inbound"}}
            ]
        })),
    );
    let verdict = run(&cloud, &registry, &request).await;
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::None);
    assert!(!verdict.changed);
}

#[tokio::test]
async fn test_async_create_polls_to_completion() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.set_pending_polls(2);

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus"}))).await;

    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Create);
    assert!(verdict.changed);
    assert!(verdict.projection.is_some());
    assert_eq!(cloud.puts(), 1);
    assert!(cloud.polls() >= 2);
    assert_eq!(cloud.reads(), 2);
}

#[tokio::test]
async fn test_delete_tolerates_provider_lag() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.seed(&catalog::dns_zone(), &zone_identity("z1"), json!({"location": "eastus"}));
    cloud.set_lag_reads(2);

    let request = Request::absent("dns-zone", zone_identity("z1"));
    let verdict = run(&cloud, &registry, &request).await;
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Delete);
    assert!(verdict.changed);
    assert!(verdict.projection.is_none());

    let again = run(&cloud, &registry, &request).await;
    assert_eq!(again.action, Action::None);
    assert!(!again.changed);
    assert_eq!(cloud.deletes(), 1);
}

#[tokio::test]
async fn test_absent_resource_stays_absent() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let request = Request::absent("dns-zone", zone_identity("z1"));

    for _ in 0..2 {
        let verdict = run(&cloud, &registry, &request).await;
        assert_eq!(verdict.action, Action::None);
        assert!(!verdict.changed);
        assert!(verdict.projection.is_none());
    }
    assert_eq!(cloud.mutations(), 0);
}

async fn assert_dry_run_matches(seed: Option<Value>, request: Request) {
    let registry = AdapterRegistry::builtin();
    let adapter = catalog::dns_zone();

    let dry_cloud = ScriptedCloud::new();
    let real_cloud = ScriptedCloud::new();
    if let Some(seed) = seed {
        dry_cloud.seed(&adapter, &request.identity, seed.clone());
        real_cloud.seed(&adapter, &request.identity, seed);
    }

    let dry = run(&dry_cloud, &registry, &request.clone().with_dry_run(true)).await;
    let real = run(&real_cloud, &registry, &request).await;

    assert!(dry.is_success(), "{dry}");
    assert_eq!(dry.action, real.action);
    assert_eq!(dry.changed, real.changed);
    assert_eq!(dry_cloud.mutations(), 0);
    assert!(dry_cloud.reads() <= 1);
}

#[tokio::test]
async fn test_dry_run_predicts_without_mutating() {
    let existing = json!({"location": "eastus", "zoneType": "Public"});

    assert_dry_run_matches(None, zone(json!({"location": "eastus"}))).await;
    assert_dry_run_matches(Some(existing.clone()), zone(json!({"location": "eastus"}))).await;
    assert_dry_run_matches(Some(existing.clone()), zone(json!({"location": "eastus", "zone_type": "private"}))).await;
    assert_dry_run_matches(
        Some(existing.clone()),
        zone(json!({"location": "eastus", "zone_type": "private"})).with_force_update(true),
    )
    .await;
    assert_dry_run_matches(Some(existing), Request::absent("dns-zone", zone_identity("z1"))).await;
    assert_dry_run_matches(None, Request::absent("dns-zone", zone_identity("z1"))).await;
}

#[tokio::test]
async fn test_dry_run_projects_existing_state() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.seed(&catalog::dns_zone(), &zone_identity("z1"), json!({"location": "eastus"}));

    let request = zone(json!({"location": "westus"})).with_dry_run(true);
    let verdict = run(&cloud, &registry, &request).await;
    assert_eq!(verdict.action, Action::Update);
    assert!(verdict.changed);
    assert_eq!(verdict.projection.unwrap()["location"], json!("eastus"));
    assert_eq!(verdict.divergence.unwrap().path, "/location");
}

#[tokio::test]
async fn test_null_desired_values_are_unspecified() {
    let registry = AdapterRegistry::builtin();
    for seeded in [false, true] {
        let with_nulls = ScriptedCloud::new();
        let without = ScriptedCloud::new();
        if seeded {
            let body = json!({"location": "eastus", "zoneType": "Private"});
            with_nulls.seed(&catalog::dns_zone(), &zone_identity("z1"), body.clone());
            without.seed(&catalog::dns_zone(), &zone_identity("z1"), body);
        }

        let a = run(
            &with_nulls,
            &registry,
            &zone(json!({"location": "eastus", "zone_type": null, "tags": null})),
        )
        .await;
        let b = run(&without, &registry, &zone(json!({"location": "eastus"}))).await;
        assert_eq!(a.action, b.action);
        assert_eq!(a.changed, b.changed);
        assert_eq!(a.divergence, b.divergence);
    }
}

#[tokio::test]
async fn test_force_update_recreates() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.seed(&catalog::dns_zone(), &zone_identity("z1"), json!({"location": "eastus", "zoneType": "Public"}));

    let request = zone(json!({"location": "eastus", "zone_type": "private"})).with_force_update(true);
    let verdict = run(&cloud, &registry, &request).await;

    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Recreate);
    assert!(verdict.changed);
    assert_eq!(verdict.divergence.unwrap().path, "/zoneType");
    assert_eq!(cloud.deletes(), 1);
    assert_eq!(cloud.puts(), 1);
    assert_eq!(verdict.projection.unwrap()["zone_type"], json!("Private"));
}

#[tokio::test]
async fn test_divergence_updates_without_force() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.seed(&catalog::dns_zone(), &zone_identity("z1"), json!({"location": "eastus", "zoneType": "Public"}));

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus", "zone_type": "private"}))).await;
    assert_eq!(verdict.action, Action::Update);
    assert_eq!(cloud.deletes(), 0);
    assert_eq!(cloud.puts(), 1);
}

#[tokio::test]
async fn test_adapter_without_update_recreates() {
    let cloud = ScriptedCloud::new();
    let mut registry = AdapterRegistry::builtin();
    registry.register("dns-zone", Arc::new(catalog::dns_zone().without_update()));
    cloud.seed(&catalog::dns_zone(), &zone_identity("z1"), json!({"location": "eastus", "zoneType": "Public"}));

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus", "zone_type": "private"}))).await;
    assert_eq!(verdict.action, Action::Recreate);
    assert_eq!(cloud.deletes(), 1);
}

#[tokio::test]
async fn test_adapter_without_update_method_recreates() {
    let cloud = ScriptedCloud::new();
    let mut registry = AdapterRegistry::builtin();
    registry.register("dns-zone", Arc::new(CreateOnly(catalog::dns_zone())));
    cloud.seed(&catalog::dns_zone(), &zone_identity("z1"), json!({"location": "eastus", "zoneType": "Public"}));

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus", "zone_type": "private"}))).await;
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Recreate);
    assert!(verdict.changed);
    assert_eq!(cloud.deletes(), 1);
    assert_eq!(cloud.puts(), 1);
}

#[tokio::test]
async fn test_lost_create_race_rereads_once() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.lose_create_race(1, Some(json!({"location": "eastus", "properties": {"zoneType": "Public"}})));

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus", "zone_type": "public"}))).await;
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::None);
    assert!(!verdict.changed);
    assert_eq!(cloud.puts(), 1);
    assert_eq!(cloud.reads(), 2);
}

#[tokio::test]
async fn test_second_conflict_is_surfaced() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.lose_create_race(2, None);

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus"}))).await;
    assert_eq!(verdict.error.unwrap().kind, ErrorKind::Conflict);
    assert_eq!(verdict.action, Action::Create);
    assert!(!verdict.changed);
    assert_eq!(cloud.puts(), 2);
}

#[tokio::test]
async fn test_unavailable_read_prevents_mutation() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.fail_reads("connection reset");

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus"}))).await;
    assert_eq!(verdict.error.unwrap().kind, ErrorKind::ProviderUnavailable);
    assert!(!verdict.changed);
    assert_eq!(cloud.mutations(), 0);
}

#[tokio::test]
async fn test_failed_operation_is_surfaced_with_details() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.fail_operations(OperationFailure {
        code: Some("QuotaExceeded".to_string()),
        message: "quota exceeded".to_string(),
        details: None,
    });

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus"}))).await;
    assert!(verdict.changed);
    assert_eq!(verdict.action, Action::Create);
    assert!(verdict.projection.is_none());
    let error = verdict.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ProviderOperationFailed);
    assert_eq!(error.details, Some(json!({"code": "QuotaExceeded"})));
    assert_eq!(cloud.deletes(), 0);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let (handle, signal) = CancelSignal::pair();
    handle.cancel();

    let verdict = Reconciler::new(&registry, &cloud)
        .with_cancel(signal)
        .reconcile(&zone(json!({"location": "eastus"})))
        .await;
    assert!(verdict.is_canceled());
    assert_eq!(verdict.error.unwrap().kind, ErrorKind::Canceled);
    assert!(!verdict.changed);
    assert_eq!(cloud.reads(), 0);
}

#[tokio::test]
async fn test_cancel_while_polling_reports_mutation() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.set_pending_polls(u32::MAX);
    let (handle, signal) = CancelSignal::pair();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    let verdict = Reconciler::new(&registry, &cloud)
        .with_options(options())
        .with_cancel(signal)
        .reconcile(&zone(json!({"location": "eastus"})))
        .await;
    assert!(verdict.is_canceled());
    assert!(verdict.changed);
    assert_eq!(verdict.action, Action::Create);
    assert!(verdict.projection.is_none());
}

#[tokio::test]
async fn test_mutation_timeout_behaves_like_cancellation() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    cloud.set_pending_polls(u32::MAX);

    let verdict = Reconciler::new(&registry, &cloud)
        .with_options(options().with_mutate_timeout(Duration::from_millis(30)))
        .reconcile(&zone(json!({"location": "eastus"})))
        .await;
    assert!(verdict.is_canceled());
    assert_eq!(verdict.error.unwrap().kind, ErrorKind::Timeout);
    assert!(verdict.changed);
}

#[tokio::test]
async fn test_projection_failure_is_internal_and_keeps_changed() {
    let cloud = ScriptedCloud::new();
    let mut registry = AdapterRegistry::new();
    registry.register("dns-zone", Arc::new(BrokenProjection(catalog::dns_zone())));

    let verdict = run(&cloud, &registry, &zone(json!({"location": "eastus"}))).await;
    assert!(verdict.changed);
    assert_eq!(verdict.action, Action::Create);
    assert_eq!(verdict.error.unwrap().kind, ErrorKind::InternalError);
    assert!(cloud.stored(&catalog::dns_zone(), &zone_identity("z1")).is_some());
}

#[tokio::test]
async fn test_invalid_requests_touch_nothing() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();

    let unknown = Request::present("nope", zone_identity("z1"), Map::new());
    let short = Request::present("dns-zone", Identity::new(["sub-1", "z1"]), object(json!({"location": "eastus"})));
    let no_location = zone(json!({"zone_type": "public"}));

    for request in [unknown, short, no_location] {
        let verdict = run(&cloud, &registry, &request).await;
        assert_eq!(verdict.error.unwrap().kind, ErrorKind::InvalidArgument);
        assert!(!verdict.changed);
    }
    assert_eq!(cloud.reads(), 0);
    assert_eq!(cloud.mutations(), 0);
}

#[tokio::test]
async fn test_default_location_fills_missing_location() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let request = zone(json!({})).with_default_location("West Europe");

    let verdict = run(&cloud, &registry, &request).await;
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.projection.unwrap()["location"], json!("westeurope"));
}

#[tokio::test]
async fn test_resource_group_location_becomes_default() {
    let temp = tempfile::TempDir::new().unwrap();
    let cloud = LocalCloud::with_base_dir(temp.path());
    let registry = AdapterRegistry::builtin();
    let group = catalog::resource_group()
        .address(&Identity::new(["sub-1", "rg-1"]))
        .unwrap();
    cloud
        .put_resource(&group, &json!({"location": "West Europe"}), PutMode::Upsert)
        .await
        .unwrap();

    let mut request = zone(json!({"zone_type": "private"}));
    assert!(fill_default_location(&mut request, &registry, &cloud).await.unwrap());
    assert_eq!(request.defaults.location.as_deref(), Some("West Europe"));

    let verdict = Reconciler::new(&registry, &cloud)
        .with_options(options())
        .reconcile(&request)
        .await;
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.action, Action::Create);
    assert_eq!(verdict.projection.unwrap()["location"], json!("westeurope"));
}

#[tokio::test]
async fn test_explicit_location_skips_group_lookup() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();

    let mut explicit = zone(json!({"location": "eastus"}));
    assert!(!fill_default_location(&mut explicit, &registry, &cloud).await.unwrap());
    assert!(explicit.defaults.location.is_none());

    let mut absent = Request::absent("dns-zone", zone_identity("z1"));
    assert!(!fill_default_location(&mut absent, &registry, &cloud).await.unwrap());

    let mut preset = zone(json!({})).with_default_location("eastus");
    assert!(!fill_default_location(&mut preset, &registry, &cloud).await.unwrap());
    assert_eq!(preset.defaults.location.as_deref(), Some("eastus"));

    let mut missing = zone(json!({}));
    assert!(fill_default_location(&mut missing, &registry, &cloud).await.unwrap());
    assert_eq!(missing.defaults.location.as_deref(), Some("westeurope"));
}

#[tokio::test]
async fn test_free_function_uses_defaults() {
    let cloud = ScriptedCloud::new();
    let registry = AdapterRegistry::builtin();
    let verdict = reconcile(&zone(json!({"location": "eastus"})), &cloud, &registry).await;
    assert_eq!(verdict.action, Action::Create);
}
