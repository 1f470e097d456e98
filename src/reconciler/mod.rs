//! The reconciliation state machine.
//!
//! One [`Reconciler::reconcile`] call drives one [`Request`] to one [`Verdict`]:
//!
//! ```text
//! NORMALIZE -> READ -> DECIDE -> [dry-run gate] -> MUTATE -> REREAD -> PROJECT
//! ```
//!
//! Suspension points are the adapter calls and each operation poll. All of
//! them honor the caller's cancel signal and the time budgets in
//! [`ReconcileOptions`]. The reconciler never retries a failed call; the
//! only recovery is a single re-read after a create loses a race.

mod options;

#[cfg(test)]
mod tests;

pub use options::{
    DEFAULT_DELETE_LAG_INTERVAL, DEFAULT_DELETE_LAG_TIMEOUT, DEFAULT_MUTATE_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_READ_TIMEOUT, ReconcileOptions,
};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterRegistry, RESOURCE_GROUP_SEGMENT, ResourceAdapter, SUBSCRIPTION_SEGMENT};
use crate::cloud::CloudClient;
use crate::error::{ConvergeError, ReconcileError, Result};
use crate::normalize::{LOCATION_FIELD, Normalizer};
use crate::planner::{Action, Comparator, DecisionFlags, DeleteOutcome, Divergence, MutationExecutor, decide};
use crate::request::{Identity, Intent, Request};
use crate::suspend::{CancelSignal, Phase, Suspender};
use crate::verdict::Verdict;

/// What has happened so far; survives into failed verdicts.
#[derive(Debug, Default)]
struct Progress {
    /// Selected action.
    action: Action,
    /// Whether a mutation was issued.
    changed: bool,
    /// Witness of the last decision.
    divergence: Option<Divergence>,
}

/// Drives requests to verdicts against one cloud client.
pub struct Reconciler<'a> {
    /// Adapters by kind.
    registry: &'a AdapterRegistry,
    /// Client handed to adapters.
    client: &'a dyn CloudClient,
    /// Time budgets.
    options: ReconcileOptions,
    /// Caller's cancellation signal.
    cancel: CancelSignal,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler with default budgets and no cancellation.
    #[must_use]
    pub fn new(registry: &'a AdapterRegistry, client: &'a dyn CloudClient) -> Self {
        Self {
            registry,
            client,
            options: ReconcileOptions::default(),
            cancel: CancelSignal::never(),
        }
    }

    /// Sets the time budgets.
    #[must_use]
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the cancellation signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the time budgets.
    #[must_use]
    pub const fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconciles `request`. Failures are reported inside the verdict.
    pub async fn reconcile(&self, request: &Request) -> Verdict {
        let Some(adapter) = self.registry.get(&request.kind) else {
            let err: ConvergeError = ReconcileError::UnknownKind {
                kind: request.kind.clone(),
            }
            .into();
            return Verdict::new(request.identity.to_string(), Action::None, false).with_error(&err);
        };

        let identity = adapter.display_identity(&request.identity);
        let mut progress = Progress::default();
        debug!(
            "Reconciling {} {identity} (intent={}, dry_run={}, force_update={})",
            request.kind, request.intent, request.dry_run, request.force_update
        );

        let result = self.run(adapter.as_ref(), request, &mut progress).await;
        let verdict = Verdict::new(identity, progress.action, progress.changed)
            .with_divergence(progress.divergence.as_ref());

        match result {
            Ok(projection) => {
                info!("{verdict}");
                verdict.with_projection(projection)
            }
            Err(err) => {
                let verdict = verdict.with_error(&err);
                warn!("{verdict}");
                verdict
            }
        }
    }

    async fn run(
        &self,
        adapter: &dyn ResourceAdapter,
        request: &Request,
        progress: &mut Progress,
    ) -> Result<Option<Value>> {
        let schema = adapter.schema();
        schema
            .check_identity(&request.identity)
            .map_err(|message| ReconcileError::invalid(message, "identity"))?;

        let normalizer = Normalizer::for_request(schema, request);
        let desired = match request.intent {
            Intent::Present => normalizer.canonicalize_desired(&request.desired)?,
            Intent::Absent => Map::new(),
        };
        let comparator = Comparator::new(&normalizer);
        let flags = DecisionFlags {
            intent: request.intent,
            force_update: request.force_update,
            supports_update: adapter.supports_update(),
        };

        let suspender = Suspender::new(&self.cancel);
        let identity = &request.identity;
        let mut observed = self.read(adapter, identity, &suspender, Phase::Read).await?;
        let mut executor = MutationExecutor::new(adapter, self.client, suspender, self.options);
        let mut raced = false;

        loop {
            let plan = decide(flags, observed.as_ref(), &desired, &comparator);
            progress.action = plan.action;
            progress.divergence = plan.divergence;
            if let Some(divergence) = &progress.divergence {
                debug!("Divergence at {divergence}");
            }

            if plan.action == Action::None {
                return Self::project(adapter, observed.as_ref());
            }
            if request.dry_run {
                info!("Dry run: would {}", plan.action);
                progress.changed = true;
                if plan.action == Action::Delete {
                    return Ok(None);
                }
                return Self::project(adapter, observed.as_ref());
            }

            let result = match plan.action {
                Action::Create => executor.create(identity, &desired).await,
                Action::Update => executor.update(identity, &desired).await,
                Action::Recreate => executor.recreate(identity, &desired).await,
                Action::Delete => executor.delete(identity).await.map(|outcome| {
                    if outcome == DeleteOutcome::AlreadyAbsent {
                        progress.action = Action::None;
                    }
                    None
                }),
                Action::None => Ok(None),
            };
            progress.changed = executor.issued();

            match result {
                Err(e) if plan.action == Action::Create && e.is_conflict() && !raced => {
                    warn!("Create lost a race, re-reading: {e}");
                    raced = true;
                    observed = self.read(adapter, identity, &suspender, Phase::Read).await?;
                }
                Err(e) => return Err(e),
                Ok(result) if plan.action.rereads() => {
                    return self.finish(adapter, identity, &suspender, plan.action, result).await;
                }
                Ok(_) => return Ok(None),
            }
        }
    }

    async fn finish(
        &self,
        adapter: &dyn ResourceAdapter,
        identity: &Identity,
        suspender: &Suspender<'_>,
        action: Action,
        result: Option<Value>,
    ) -> Result<Option<Value>> {
        let observed = match self.read(adapter, identity, suspender, Phase::Reread).await? {
            Some(observed) => observed,
            None => {
                debug!("Re-read after {action} found nothing, using the operation result");
                result.ok_or_else(|| ReconcileError::VanishedAfterMutation {
                    resource: adapter.display_identity(identity),
                    action: action.to_string(),
                })?
            }
        };
        Self::project(adapter, Some(&observed))
    }

    async fn read(
        &self,
        adapter: &dyn ResourceAdapter,
        identity: &Identity,
        suspender: &Suspender<'_>,
        phase: Phase,
    ) -> Result<Option<Value>> {
        match suspender
            .run(phase, self.options.read_timeout, adapter.read(self.client, identity))
            .await
        {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    fn project(adapter: &dyn ResourceAdapter, observed: Option<&Value>) -> Result<Option<Value>> {
        observed
            .map(|observed| {
                adapter.project(observed).map_err(|e| {
                    ReconcileError::ProjectionFailed {
                        message: e.to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }
}

impl std::fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

/// Reconciles `request` with default budgets and no cancellation.
pub async fn reconcile(request: &Request, client: &dyn CloudClient, registry: &AdapterRegistry) -> Verdict {
    Reconciler::new(registry, client).reconcile(request).await
}

/// Fills `defaults.location` from the enclosing resource group when the kind
/// requires a location and the request supplies none. Returns true if a
/// location was filled in.
///
/// Requests for unknown kinds or without subscription and resource group
/// segments are left alone; validation reports them.
///
/// # Errors
///
/// Returns a provider error if the resource group lookup fails.
pub async fn fill_default_location(
    request: &mut Request,
    registry: &AdapterRegistry,
    client: &dyn CloudClient,
) -> Result<bool> {
    if request.intent == Intent::Absent
        || request.defaults.location.is_some()
        || request.desired.get(LOCATION_FIELD).is_some_and(|v| !v.is_null())
    {
        return Ok(false);
    }
    let Some(adapter) = registry.get(&request.kind) else {
        return Ok(false);
    };
    let schema = adapter.schema();
    if !schema.requires_location() {
        return Ok(false);
    }

    let (Some(subscription), Some(resource_group)) = (
        schema.identity_segment(&request.identity, SUBSCRIPTION_SEGMENT),
        schema.identity_segment(&request.identity, RESOURCE_GROUP_SEGMENT),
    ) else {
        return Ok(false);
    };

    let location = client.resource_group_location(subscription, resource_group).await?;
    debug!(
        "Resource group {resource_group} location: {}",
        location.as_deref().unwrap_or("unknown")
    );
    let filled = location.is_some();
    request.defaults.location = location;
    Ok(filled)
}
