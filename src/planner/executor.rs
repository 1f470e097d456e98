//! Mutation executor.
//!
//! Issues the adapter call for a planned action, drives the returned
//! operation to completion and, for deletes, waits out provider lag. It
//! records whether the provider accepted a mutating call so the caller can
//! report `changed` even when a later step fails.

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::ResourceAdapter;
use crate::cloud::CloudClient;
use crate::error::{ReconcileError, Result};
use crate::operation::{OperationDriver, OperationOutcome};
use crate::reconciler::ReconcileOptions;
use crate::request::Identity;
use crate::suspend::{Phase, Suspender};

/// Result of a delete step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The resource was deleted and is no longer observed.
    Deleted,
    /// The resource was already gone.
    AlreadyAbsent,
}

/// Executes mutating steps for one reconciliation.
pub struct MutationExecutor<'a> {
    /// Adapter for the resource kind.
    adapter: &'a dyn ResourceAdapter,
    /// Cloud client handed to the adapter.
    client: &'a dyn CloudClient,
    /// Suspension control.
    suspender: Suspender<'a>,
    /// Time budgets.
    options: ReconcileOptions,
    /// Whether any mutating call was accepted.
    issued: bool,
}

impl<'a> MutationExecutor<'a> {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        adapter: &'a dyn ResourceAdapter,
        client: &'a dyn CloudClient,
        suspender: Suspender<'a>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            adapter,
            client,
            suspender,
            options,
            issued: false,
        }
    }

    /// Returns true once the provider has accepted a mutating call.
    #[must_use]
    pub const fn issued(&self) -> bool {
        self.issued
    }

    const fn driver(&self) -> OperationDriver {
        OperationDriver::new(self.options.poll_interval, self.options.read_timeout)
    }

    /// Creates the resource and returns the operation result.
    ///
    /// # Errors
    ///
    /// Returns the adapter or operation error, or a cancellation/timeout error.
    pub async fn create(&mut self, identity: &Identity, desired: &Map<String, Value>) -> Result<Option<Value>> {
        let (adapter, client) = (self.adapter, self.client);
        info!("Creating {}", adapter.display_identity(identity));
        self.submit(Phase::Create, adapter.create(client, identity, desired))
            .await
    }

    /// Updates the resource in place and returns the operation result.
    ///
    /// # Errors
    ///
    /// Returns the adapter or operation error, or a cancellation/timeout error.
    pub async fn update(&mut self, identity: &Identity, desired: &Map<String, Value>) -> Result<Option<Value>> {
        let (adapter, client) = (self.adapter, self.client);
        info!("Updating {}", adapter.display_identity(identity));
        self.submit(Phase::Update, adapter.update(client, identity, desired))
            .await
    }

    /// Deletes the resource and waits until reads stop returning it.
    ///
    /// # Errors
    ///
    /// Returns the adapter or operation error, a `Timeout` if the resource is
    /// still observed after the delete-lag budget, or a cancellation error.
    pub async fn delete(&mut self, identity: &Identity) -> Result<DeleteOutcome> {
        let (adapter, client) = (self.adapter, self.client);
        info!("Deleting {}", adapter.display_identity(identity));

        let deadline = Instant::now() + self.options.mutate_timeout;
        let outcome = match self
            .suspender
            .run(Phase::Delete, self.options.mutate_timeout, adapter.delete(client, identity))
            .await
        {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) if e.is_not_found() => return Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) => return Err(e),
        };
        self.issued = true;
        self.settle(outcome, deadline).await?;
        self.await_absence(identity).await?;
        Ok(DeleteOutcome::Deleted)
    }

    /// Deletes then creates the resource.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn recreate(&mut self, identity: &Identity, desired: &Map<String, Value>) -> Result<Option<Value>> {
        if self.delete(identity).await? == DeleteOutcome::AlreadyAbsent {
            debug!("Resource vanished before recreate, creating directly");
        }
        self.create(identity, desired).await
    }

    async fn submit<F>(&mut self, phase: Phase, call: F) -> Result<Option<Value>>
    where
        F: Future<Output = Result<OperationOutcome>>,
    {
        let deadline = Instant::now() + self.options.mutate_timeout;
        let outcome = self
            .suspender
            .run(phase, self.options.mutate_timeout, call)
            .await?;
        self.issued = true;
        self.settle(outcome, deadline).await
    }

    async fn settle(&self, outcome: OperationOutcome, deadline: Instant) -> Result<Option<Value>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let driver = self.driver();
        self.suspender
            .run(Phase::Poll, remaining, driver.drive(outcome, &self.suspender))
            .await
    }

    async fn await_absence(&self, identity: &Identity) -> Result<()> {
        let deadline = Instant::now() + self.options.delete_lag_timeout;
        let mut lagging_reads: u32 = 0;

        loop {
            let read = self
                .suspender
                .run(
                    Phase::DeleteLag,
                    self.options.read_timeout,
                    self.adapter.read(self.client, identity),
                )
                .await;
            match read {
                Ok(None) => break,
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
                Ok(Some(_)) => lagging_reads = lagging_reads.saturating_add(1),
            }

            if Instant::now() >= deadline {
                warn!(
                    "{} still visible {lagging_reads} read(s) after delete",
                    self.adapter.display_identity(identity)
                );
                return Err(ReconcileError::Timeout {
                    phase: Phase::DeleteLag.to_string(),
                    after_ms: self.options.delete_lag_timeout.as_millis(),
                }
                .into());
            }
            debug!("Deleted resource still visible, re-reading");
            self.suspender
                .sleep(Phase::DeleteLag, self.options.delete_lag_interval)
                .await?;
        }

        if lagging_reads > 0 {
            debug!("Resource disappeared after {lagging_reads} lagging read(s)");
        }
        Ok(())
    }
}

impl std::fmt::Debug for MutationExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationExecutor")
            .field("kind", &self.adapter.schema().kind)
            .field("options", &self.options)
            .field("issued", &self.issued)
            .finish_non_exhaustive()
    }
}
