//! Request types for a single reconciliation.
//!
//! A [`Request`] fully describes the desired state of one resource. A
//! [`RequestFile`] is the on-disk form, which additionally carries timeouts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

/// Ordered path segments identifying a resource (subscription, resource
/// group, parent names, leaf name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Vec<String>);

impl Identity {
    /// Creates an identity from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns all segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the segment at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the identity has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the leaf segment.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Whether the resource should exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// The resource should exist with the desired state.
    #[default]
    Present,
    /// The resource should not exist.
    Absent,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Values supplied by the invocation layer that the engine cannot look up itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestDefaults {
    /// Default location of the enclosing resource group.
    #[serde(default)]
    pub location: Option<String>,
}

/// A request to converge one resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Request {
    /// Adapter identifier, e.g. `dns-zone`.
    #[validate(length(min = 1, message = "kind must not be empty"))]
    pub kind: String,
    /// Resource identity.
    #[validate(custom(function = "validate_identity"))]
    pub identity: Identity,
    /// Desired state in the user's snake_case vocabulary.
    #[serde(default)]
    pub desired: Map<String, Value>,
    /// Presence intent.
    #[serde(default)]
    pub intent: Intent,
    /// Report the intended action without mutating anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Replace the resource instead of updating it in place.
    #[serde(default)]
    pub force_update: bool,
    /// Values supplied by the caller.
    #[serde(default)]
    pub defaults: RequestDefaults,
}

fn validate_identity(identity: &Identity) -> Result<(), ValidationError> {
    if identity.is_empty() {
        return Err(ValidationError::new("identity_empty"));
    }
    if identity.segments().iter().any(|s| s.trim().is_empty()) {
        return Err(ValidationError::new("identity_blank_segment"));
    }
    Ok(())
}

impl Request {
    /// Creates a request for a resource that should exist.
    pub fn present(kind: impl Into<String>, identity: Identity, desired: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            identity,
            desired,
            intent: Intent::Present,
            dry_run: false,
            force_update: false,
            defaults: RequestDefaults::default(),
        }
    }

    /// Creates a request for a resource that should not exist.
    pub fn absent(kind: impl Into<String>, identity: Identity) -> Self {
        Self {
            intent: Intent::Absent,
            ..Self::present(kind, identity, Map::new())
        }
    }

    /// Sets the dry-run flag.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the force-update flag.
    #[must_use]
    pub const fn with_force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    /// Sets the default location.
    #[must_use]
    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.defaults.location = Some(location.into());
        self
    }
}

/// Time budgets as written in request files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Budget for each read and each poll.
    #[serde(default)]
    pub read_secs: Option<u64>,
    /// Budget for a whole mutating step including polling.
    #[serde(default)]
    pub mutate_secs: Option<u64>,
    /// Interval between operation polls.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    /// How long to wait for a deleted resource to disappear.
    #[serde(default)]
    pub delete_lag_secs: Option<u64>,
    /// Interval between post-delete re-reads.
    #[serde(default)]
    pub delete_lag_interval_secs: Option<u64>,
}

impl TimeoutConfig {
    /// Returns the configured read budget.
    #[must_use]
    pub fn read(&self) -> Option<Duration> {
        self.read_secs.map(Duration::from_secs)
    }

    /// Returns the configured mutate budget.
    #[must_use]
    pub fn mutate(&self) -> Option<Duration> {
        self.mutate_secs.map(Duration::from_secs)
    }

    /// Returns the configured poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    /// Returns the configured delete-lag budget.
    #[must_use]
    pub fn delete_lag(&self) -> Option<Duration> {
        self.delete_lag_secs.map(Duration::from_secs)
    }

    /// Returns the configured delete-lag interval.
    #[must_use]
    pub fn delete_lag_interval(&self) -> Option<Duration> {
        self.delete_lag_interval_secs.map(Duration::from_secs)
    }
}

/// On-disk request document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct RequestFile {
    /// The request itself.
    #[serde(flatten)]
    #[validate(nested)]
    pub request: Request,
    /// Optional time budgets.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}
