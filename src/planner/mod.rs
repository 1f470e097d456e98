//! Deciding and executing state transitions.
//!
//! - [`diff`]: first-divergence comparison
//! - [`plan`]: action selection
//! - [`executor`]: mutating steps and operation polling

pub mod diff;
pub mod executor;
pub mod plan;

pub use diff::{Comparator, Divergence, DivergenceReason};
pub use executor::{DeleteOutcome, MutationExecutor};
pub use plan::{Action, DecisionFlags, Plan, decide, plan_offline};
