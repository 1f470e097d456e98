// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Cloud Converge
//!
//! A declarative reconciliation engine for single cloud resources.
//!
//! ## Overview
//!
//! A caller states what one resource should look like (or that it should not
//! exist) and the engine brings the cloud into that state:
//!
//! - Reads the resource and compares it against the desired state
//! - Creates, updates, recreates or deletes only when they diverge
//! - Waits out long-running provider operations and delete lag
//! - Reports a verdict: what changed, why, and the resulting state
//!
//! Running the same request twice is a no-op the second time.
//!
//! ## Architecture
//!
//! 1. **Normalize**: desired state is canonicalized (locations, enum case,
//!    resource references) against the adapter's schema
//! 2. **Read**: the adapter fetches the observed state
//! 3. **Decide**: the comparator finds the first divergence and an action is chosen
//! 4. **Mutate**: the action runs, polling any asynchronous operation
//! 5. **Report**: the resource is re-read and projected into a [`Verdict`]
//!
//! ## Modules
//!
//! - [`request`]: Requests, request files and validation
//! - [`normalize`]: Canonical forms of desired state
//! - [`adapter`]: Resource kinds and their schemas
//! - [`cloud`]: Cloud clients (resource manager, local)
//! - [`operation`]: Long-running operation polling
//! - [`planner`]: Comparison, action selection and mutation
//! - [`reconciler`]: The reconciliation state machine
//! - [`verdict`]: Results reported to callers
//! - [`suspend`]: Cancellation and time budgets
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! kind: dns-zone
//! identity: [my-subscription, my-rg, example.com]
//! desired:
//!   location: global
//!   zone_type: private
//!   tags:
//!     env: prod
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod adapter;
pub mod cli;
pub mod cloud;
pub mod error;
pub mod normalize;
pub mod operation;
pub mod planner;
pub mod reconciler;
pub mod request;
pub mod suspend;
pub mod verdict;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{AdapterRegistry, ArmAdapter, ResourceAdapter, ResourceSchema};
pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{ArmClient, CloudClient, LocalCloud};
pub use error::{ConvergeError, ErrorKind, Result};
pub use planner::{Action, Comparator, Divergence};
pub use reconciler::{ReconcileOptions, Reconciler, fill_default_location, reconcile};
pub use request::{Identity, Intent, Request, RequestFile, RequestParser, RequestValidator};
pub use suspend::{CancelHandle, CancelSignal};
pub use verdict::Verdict;
