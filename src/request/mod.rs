//! Requests and request documents.
//!
//! - [`spec`]: the typed request
//! - [`parser`]: loading YAML request files and environment overrides
//! - [`validator`]: schema-aware validation with errors and warnings
//! - [`hash`]: order-independent request fingerprints

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::RequestHasher;
pub use parser::{ENV_ARM_ENDPOINT, ENV_ARM_TOKEN, ENV_DEFAULT_LOCATION, RequestParser};
pub use spec::{Identity, Intent, Request, RequestDefaults, RequestFile, TimeoutConfig};
pub use validator::{RequestValidator, ValidationIssue, ValidationResult};
