//! Loading request documents.
//!
//! Request files are YAML (JSON is accepted too, being a YAML subset). A few
//! values can come from the environment, optionally seeded from a `.env` file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use validator::Validate;

use crate::error::{ConfigError, ConvergeError, Result};

use super::spec::RequestFile;

/// Environment variable overriding the default location.
pub const ENV_DEFAULT_LOCATION: &str = "CONVERGE_DEFAULT_LOCATION";
/// Environment variable holding the resource manager bearer token.
pub const ENV_ARM_TOKEN: &str = "CONVERGE_ARM_TOKEN";
/// Environment variable overriding the resource manager endpoint.
pub const ENV_ARM_ENDPOINT: &str = "CONVERGE_ARM_ENDPOINT";

/// Parser for request documents.
#[derive(Debug, Default)]
pub struct RequestParser {
    /// Directory searched for `.env`.
    base_path: Option<PathBuf>,
}

impl RequestParser {
    /// Creates a parser rooted at the current directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory searched for `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads and validates a request file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, malformed or invalid.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<RequestFile> {
        let path = path.as_ref();
        info!("Loading request from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        let mut file = self.parse_yaml(&content, Some(path))?;
        Self::apply_env_overrides(&mut file);
        Ok(file)
    }

    /// Parses and validates a request document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<RequestFile> {
        debug!("Parsing request document");

        let file: RequestFile = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;

        file.validate()
            .map_err(|e| ConfigError::validation_general(e.to_string()))?;

        debug!(
            "Parsed {} request for {} ({})",
            file.request.kind, file.request.identity, file.request.intent
        );
        Ok(file)
    }

    /// Applies environment overrides to a parsed request.
    fn apply_env_overrides(file: &mut RequestFile) {
        if let Ok(location) = std::env::var(ENV_DEFAULT_LOCATION) {
            debug!("Overriding defaults.location from environment");
            file.request.defaults.location = Some(location);
        }
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the resource manager token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn arm_token() -> Result<String> {
        std::env::var(ENV_ARM_TOKEN).map_err(|_| {
            ConvergeError::Config(ConfigError::MissingEnvVar {
                name: ENV_ARM_TOKEN.to_string(),
            })
        })
    }

    /// Gets the resource manager endpoint override, if any.
    #[must_use]
    pub fn arm_endpoint() -> Option<String> {
        std::env::var(ENV_ARM_ENDPOINT).ok()
    }
}
