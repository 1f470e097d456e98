//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Converge - declarative reconciliation of single cloud resources.
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Cloud backend to reconcile against.
    #[arg(long, global = true, env = "CONVERGE_BACKEND", default_value = "arm")]
    pub backend: Backend,

    /// Directory of the local backend (defaults to the user data directory).
    #[arg(long, global = true, env = "CONVERGE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a request file without contacting the cloud.
    Validate {
        /// Path to the request file.
        file: PathBuf,
    },

    /// Show what apply would do, without mutating anything.
    Plan {
        /// Path to the request file.
        file: PathBuf,
    },

    /// Converge the resource to the request.
    Apply {
        /// Path to the request file.
        file: PathBuf,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Replace the resource instead of updating it in place.
        #[arg(long)]
        force_update: bool,
    },

    /// Delete the resource named by the request.
    Destroy {
        /// Path to the request file.
        file: PathBuf,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Compare the request against a provider document offline.
    Diff {
        /// Path to the request file.
        file: PathBuf,

        /// Path to the observed provider document (JSON); omit if the resource is missing.
        #[arg(long)]
        observed: Option<PathBuf>,
    },

    /// List the registered resource kinds.
    Kinds,

    /// Show the argument schema of a kind.
    Schema {
        /// Resource kind, e.g. `dns-zone`.
        kind: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Cloud backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Azure Resource Manager over HTTPS.
    #[default]
    Arm,
    /// File-backed store on the local disk.
    Local,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
