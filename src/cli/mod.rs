//! CLI module for the converge tool.
//!
//! This module provides the command-line interface for reconciling
//! request files against a cloud backend.

mod commands;
mod output;

pub use commands::{Backend, Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
