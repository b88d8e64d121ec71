//! CLI command handlers.

pub mod ask;
pub mod info;
pub mod read;
pub mod search;

use std::path::Path;

use anyhow::Result;
use sleuth_agent::Environment;
use sleuth_config::SleuthConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Merged configuration from all discovered layers.
    pub config: SleuthConfig,
}

/// Load a document, failing before any model work if it is missing.
pub fn open_document(path: &Path) -> Result<Environment> {
    Ok(Environment::from_file(path)?)
}
