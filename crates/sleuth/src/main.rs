//! Sleuth - recursive document investigator
//!
//! Main entry point for the Sleuth CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

mod commands;

use commands::{ask, info, read, search};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Sleuth - answer questions about documents too large to read at once
#[derive(Parser)]
#[command(name = "sleuth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Extra config file layered over the discovered ones
    #[arg(long, global = true, env = "SLEUTH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Investigate a document with a model and print the answer
    Ask(ask::AskArgs),

    /// Show the document descriptor the model is given
    Info(info::InfoArgs),

    /// List line indices containing a keyword
    Search(search::SearchArgs),

    /// Print a window of numbered lines
    Read(read::ReadArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `.env` can supply SLEUTH_CONFIG and SLEUTH_CONFIG_DIR.
    let dotenv = sleuth_config::load_dotenv(None);
    let cli = Cli::parse();

    let loaded = sleuth_config::load_config_with_options(None, None, cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Console (stderr, human-readable) + optional rotating JSON file
    let filter = if cli.verbose {
        "sleuth=debug,sleuth_agent=debug,sleuth_llm=debug,sleuth_config=debug,warn"
    } else {
        "sleuth=info,sleuth_agent=warn,sleuth_llm=warn,sleuth_config=warn,warn"
    };

    let log_dir = loaded
        .config
        .logging
        .as_ref()
        .and_then(|l| l.directory.clone());
    let (file_layer, _guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "sleuth.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "sleuth=trace,sleuth_agent=trace,sleuth_llm=trace,sleuth_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }
    tracing::debug!(sources = ?loaded.loaded_from(), "Configuration loaded");

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config: loaded.config,
    };

    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Info(args) => info::run(args, &ctx),
        Commands::Search(args) => search::run(args, &ctx),
        Commands::Read(args) => read::run(args, &ctx),
    }
}
