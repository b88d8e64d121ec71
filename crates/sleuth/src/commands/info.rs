//! Info command - show the document descriptor.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{Context, open_document};

/// Arguments for the info command.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Document to describe
    pub file: PathBuf,
}

/// Run the info command.
pub fn run(args: InfoArgs, ctx: &Context) -> Result<()> {
    let env = open_document(&args.file)?;

    if ctx.json_output {
        let out = serde_json::json!({
            "path": args.file.display().to_string(),
            "total_lines": env.total_lines(),
            "metadata": env.metadata(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", env.metadata());
    }

    Ok(())
}
