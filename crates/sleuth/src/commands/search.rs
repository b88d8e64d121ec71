//! Search command - list matching line indices.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;

use super::{Context, open_document};

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Document to search
    pub file: PathBuf,

    /// Case-insensitive substring to look for
    pub keyword: String,
}

/// Run the search command.
pub fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let env = open_document(&args.file)?;
    let hits = env.keyword_search(&args.keyword);

    if ctx.json_output {
        println!("{}", serde_json::to_string(&hits)?);
        return Ok(());
    }

    println!("{:?}", hits);
    if ctx.verbose {
        let dim = Style::new().dim();
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "{} matches (limit {})",
                hits.len(),
                sleuth_agent::KEYWORD_SEARCH_LIMIT
            ))
        );
    }

    Ok(())
}
