//! Read command - print a window of numbered lines.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{Context, open_document};

/// Arguments for the read command.
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Document to read
    pub file: PathBuf,

    /// 0-based index of the first line
    #[arg(allow_negative_numbers = true)]
    pub start: i64,

    /// Number of lines to print
    #[arg(allow_negative_numbers = true)]
    pub count: i64,
}

/// Run the read command.
pub fn run(args: ReadArgs, ctx: &Context) -> Result<()> {
    let env = open_document(&args.file)?;
    let window = env.read_window(args.start, args.count);

    if ctx.json_output {
        let out = serde_json::json!({
            "start": args.start,
            "count": args.count,
            "text": window,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        // Lines carry their own terminators.
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(window.as_bytes())?;
        stdout.flush()?;
    }

    Ok(())
}
