//! Report the format of alignment files.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use log::error;

use svexpress_lib::format::sniff_format;

use crate::commands::command::Command;

/// Print the detected format (BAM, CRAM or INVALID) of each file.
#[derive(Debug, Parser)]
#[command(
    name = "sniff",
    about = "\x1b[38;5;173m[UTILITIES]\x1b[0m      \x1b[36mReport whether files are BAM, CRAM or neither\x1b[0m",
    long_about = r#"
Report the format of alignment files from their magic bytes.

Prints one `<path>\t<FORMAT>` line per file, where FORMAT is BAM, CRAM or INVALID.
Exits with a non-zero status if any file is INVALID.
"#
)]
pub struct Sniff {
    /// Files to inspect
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
}

impl Command for Sniff {
    fn execute(&self, _command_line: &str) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut invalid = Vec::new();
        for input in &self.inputs {
            let format = sniff_format(input)?;
            writeln!(out, "{}\t{format}", input.display())?;
            if !format.is_valid() {
                error!("{} is neither BAM nor CRAM", input.display());
                invalid.push(input.display().to_string());
            }
        }
        out.flush()?;
        if !invalid.is_empty() {
            bail!("Invalid alignment file(s): {}", invalid.join(", "));
        }
        Ok(())
    }
}
