//! List the libraries of an alignment file.

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fgoxide::io::{DelimFileWriter, Io};
use serde::Serialize;

use svexpress_lib::format::{AlignmentFile, AlignmentFormat};
use svexpress_lib::library::{Library, discover_libraries};
use svexpress_lib::validation::validate_file_exists;

use crate::commands::command::Command;
use crate::commands::common::{ReferenceOptions, ToolOptions};

/// One output row: a library and its comma-separated read groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryRow {
    /// Library name (`unknown` for read groups without LB)
    pub library: String,
    /// Read groups of the library, comma-separated
    pub read_groups: String,
}

impl From<&Library> for LibraryRow {
    fn from(library: &Library) -> Self {
        Self { library: library.name.clone(), read_groups: library.read_groups.join(",") }
    }
}

/// Group the read groups of an alignment file into libraries.
#[derive(Debug, Parser)]
#[command(
    name = "libraries",
    about = "\x1b[38;5;173m[UTILITIES]\x1b[0m      \x1b[36mList the libraries and read groups of an alignment file\x1b[0m",
    long_about = r#"
List the libraries of an alignment file, as the express command discovers them.

Read groups are grouped by their LB field, in header order. Read groups without LB
belong to the library `unknown`. Writes a TSV with the columns `library` and
`read_groups` to stdout, or to --output.
"#
)]
pub struct Libraries {
    /// Input alignment file (BAM or CRAM)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output TSV [default: stdout]
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub reference: ReferenceOptions,

    #[command(flatten)]
    pub tools: ToolOptions,
}

impl Command for Libraries {
    fn execute(&self, _command_line: &str) -> Result<()> {
        validate_file_exists(&self.input, "input alignment file")?;
        self.reference.validate()?;
        let file = AlignmentFile::open(&self.input, self.reference.reference.as_deref())?;
        let toolkit = self.tools.toolkit(file.format == AlignmentFormat::Cram)?;
        let libraries = discover_libraries(toolkit.as_ref(), &file)
            .with_context(|| format!("Failed to read libraries of {}", self.input.display()))?;
        let rows: Vec<LibraryRow> = libraries.iter().map(LibraryRow::from).collect();

        let (writer, destination) = match &self.output {
            Some(output) => (
                Io::default()
                    .new_writer(output)
                    .with_context(|| format!("Failed to create {}", output.display()))?,
                output.display().to_string(),
            ),
            None => {
                let stdout: Box<dyn Write + Send> = Box::new(std::io::stdout());
                (BufWriter::new(stdout), "stdout".to_string())
            }
        };
        DelimFileWriter::new(writer, b'\t', false)
            .write_all(rows)
            .with_context(|| format!("Failed to write libraries to {destination}"))?;
        Ok(())
    }
}
