//! The alignment toolkit strategy.
//!
//! Everything that touches the binary alignment formats is delegated to an external
//! toolkit. Two implementations exist, [`super::Samtools`] and [`super::Sambamba`]; one is
//! selected at startup by [`super::select_toolkit`] and injected as
//! `&dyn AlignmentToolkit` into every component that needs it.
//!
//! Implementations only *build* commands; running them (and failing on non-zero exits) is
//! done by [`crate::process`].

use std::path::{Path, PathBuf};
use std::process::Command;

use noodles::sam::Header;

use crate::errors::{ExpressError, Result};
use crate::format::AlignmentFile;
use crate::process;

/// SAM flag of secondary alignments.
pub const SECONDARY_FLAG: u16 = 0x100;
/// SAM flag of reads failing platform/vendor quality checks.
pub const QC_FAIL_FLAG: u16 = 0x200;
/// SAM flag of PCR or optical duplicates.
pub const DUPLICATE_FLAG: u16 = 0x400;

/// Which records of an alignment file to stream, and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Read groups to keep; empty keeps every record
    pub read_groups: Vec<String>,
    /// File listing `read_groups`, one per line (required by toolkits filtering by file)
    pub read_group_file: Option<PathBuf>,
    /// Emit the SAM header before the records
    pub include_header: bool,
    /// Records with any of these flag bits set are dropped
    pub exclude_flags: u16,
}

impl RecordFilter {
    /// A filter keeping every record, without header.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the stream to `read_groups`, listed in `read_group_file`.
    #[must_use]
    pub fn with_read_groups(mut self, read_groups: &[String], read_group_file: &Path) -> Self {
        if !read_groups.is_empty() {
            self.read_groups = read_groups.to_vec();
            self.read_group_file = Some(read_group_file.to_path_buf());
        }
        self
    }

    /// Emits the header before the records.
    #[must_use]
    pub fn with_header(mut self) -> Self {
        self.include_header = true;
        self
    }

    /// Drops records with any of `flags` set.
    #[must_use]
    pub fn excluding(mut self, flags: u16) -> Self {
        self.exclude_flags |= flags;
        self
    }

    /// Writes the read-group list file if this filter restricts read groups.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the list cannot be written.
    pub fn write_read_group_file(&self) -> Result<()> {
        if let Some(path) = &self.read_group_file {
            let mut contents = self.read_groups.join("\n");
            contents.push('\n');
            std::fs::write(path, contents).map_err(ExpressError::io(path))?;
        }
        Ok(())
    }
}

/// Command builders for an external SAM/BAM/CRAM toolkit.
pub trait AlignmentToolkit: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &'static str;

    /// Prints the SAM header of `path` to stdout.
    fn header_command(&self, path: &Path, reference: Option<&Path>) -> Command;

    /// Streams the records of `file` as SAM text to stdout.
    fn view_command(&self, file: &AlignmentFile, filter: &RecordFilter) -> Command;

    /// Chain reading SAM text (with header) on stdin and writing a coordinate-sorted BAM.
    fn sort_commands(&self, output: &Path) -> Vec<Command>;

    /// Merges sorted BAM files into `output`.
    fn merge_command(&self, output: &Path, inputs: &[PathBuf]) -> Command;

    /// Prints the number of records in `path` to stdout.
    fn count_command(&self, path: &Path) -> Command;
}

/// Reads and parses the SAM header of an alignment file through the toolkit.
///
/// # Errors
///
/// Returns a pipeline error if the toolkit fails, or an input validation error if the
/// header text cannot be parsed.
pub fn read_header(
    toolkit: &dyn AlignmentToolkit,
    path: &Path,
    reference: Option<&Path>,
) -> Result<Header> {
    let text = process::run_capture(toolkit.header_command(path, reference))?;
    text.parse::<Header>().map_err(|e| {
        let reason = format!("cannot parse: {e}");
        ExpressError::invalid_input("alignment header", path.display(), reason)
    })
}

/// Counts the records of an alignment file through the toolkit.
///
/// # Errors
///
/// Returns a pipeline error if the toolkit fails, or a collaborator error if it does not
/// print a single integer.
pub fn count_records(toolkit: &dyn AlignmentToolkit, path: &Path) -> Result<u64> {
    let text = process::run_capture(toolkit.count_command(path))?;
    text.trim().parse::<u64>().map_err(|_| {
        ExpressError::collaborator(
            format!("{} record count", toolkit.name()),
            format!("expected an integer for '{}', got '{}'", path.display(), text.trim()),
        )
    })
}
