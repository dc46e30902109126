//! [`AlignmentToolkit`] backed by `samtools`.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::toolkit::{AlignmentToolkit, RecordFilter};
use crate::format::AlignmentFile;

/// The `samtools` toolkit.
#[derive(Debug, Clone)]
pub struct Samtools {
    path: PathBuf,
    threads: usize,
}

impl Samtools {
    /// Creates a toolkit running the executable at `path` with `threads` extra threads.
    #[must_use]
    pub fn new(path: PathBuf, threads: usize) -> Self {
        Self { path, threads }
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut command = Command::new(&self.path);
        command.arg(subcommand);
        command
    }

    fn threaded(&self, subcommand: &str) -> Command {
        let mut command = self.command(subcommand);
        if self.threads > 1 {
            command.arg("-@").arg((self.threads - 1).to_string());
        }
        command
    }
}

impl AlignmentToolkit for Samtools {
    fn name(&self) -> &'static str {
        "samtools"
    }

    fn header_command(&self, path: &Path, reference: Option<&Path>) -> Command {
        let mut command = self.command("view");
        command.arg("-H");
        if let Some(reference) = reference {
            command.arg("-T").arg(reference);
        }
        command.arg(path);
        command
    }

    fn view_command(&self, file: &AlignmentFile, filter: &RecordFilter) -> Command {
        let mut command = self.threaded("view");
        if filter.include_header {
            command.arg("-h");
        }
        if filter.exclude_flags != 0 {
            command.arg("-F").arg(format!("{:#x}", filter.exclude_flags));
        }
        if let Some(read_group_file) = &filter.read_group_file {
            command.arg("-R").arg(read_group_file);
        }
        if let Some(reference) = file.decoding_reference() {
            command.arg("-T").arg(reference);
        }
        command.arg(&file.path);
        command
    }

    fn sort_commands(&self, output: &Path) -> Vec<Command> {
        let mut command = self.threaded("sort");
        command.arg("-T").arg(output.with_extension("sorting")).arg("-o").arg(output).arg("-");
        vec![command]
    }

    fn merge_command(&self, output: &Path, inputs: &[PathBuf]) -> Command {
        let mut command = self.threaded("merge");
        command.arg("-f").arg(output).args(inputs);
        command
    }

    fn count_command(&self, path: &Path) -> Command {
        let mut command = self.command("view");
        command.arg("-c").arg(path);
        command
    }
}
