//! [`AlignmentToolkit`] backed by `sambamba`.
//!
//! Read-group and flag filters are expressed in sambamba's filter language instead of
//! files and bit masks.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::toolkit::{AlignmentToolkit, DUPLICATE_FLAG, QC_FAIL_FLAG, RecordFilter, SECONDARY_FLAG};
use crate::format::{AlignmentFile, AlignmentFormat};

/// Flag bits sambamba can filter on, with their filter-language names.
const FLAG_PREDICATES: [(u16, &str); 3] = [
    (SECONDARY_FLAG, "secondary_alignment"),
    (QC_FAIL_FLAG, "failed_quality_control"),
    (DUPLICATE_FLAG, "duplicate"),
];

/// The `sambamba` toolkit.
#[derive(Debug, Clone)]
pub struct Sambamba {
    path: PathBuf,
    threads: usize,
}

impl Sambamba {
    /// Creates a toolkit running the executable at `path` with `threads` threads.
    #[must_use]
    pub fn new(path: PathBuf, threads: usize) -> Self {
        Self { path, threads: threads.max(1) }
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut command = Command::new(&self.path);
        command.arg(subcommand).arg("-t").arg(self.threads.to_string());
        command
    }
}

/// Builds the sambamba filter expression for `filter`, if it filters anything.
fn filter_expression(filter: &RecordFilter) -> Option<String> {
    let mut clauses: Vec<String> = FLAG_PREDICATES
        .iter()
        .filter(|(flag, _)| filter.exclude_flags & flag != 0)
        .map(|(_, name)| format!("not {name}"))
        .collect();

    if !filter.read_groups.is_empty() {
        let any_group = filter
            .read_groups
            .iter()
            .map(|rg| format!("read_group == '{rg}'"))
            .collect::<Vec<_>>()
            .join(" or ");
        clauses.push(format!("({any_group})"));
    }

    if clauses.is_empty() { None } else { Some(clauses.join(" and ")) }
}

impl AlignmentToolkit for Sambamba {
    fn name(&self) -> &'static str {
        "sambamba"
    }

    fn header_command(&self, path: &Path, reference: Option<&Path>) -> Command {
        let mut command = self.command("view");
        command.arg("-H");
        if let Some(reference) = reference {
            command.arg("-C").arg("-T").arg(reference);
        }
        command.arg(path);
        command
    }

    fn view_command(&self, file: &AlignmentFile, filter: &RecordFilter) -> Command {
        let mut command = self.command("view");
        command.arg("-f").arg("sam");
        if filter.include_header {
            command.arg("-h");
        }
        if let Some(expression) = filter_expression(filter) {
            command.arg("-F").arg(expression);
        }
        if file.format == AlignmentFormat::Cram {
            command.arg("-C");
        }
        if let Some(reference) = file.decoding_reference() {
            command.arg("-T").arg(reference);
        }
        command.arg(&file.path);
        command
    }

    fn sort_commands(&self, output: &Path) -> Vec<Command> {
        let mut convert = self.command("view");
        convert.args(["-S", "-f", "bam", "-l", "0", "/dev/stdin"]);

        let mut sort = self.command("sort");
        let tmpdir = output.parent().unwrap_or_else(|| Path::new("."));
        sort.arg("--tmpdir").arg(tmpdir).arg("-o").arg(output).arg("/dev/stdin");
        vec![convert, sort]
    }

    fn merge_command(&self, output: &Path, inputs: &[PathBuf]) -> Command {
        let mut command = self.command("merge");
        command.arg(output).args(inputs);
        command
    }

    fn count_command(&self, path: &Path) -> Command {
        let mut command = self.command("view");
        command.arg("-c").arg(path);
        command
    }
}
