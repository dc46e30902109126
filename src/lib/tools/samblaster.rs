//! The duplicate-marking collaborator (`samblaster`).

use std::path::{Path, PathBuf};
use std::process::Command;

/// Tuning parameters passed to the duplicate marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupParams {
    /// Maximum number of split alignments for a read to be reported as a split read
    pub max_split_count: u32,
    /// Minimum non-overlapping bases between split alignments
    pub min_non_overlap: u32,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self { max_split_count: 2, min_non_overlap: 20 }
    }
}

/// `samblaster`, reading read-id grouped SAM on stdin and writing deduplicated SAM to stdout
/// while extracting discordant and split alignments to side files.
#[derive(Debug, Clone)]
pub struct Samblaster {
    path: PathBuf,
}

impl Samblaster {
    /// Creates a duplicate marker running the executable at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Builds the command writing discordant pairs to `discordant` and split reads to `split`.
    #[must_use]
    pub fn command(&self, params: DedupParams, discordant: &Path, split: &Path) -> Command {
        let mut command = Command::new(&self.path);
        command
            .args(["--excludeDups", "--addMateTags", "--ignoreUnmated"])
            .arg("--maxSplitCount")
            .arg(params.max_split_count.to_string())
            .arg("--minNonOverlap")
            .arg(params.min_non_overlap.to_string())
            .arg("-d")
            .arg(discordant)
            .arg("-s")
            .arg(split);
        command
    }
}
