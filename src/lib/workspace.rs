//! The scratch workspace of one run.
//!
//! A [`Workspace`] owns a directory tree and the two named pipes used to fan the output of
//! the duplicate marker out to the evidence sorters:
//!
//! ```text
//! <root>/
//! ├── discordant.pipe
//! ├── split.pipe
//! ├── discordants/sample<S>.lib<L>.bam
//! ├── splitters/sample<S>.lib<L>.bam
//! ├── stats/sample<S>.lib<L>.{histo,insert.stats,read_groups}
//! ├── sample<S>.discordants.bam
//! └── sample<S>.splitters.bam
//! ```
//!
//! Sample and library indices are 1-based, which makes every path unique per
//! (sample, library, kind). The tree is removed when the workspace is dropped, on every exit
//! path, unless retention was requested.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::errors::{ExpressError, Result};

/// Number of random characters in generated workspace names.
const RANDOM_NAME_LENGTH: usize = 12;

const DISCORDANTS_DIR: &str = "discordants";
const SPLITTERS_DIR: &str = "splitters";
const STATS_DIR: &str = "stats";
const DISCORDANT_PIPE: &str = "discordant.pipe";
const SPLIT_PIPE: &str = "split.pipe";

/// Files of one (sample, library) unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    /// Sorted discordant-pair evidence
    pub discordants: PathBuf,
    /// Sorted split-read evidence
    pub splitters: PathBuf,
    /// Insert-size histogram
    pub histogram: PathBuf,
    /// Insert-size summary
    pub stats: PathBuf,
    /// Read-group list used to filter the library's records
    pub read_groups: PathBuf,
}

/// Per-sample evidence files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePaths {
    /// Merged discordant-pair evidence
    pub discordants: PathBuf,
    /// Merged split-read evidence
    pub splitters: PathBuf,
}

/// Scratch directory tree of one run, removed on drop unless retained.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    /// Outermost directory created by this run; `root` or one of its ancestors
    created: PathBuf,
    retain: bool,
}

impl Workspace {
    /// Creates the workspace.
    ///
    /// With `tmp_dir`, the directory (and any missing parent) is created if absent and used as
    /// the root; everything created is removed again on drop. If it already exists a uniquely named directory is created inside it, so pre-existing content is never
    /// removed. Without `tmp_dir`, `./<output_basename>.XXXXXXXXXXXX` is created.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any directory or pipe cannot be created.
    pub fn create(tmp_dir: Option<&Path>, output_basename: &str, retain: bool) -> Result<Self> {
        let (root, created) = match tmp_dir {
            Some(dir) if !dir.exists() => {
                let created = outermost_missing(dir);
                std::fs::create_dir_all(dir).map_err(ExpressError::io(dir))?;
                (dir.to_path_buf(), created)
            }
            Some(dir) => {
                let root = unique_dir(dir, output_basename)?;
                (root.clone(), root)
            }
            None => {
                let root = unique_dir(Path::new("."), output_basename)?;
                (root.clone(), root)
            }
        };
        // Owned from here on, so a failure below still removes the tree.
        let workspace = Self { root, created, retain };

        for sub in [DISCORDANTS_DIR, SPLITTERS_DIR, STATS_DIR] {
            let dir = workspace.root.join(sub);
            std::fs::create_dir_all(&dir).map_err(ExpressError::io(&dir))?;
        }
        make_fifo(&workspace.discordant_pipe())?;
        make_fifo(&workspace.split_pipe())?;

        debug!("Created workspace {}", workspace.root.display());
        Ok(workspace)
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Named pipe carrying discordant-pair alignments.
    #[must_use]
    pub fn discordant_pipe(&self) -> PathBuf {
        self.root.join(DISCORDANT_PIPE)
    }

    /// Named pipe carrying split-read alignments.
    #[must_use]
    pub fn split_pipe(&self) -> PathBuf {
        self.root.join(SPLIT_PIPE)
    }

    /// Files of library `library` of sample `sample` (both 1-based).
    #[must_use]
    pub fn unit(&self, sample: usize, library: usize) -> UnitPaths {
        let stem = format!("sample{sample}.lib{library}");
        let stats = self.root.join(STATS_DIR);
        UnitPaths {
            discordants: self.root.join(DISCORDANTS_DIR).join(format!("{stem}.bam")),
            splitters: self.root.join(SPLITTERS_DIR).join(format!("{stem}.bam")),
            histogram: stats.join(format!("{stem}.histo")),
            stats: stats.join(format!("{stem}.insert.stats")),
            read_groups: stats.join(format!("{stem}.read_groups")),
        }
    }

    /// Per-sample evidence files of sample `sample` (1-based).
    #[must_use]
    pub fn sample(&self, sample: usize) -> SamplePaths {
        SamplePaths {
            discordants: self.root.join(format!("sample{sample}.discordants.bam")),
            splitters: self.root.join(format!("sample{sample}.splitters.bam")),
        }
    }

    /// Prefix under which the variant caller writes its own temporary files.
    #[must_use]
    pub fn caller_prefix(&self, output_basename: &str) -> PathBuf {
        self.root.join(output_basename)
    }

    /// Whether the tree is kept when the workspace is dropped.
    #[must_use]
    pub fn is_retained(&self) -> bool {
        self.retain
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.retain {
            info!("Keeping temporary files in {}", self.root.display());
            return;
        }
        match std::fs::remove_dir_all(&self.created) {
            Ok(()) => debug!("Removed workspace {}", self.created.display()),
            Err(e) => warn!("Failed to remove workspace {}: {e}", self.created.display()),
        }
    }
}

/// The outermost of `dir` and its ancestors that does not exist yet.
fn outermost_missing(dir: &Path) -> PathBuf {
    let mut outermost = dir.to_path_buf();
    for ancestor in dir.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() || ancestor.exists() {
            break;
        }
        outermost = ancestor.to_path_buf();
    }
    outermost
}

/// Creates `<parent>/<basename>.XXXXXXXXXXXX`.
fn unique_dir(parent: &Path, basename: &str) -> Result<PathBuf> {
    tempfile::Builder::new()
        .prefix(&format!("{basename}."))
        .rand_bytes(RANDOM_NAME_LENGTH)
        .tempdir_in(parent)
        .map(tempfile::TempDir::keep)
        .map_err(ExpressError::io(parent))
}

/// Creates a named pipe readable and writable by the owner only.
#[allow(unsafe_code)]
fn make_fifo(path: &Path) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        ExpressError::invalid_input("workspace path", path.display(), "contains a NUL byte")
    })?;
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(ExpressError::io(path)(std::io::Error::last_os_error()));
    }
    Ok(())
}
