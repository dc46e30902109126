//! Split-read and discordant-pair evidence extraction for one (sample, library) unit.
//!
//! One producer chain fans out to three consumer branches, each running on its own thread:
//!
//! ```text
//!                                            ┌── split.pipe ──────> sort ──> splitters/…bam
//! toolkit view -h -R rgs ──> samblaster ─────┼── discordant.pipe ─> sort ──> discordants/…bam
//!                                            └── stdout ──────────> estimator ──> stats/…
//! ```
//!
//! The unit completes only after every process of the producer has exited and all three
//! branches were joined. Any failing stage fails the unit.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use log::debug;

use crate::errors::{ExpressError, Result};
use crate::format::AlignmentFile;
use crate::insert_size::{
    EstimatorParams, InsertSizeEstimator, InsertStats, estimate_from_head, measure_read_length,
    sam_records,
};
use crate::library::Library;
use crate::process::ProcessChain;
use crate::tools::toolkit::{AlignmentToolkit, RecordFilter, SECONDARY_FLAG};
use crate::tools::{DedupParams, Samblaster};
use crate::workspace::{UnitPaths, Workspace};

/// How often a branch blocked on opening its pipe is poked after the producer exited.
const RELEASE_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the extraction pipeline of each unit with the run's collaborators.
pub struct Extractor<'a> {
    toolkit: &'a dyn AlignmentToolkit,
    samblaster: &'a Samblaster,
    estimator: &'a dyn InsertSizeEstimator,
    dedup: DedupParams,
    workspace: &'a Workspace,
}

impl<'a> Extractor<'a> {
    /// Creates an extractor writing into `workspace`.
    #[must_use]
    pub fn new(
        toolkit: &'a dyn AlignmentToolkit,
        samblaster: &'a Samblaster,
        estimator: &'a dyn InsertSizeEstimator,
        dedup: DedupParams,
        workspace: &'a Workspace,
    ) -> Self {
        Self { toolkit, samblaster, estimator, dedup, workspace }
    }

    /// Extracts the evidence and insert statistics of `library` from `file` into `unit`.
    ///
    /// On success the sorted evidence files, histogram and stats file of the unit exist.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any stage or branch, reporting the producer's failure in
    /// preference to the consumers' (which usually follow from it).
    pub fn extract(
        &self,
        file: &AlignmentFile,
        library: &Library,
        unit: &UnitPaths,
    ) -> Result<InsertStats> {
        let filter = RecordFilter::all()
            .with_read_groups(&library.read_groups, &unit.read_groups)
            .excluding(SECONDARY_FLAG);
        filter.write_read_group_file()?;

        let params = EstimatorParams::new(measure_read_length(self.toolkit, file, &filter)?);

        let split_sorter = ProcessChain::spawn(
            self.toolkit.sort_commands(&unit.splitters),
            Stdio::piped(),
            Stdio::null(),
        )?;
        let discordant_sorter = ProcessChain::spawn(
            self.toolkit.sort_commands(&unit.discordants),
            Stdio::piped(),
            Stdio::null(),
        )?;

        let split_pipe = self.workspace.split_pipe();
        let discordant_pipe = self.workspace.discordant_pipe();
        let split_opened = AtomicBool::new(false);
        let discordant_opened = AtomicBool::new(false);

        thread::scope(|scope| {
            let split = scope.spawn(|| pump(&split_pipe, &split_opened, split_sorter));
            let discordant =
                scope.spawn(|| pump(&discordant_pipe, &discordant_opened, discordant_sorter));

            let produced = self.spawn_producer(file, &filter);
            let (producer, stats) = match produced {
                Ok(mut producer) => {
                    let stdout = producer.take_stdout();
                    let stats = scope.spawn(move || match stdout {
                        Some(stdout) => self.statistics(stdout, &params, unit),
                        None => Err(ExpressError::pipeline("samblaster", "stdout not captured")),
                    });
                    (producer.wait(), Some(stats))
                }
                Err(e) => (Err(e), None),
            };

            release(&split_pipe, &split_opened, &split);
            release(&discordant_pipe, &discordant_opened, &discordant);

            let split = join(split, "split evidence");
            let discordant = join(discordant, "discordant evidence");
            let stats = stats.map(|handle| join(handle, "insert statistics"));

            let stats = stats.unwrap_or_else(|| {
                Err(ExpressError::pipeline("samblaster", "producer did not start"))
            });
            first_failure(producer, split, discordant, stats)
        })
    }

    /// Starts `toolkit view | samblaster` with samblaster's stdout piped.
    fn spawn_producer(&self, file: &AlignmentFile, filter: &RecordFilter) -> Result<ProcessChain> {
        let view = self.toolkit.view_command(file, &filter.clone().with_header());
        let dedup = self.samblaster.command(
            self.dedup,
            &self.workspace.discordant_pipe(),
            &self.workspace.split_pipe(),
        );
        ProcessChain::spawn(vec![view, dedup], Stdio::null(), Stdio::piped())
    }

    /// Estimates insert statistics from the head of the deduplicated stream, then drains it.
    fn statistics(
        &self,
        stdout: impl io::Read,
        params: &EstimatorParams,
        unit: &UnitPaths,
    ) -> Result<InsertStats> {
        let mut reader = BufReader::new(stdout);
        let stats = {
            let mut records = sam_records(&mut reader);
            estimate_from_head(self.estimator, &mut records, params, &unit.histogram, &unit.stats)?
        };
        let drained = io::copy(&mut reader, &mut io::sink())
            .map_err(|e| ExpressError::pipeline("samblaster", format!("reading output: {e}")))?;
        debug!("Drained {drained} bytes of deduplicated records after sampling");
        Ok(stats)
    }
}

/// Picks the error that explains a failed unit.
///
/// A producer stage that failed on its own comes first, since the branches only saw its
/// truncated output. A producer killed by SIGPIPE comes last: it died because a branch or the
/// estimator stopped reading.
fn first_failure(
    producer: Result<()>,
    split: Result<()>,
    discordant: Result<()>,
    stats: Result<InsertStats>,
) -> Result<InsertStats> {
    let producer = match producer {
        Err(e) if !e.is_broken_pipe() => return Err(e),
        other => other,
    };
    split?;
    discordant?;
    let stats = stats?;
    producer?;
    Ok(stats)
}

/// Copies everything written to `pipe` into the stdin of `sorter`, then waits for it.
fn pump(pipe: &Path, opened: &AtomicBool, mut sorter: ProcessChain) -> Result<()> {
    let stage = format!("pump {}", pipe.display());
    let Some(mut stdin) = sorter.take_stdin() else {
        return Err(ExpressError::pipeline(stage, "sorter stdin not captured"));
    };

    // Blocks until the duplicate marker opens its end.
    let mut fifo = File::open(pipe).map_err(ExpressError::io(pipe))?;
    opened.store(true, Ordering::SeqCst);

    let copied = io::copy(&mut fifo, &mut stdin);
    drop(fifo);
    drop(stdin);
    // The sorter's own failure explains a broken pipe better than the copy error does.
    sorter.wait()?;
    let bytes = copied.map_err(|e| ExpressError::pipeline(stage, e.to_string()))?;
    debug!("Sorted {bytes} bytes from {}", pipe.display());
    Ok(())
}

/// Unblocks a branch still waiting to open `pipe` after the producer is gone, by briefly
/// opening the write end so the branch reads end-of-file.
fn release<T>(pipe: &Path, opened: &AtomicBool, branch: &ScopedJoinHandle<'_, T>) {
    while !opened.load(Ordering::SeqCst) && !branch.is_finished() {
        // Fails with ENXIO until the branch has started opening its end.
        if OpenOptions::new().write(true).custom_flags(libc::O_NONBLOCK).open(pipe).is_ok() {
            debug!("Released reader of {}", pipe.display());
        }
        thread::sleep(RELEASE_INTERVAL);
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>, branch: &str) -> Result<T> {
    handle.join().map_err(|_| ExpressError::pipeline(branch, "branch panicked"))?
}
