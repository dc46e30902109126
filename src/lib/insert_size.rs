//! Insert-size estimation for one library.
//!
//! An [`InsertSizeEstimator`] consumes a bounded stream of SAM records, writes a histogram
//! file and returns a one-line summary of the form `mean:<f>\tstdev:<f>`. Two
//! implementations exist: the in-process [`NativeEstimator`] and [`ScriptEstimator`], which
//! delegates to an external `pairend_distro.py`.
//!
//! The adapter functions of this module feed an estimator in the two ways the pipeline needs:
//!
//! - **extraction mode** ([`estimate_from_head`]): the first `sample_cap` records of a stream
//! - **supplied-evidence mode** ([`estimate_from_tail`]): the last `sample_cap` records
//!
//! In both cases the summary is written to the library's stats file and parsed back into an
//! [`InsertStats`].

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use fgoxide::io::Io;
use log::debug;
use noodles::sam::alignment::record::Flags;

use crate::errors::{ExpressError, Result};
use crate::format::AlignmentFile;
use crate::process::{self, ProcessChain};
use crate::signals;
use crate::tools::toolkit::{AlignmentToolkit, RecordFilter};

/// Number of records sampled for estimation.
pub const DEFAULT_SAMPLE_CAP: usize = 1_000_000;

/// Histograms are truncated this many standard deviations above the mean.
pub const DEFAULT_TRIM_SD: f64 = 4.0;

/// Number of leading records inspected to determine the read length.
pub const READ_LENGTH_SAMPLE: usize = 10_000;

/// Minimum number of usable pairs for the native estimator.
pub const MIN_PAIRS: usize = 1_000;

/// Template lengths at or above `median + OUTLIER_MADS * MAD` are discarded.
const OUTLIER_MADS: f64 = 10.0;

const ESTIMATOR: &str = "insert-size estimator";

/// Records read between two checks for a termination signal while buffering a stream.
const INTERRUPT_POLL_RECORDS: usize = 100_000;

/// Parameters passed to an estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorParams {
    /// Maximum read length of the library; the histogram starts here
    pub read_length: u32,
    /// Histogram truncation, in standard deviations above the mean
    pub trim_sd: f64,
    /// Maximum number of records to use
    pub sample_cap: usize,
}

impl EstimatorParams {
    /// Default trimming and sample cap for a library with the given read length.
    #[must_use]
    pub fn new(read_length: u32) -> Self {
        Self { read_length, trim_sd: DEFAULT_TRIM_SD, sample_cap: DEFAULT_SAMPLE_CAP }
    }
}

/// Insert-size statistics of one library.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStats {
    /// Mean insert size
    pub mean: f64,
    /// Standard deviation of the insert size
    pub stdev: f64,
    /// Maximum read length
    pub read_length: u32,
    /// Histogram file
    pub histogram: PathBuf,
}

impl InsertStats {
    /// Parses an estimator summary of the form `mean:<f>\tstdev:<f>`.
    ///
    /// Fields are `key:value` pairs separated by whitespace; unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a collaborator error if `mean` or `stdev` is missing or not a finite number.
    pub fn from_summary(summary: &str, read_length: u32, histogram: PathBuf) -> Result<Self> {
        let field = |name: &str| -> Result<f64> {
            let raw = summary
                .split_whitespace()
                .filter_map(|pair| pair.split_once(':'))
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    ExpressError::collaborator(
                        ESTIMATOR,
                        format!("summary '{}' has no {name} field", summary.trim()),
                    )
                })?;
            raw.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                ExpressError::collaborator(ESTIMATOR, format!("{name} '{raw}' is not a number"))
            })
        };
        Ok(Self { mean: field("mean")?, stdev: field("stdev")?, read_length, histogram })
    }
}

/// A source of SAM text records, one line per item.
pub type SamLines<'a> = dyn Iterator<Item = io::Result<String>> + 'a;

/// Estimates an insert-size distribution from SAM records.
pub trait InsertSizeEstimator: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &'static str;

    /// Consumes `records`, writes the histogram to `histogram` and returns the summary line.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read, the estimate cannot be made, or the
    /// histogram cannot be written.
    fn estimate(
        &self,
        records: &mut SamLines<'_>,
        params: &EstimatorParams,
        histogram: &Path,
    ) -> Result<String>;
}

/// The built-in estimator.
///
/// Uses the first `sample_cap` read-1 records of properly mapped pairs on one reference with a
/// positive template length, discards large outliers and reports the mean and population
/// standard deviation. Histogram rows are `<offset>\t<fraction>` for template lengths from the
/// read length up to `mean + trim_sd * stdev`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEstimator;

impl InsertSizeEstimator for NativeEstimator {
    fn name(&self) -> &'static str {
        "native"
    }

    fn estimate(
        &self,
        records: &mut SamLines<'_>,
        params: &EstimatorParams,
        histogram: &Path,
    ) -> Result<String> {
        let mut lengths = Vec::new();
        for line in records {
            let line = line.map_err(|e| ExpressError::collaborator(ESTIMATOR, e.to_string()))?;
            if let Some(tlen) = usable_template_length(&line) {
                lengths.push(tlen);
                if lengths.len() >= params.sample_cap {
                    break;
                }
            }
        }
        if lengths.len() < MIN_PAIRS {
            return Err(ExpressError::collaborator(
                ESTIMATOR,
                format!("only {} usable pairs, at least {MIN_PAIRS} required", lengths.len()),
            ));
        }

        let lengths = remove_outliers(lengths);
        let (mean, stdev) = mean_and_stdev(&lengths);
        write_histogram(&lengths, mean, stdev, params, histogram)?;
        Ok(format!("mean:{mean}\tstdev:{stdev}"))
    }
}

/// Template length of a record usable for estimation, if it is one.
fn usable_template_length(line: &str) -> Option<i64> {
    if line.starts_with('@') {
        return None;
    }
    let mut fields = line.split('\t');
    let flags = Flags::from_bits_truncate(fields.nth(1)?.parse().ok()?);
    let reference = fields.next()?;
    let mate_reference = fields.nth(3)?;
    let tlen: i64 = fields.nth(1)?.parse().ok()?;

    let usable = flags.is_segmented()
        && !flags.is_unmapped()
        && !flags.is_mate_unmapped()
        && flags.is_first_segment()
        && !flags.is_secondary()
        && !flags.is_supplementary()
        && !flags.is_duplicate()
        && (mate_reference == "=" || mate_reference == reference)
        && tlen > 0;
    usable.then_some(tlen)
}

fn median(sorted: &[i64]) -> i64 {
    sorted[sorted.len() / 2]
}

/// Drops template lengths at or above `median + 10 * MAD`, where MAD is the median of the
/// deviations above the median.
fn remove_outliers(mut lengths: Vec<i64>) -> Vec<i64> {
    lengths.sort_unstable();
    let med = median(&lengths);
    let upper: Vec<i64> = lengths.iter().filter(|&&x| x > med).map(|&x| x - med).collect();
    if upper.is_empty() {
        return lengths;
    }
    let mad = median(&upper);
    #[allow(clippy::cast_precision_loss)]
    let cutoff = med as f64 + OUTLIER_MADS * mad as f64;
    #[allow(clippy::cast_precision_loss)]
    lengths.retain(|&x| (x as f64) < cutoff);
    lengths
}

#[allow(clippy::cast_precision_loss)]
fn mean_and_stdev(lengths: &[i64]) -> (f64, f64) {
    let n = lengths.len() as f64;
    let mean = lengths.iter().map(|&x| x as f64).sum::<f64>() / n;
    let variance = lengths.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn write_histogram(
    lengths: &[i64],
    mean: f64,
    stdev: f64,
    params: &EstimatorParams,
    path: &Path,
) -> Result<()> {
    let start = i64::from(params.read_length);
    let end = (mean + params.trim_sd * stdev) as i64;
    if end <= start {
        return Err(ExpressError::collaborator(
            ESTIMATOR,
            format!("empty histogram range: read length {start} exceeds upper bound {end}"),
        ));
    }

    // Lengths up to and including `end` are counted; rows stop one short of it.
    let rows = usize::try_from(end - start).unwrap_or_default();
    let mut counts = vec![0u64; rows + 1];
    for &x in lengths {
        if (start..=end).contains(&x) {
            counts[(x - start) as usize] += 1;
        }
    }
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Err(ExpressError::collaborator(
            ESTIMATOR,
            format!("no template lengths between {start} and {end}"),
        ));
    }

    let to_error = |e: io::Error| ExpressError::Io { path: path.to_path_buf(), source: e };
    let mut writer = Io::default().new_writer(path).map_err(|e| to_error(io::Error::other(e)))?;
    for (offset, count) in counts[..rows].iter().enumerate() {
        writeln!(writer, "{offset}\t{}", *count as f64 / total as f64).map_err(to_error)?;
    }
    writer.flush().map_err(to_error)
}

/// Runs `pairend_distro.py` with python, feeding records on stdin.
#[derive(Debug, Clone)]
pub struct ScriptEstimator {
    python: PathBuf,
    script: PathBuf,
}

impl ScriptEstimator {
    /// Creates an estimator running `script` with the interpreter `python`.
    #[must_use]
    pub fn new(python: PathBuf, script: PathBuf) -> Self {
        Self { python, script }
    }

    /// Builds the estimator command line.
    #[must_use]
    pub fn command(&self, params: &EstimatorParams, histogram: &Path) -> Command {
        let mut command = Command::new(&self.python);
        command
            .arg(&self.script)
            .arg("-r")
            .arg(params.read_length.to_string())
            .arg("-X")
            .arg(params.trim_sd.to_string())
            .arg("-N")
            .arg(params.sample_cap.to_string())
            .arg("-o")
            .arg(histogram);
        command
    }
}

impl InsertSizeEstimator for ScriptEstimator {
    fn name(&self) -> &'static str {
        "pairend_distro"
    }

    fn estimate(
        &self,
        records: &mut SamLines<'_>,
        params: &EstimatorParams,
        histogram: &Path,
    ) -> Result<String> {
        let command = self.command(params, histogram);
        let stage = process::stage_name(&command);
        let mut chain = ProcessChain::spawn_one(command, Stdio::piped(), Stdio::piped())?;
        let stdout = chain
            .take_stdout()
            .ok_or_else(|| ExpressError::pipeline(&stage, "stdout not captured"))?;
        let reader = thread::spawn(move || {
            let mut text = String::new();
            BufReader::new(stdout).read_to_string(&mut text).map(|_| text)
        });

        if let Some(stdin) = chain.take_stdin() {
            let mut stdin = io::BufWriter::new(stdin);
            for line in records {
                let line = line.map_err(|e| ExpressError::collaborator(ESTIMATOR, e.to_string()))?;
                // The script may stop reading once it has enough records.
                if writeln!(stdin, "{line}").is_err() {
                    break;
                }
            }
            let _ = stdin.flush();
        }

        let text = reader
            .join()
            .map_err(|_| ExpressError::pipeline(&stage, "output reader panicked"))?
            .map_err(|e| ExpressError::pipeline(&stage, format!("reading output failed: {e}")))?;
        chain.wait()?;
        Ok(text.lines().last().unwrap_or_default().to_string())
    }
}

/// Iterates the record lines of SAM text, skipping header lines.
pub fn sam_records<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    reader.lines().filter(|line| !matches!(line, Ok(l) if l.starts_with('@')))
}

/// Maximum sequence length over the first `limit` records (`*` counts as 0).
///
/// # Errors
///
/// Returns an I/O error if the records cannot be read.
pub fn max_read_length(
    records: impl Iterator<Item = io::Result<String>>,
    limit: usize,
) -> io::Result<u32> {
    let mut max = 0;
    for line in records.take(limit) {
        let line = line?;
        let length = match line.split('\t').nth(9) {
            Some("*") | None => 0,
            Some(seq) => u32::try_from(seq.len()).unwrap_or(u32::MAX),
        };
        max = max.max(length);
    }
    Ok(max)
}

/// Determines the read length of a library by streaming its first records through the
/// toolkit and stopping the stream once enough records were read.
///
/// # Errors
///
/// Returns an error if the toolkit cannot be run or the read length is 0.
pub fn measure_read_length(
    toolkit: &dyn AlignmentToolkit,
    file: &AlignmentFile,
    filter: &RecordFilter,
) -> Result<u32> {
    let command = toolkit.view_command(file, filter);
    let stage = process::stage_name(&command);
    let mut chain = ProcessChain::spawn_one(command, Stdio::null(), Stdio::piped())?;
    let stdout = chain
        .take_stdout()
        .ok_or_else(|| ExpressError::pipeline(&stage, "stdout not captured"))?;
    let measured = max_read_length(sam_records(BufReader::new(stdout)), READ_LENGTH_SAMPLE);
    chain.terminate();
    if signals::interrupted() {
        return Err(ExpressError::Interrupted);
    }

    let read_length = measured
        .map_err(|e| ExpressError::pipeline(&stage, format!("reading records failed: {e}")))?;
    if read_length == 0 {
        return Err(ExpressError::collaborator(
            ESTIMATOR,
            format!("could not determine the read length of '{}'", file.path.display()),
        ));
    }
    debug!("Read length of {}: {read_length}", file.path.display());
    Ok(read_length)
}

/// Estimates insert statistics from the first `sample_cap` records of `records`.
///
/// Records beyond the cap are not consumed; callers owning a live stream must drain it.
///
/// # Errors
///
/// Returns an error if the estimator fails or its summary cannot be stored or parsed.
pub fn estimate_from_head(
    estimator: &dyn InsertSizeEstimator,
    records: &mut SamLines<'_>,
    params: &EstimatorParams,
    histogram: &Path,
    stats: &Path,
) -> Result<InsertStats> {
    let mut head = records.take(params.sample_cap);
    let summary = estimator.estimate(&mut head, params, histogram)?;
    record_summary(&summary, params, histogram, stats)
}

/// Estimates insert statistics from the last `sample_cap` records of `records`.
///
/// # Errors
///
/// Returns an error if the records cannot be read or the estimator fails.
pub fn estimate_from_tail(
    estimator: &dyn InsertSizeEstimator,
    records: &mut SamLines<'_>,
    params: &EstimatorParams,
    histogram: &Path,
    stats: &Path,
) -> Result<InsertStats> {
    let window = trailing_window(records, params.sample_cap, signals::interrupted)?;
    let mut tail = window.into_iter().map(Ok::<_, io::Error>);
    let summary = estimator.estimate(&mut tail, params, histogram)?;
    record_summary(&summary, params, histogram, stats)
}

/// Keeps the last `capacity` items of `records`, giving up once `interrupted` returns true.
fn trailing_window(
    records: &mut SamLines<'_>,
    capacity: usize,
    interrupted: impl Fn() -> bool,
) -> Result<VecDeque<String>> {
    let mut window = VecDeque::with_capacity(capacity.min(READ_LENGTH_SAMPLE));
    for (index, line) in records.enumerate() {
        if index % INTERRUPT_POLL_RECORDS == 0 && interrupted() {
            return Err(ExpressError::Interrupted);
        }
        let line = line.map_err(|e| ExpressError::collaborator(ESTIMATOR, e.to_string()))?;
        if window.len() == capacity {
            window.pop_front();
        }
        window.push_back(line);
    }
    Ok(window)
}

fn record_summary(
    summary: &str,
    params: &EstimatorParams,
    histogram: &Path,
    stats: &Path,
) -> Result<InsertStats> {
    let mut contents = summary.trim_end().to_string();
    contents.push('\n');
    std::fs::write(stats, &contents).map_err(ExpressError::io(stats))?;
    InsertStats::from_summary(&contents, params.read_length, histogram.to_path_buf())
}
