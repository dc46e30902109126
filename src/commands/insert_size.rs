//! Estimate the insert-size distribution of a SAM stream.

use std::io::{BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use svexpress_lib::insert_size::{
    DEFAULT_SAMPLE_CAP, DEFAULT_TRIM_SD, EstimatorParams, InsertSizeEstimator, NativeEstimator,
    sam_records,
};
use svexpress_lib::logging::OperationTimer;
use svexpress_lib::validation::validate_positive;

use crate::commands::command::Command;

/// Estimate the insert-size distribution of paired-end SAM records read from stdin.
#[derive(Debug, Parser)]
#[command(
    name = "insert-size",
    about = "\x1b[38;5;173m[UTILITIES]\x1b[0m      \x1b[36mEstimate the insert-size distribution of SAM records on stdin\x1b[0m",
    long_about = r#"
Estimate the insert-size distribution of a library from SAM records on stdin.

Uses read 1 of pairs mapped to the same reference with a positive template length, up to
--sample-cap records. Outliers far above the median are discarded. Writes the histogram
(`<offset>\t<fraction>` rows from the read length to mean + X standard deviations) to
--output and prints `mean:<f>\tstdev:<f>` on stdout.

EXAMPLE:

  samtools view -r rg1 input.bam | svexpress insert-size -r 150 -o rg1.histo
"#
)]
pub struct InsertSize {
    /// Read length; the histogram starts here
    #[arg(short = 'r', long = "read-length")]
    pub read_length: u32,

    /// Histogram extent, in standard deviations above the mean
    #[arg(short = 'X', long = "trim-sd", default_value_t = DEFAULT_TRIM_SD)]
    pub trim_sd: f64,

    /// Maximum number of records to use
    #[arg(short = 'N', long = "sample-cap", default_value_t = DEFAULT_SAMPLE_CAP)]
    pub sample_cap: usize,

    /// Output histogram
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl Command for InsertSize {
    fn execute(&self, _command_line: &str) -> Result<()> {
        validate_positive(self.read_length, "read-length")?;
        validate_positive(self.trim_sd, "trim-sd")?;
        validate_positive(self.sample_cap, "sample-cap")?;

        let params = EstimatorParams {
            read_length: self.read_length,
            trim_sd: self.trim_sd,
            sample_cap: self.sample_cap,
        };
        let timer = OperationTimer::new("Estimating insert sizes");
        let stdin = std::io::stdin();
        let mut records = sam_records(BufReader::new(stdin.lock())).take(params.sample_cap);
        let summary = NativeEstimator
            .estimate(&mut records, &params, &self.output)
            .context("Failed to estimate the insert-size distribution")?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", summary.trim_end())?;
        out.flush()?;
        timer.log_completion();
        Ok(())
    }
}
