//! Invocation of the variant caller (`lumpy`).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, warn};

use crate::descriptor::DescriptorSet;
use crate::errors::{ExpressError, Result};
use crate::logging::OperationTimer;
use crate::process::{self, ProcessChain};

/// Default minimum weight of evidence for a call.
pub const DEFAULT_MIN_SAMPLE_WEIGHT: u32 = 4;

/// Global options of the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerOptions {
    /// Minimum weight across all samples for a call (`-msw`)
    pub min_sample_weight: u32,
    /// Trim threshold of the breakpoint probability curves (`-tt`)
    pub trim_threshold: f64,
    /// Emit the probability curve of each breakpoint (`-P`)
    pub probability_curves: bool,
    /// Regions to exclude (`-x`)
    pub exclude: Option<PathBuf>,
}

impl Default for CallerOptions {
    fn default() -> Self {
        Self {
            min_sample_weight: DEFAULT_MIN_SAMPLE_WEIGHT,
            trim_threshold: 0.0,
            probability_curves: false,
            exclude: None,
        }
    }
}

/// The `lumpy` executable.
#[derive(Debug, Clone)]
pub struct Lumpy {
    path: PathBuf,
}

impl Lumpy {
    /// Creates a caller running the executable at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Builds the caller command line.
    ///
    /// `tmp_prefix` is where the caller keeps its own temporary files.
    #[must_use]
    pub fn command(
        &self,
        options: &CallerOptions,
        tmp_prefix: &Path,
        descriptors: &DescriptorSet,
    ) -> Command {
        let mut command = Command::new(&self.path);
        if options.probability_curves {
            command.arg("-P");
        }
        command
            .arg("-t")
            .arg(tmp_prefix)
            .arg("-msw")
            .arg(options.min_sample_weight.to_string())
            .arg("-tt")
            .arg(options.trim_threshold.to_string());
        if let Some(exclude) = &options.exclude {
            command.arg("-x").arg(exclude);
        }
        command.args(descriptors.to_args());
        command
    }

    /// Runs the caller, writing its standard output to `output`.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if the caller fails; `output` is removed in that case.
    pub fn run(
        &self,
        options: &CallerOptions,
        tmp_prefix: &Path,
        descriptors: &DescriptorSet,
        output: &Path,
    ) -> Result<()> {
        let command = self.command(options, tmp_prefix, descriptors);
        debug!("Caller command: {}", process::describe_command(&command));

        let timer = OperationTimer::new("Calling structural variants");
        let sink = File::create(output).map_err(ExpressError::io(output))?;
        let result = ProcessChain::spawn_one(command, Stdio::null(), Stdio::from(sink))
            .and_then(ProcessChain::wait);
        if result.is_err() {
            if let Err(e) = std::fs::remove_file(output) {
                warn!("Failed to remove incomplete output {}: {e}", output.display());
            }
        } else {
            timer.log_completion();
        }
        result
    }
}
