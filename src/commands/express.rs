//! Extract structural-variant evidence and run the caller.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use svexpress_lib::caller::{CallerOptions, DEFAULT_MIN_SAMPLE_WEIGHT};
use svexpress_lib::descriptor::DepthDescriptor;
use svexpress_lib::express::{ExpressOptions, run_express};
use svexpress_lib::logging::OperationTimer;
use svexpress_lib::tools::DedupParams;

use crate::commands::command::Command;
use crate::commands::common::{ReferenceOptions, ToolOptions};

/// Extract evidence from whole-genome alignments and call structural variants.
#[derive(Debug, Parser)]
#[command(
    name = "express",
    about = "\x1b[38;5;166m[CALLING]\x1b[0m        \x1b[36mExtract split/discordant evidence and run lumpy\x1b[0m",
    long_about = r#"
Extract structural-variant evidence from whole-genome alignments and run lumpy.

For every input file (one sample each), the libraries are discovered from the read groups
of the header. Each library's records are duplicate-marked by samblaster, which writes
discordant pairs and split reads to separate streams; these are sorted into per-library
evidence files while the deduplicated stream is sampled to estimate the library's
insert-size distribution. Per-library evidence is merged per sample and lumpy is run with
one discordant-pair descriptor per library and one split-read descriptor per sample.

Pre-extracted evidence can be supplied with --splitters and --discordants (one file per
--bam input, in the same order). Only insert-size statistics are then computed.

EXAMPLES:

  # Call variants on one sample, writing NA12878.bam.vcf
  svexpress express -B NA12878.bam

  # Two samples, CRAM input, read-depth evidence and excluded regions
  svexpress express -B a.cram,b.cram -R hg38.fa -d a:a.bedpe -x exclude.bed -o calls.vcf
"#
)]
pub struct Express {
    /// Input alignment files (BAM or CRAM), comma-separated
    #[arg(short = 'B', long = "bam", value_delimiter = ',', required = true, num_args = 1..)]
    pub bams: Vec<PathBuf>,

    /// Pre-extracted split-read evidence files, one per input
    #[arg(short = 'S', long = "splitters", value_delimiter = ',')]
    pub splitters: Vec<PathBuf>,

    /// Pre-extracted discordant-pair evidence files, one per input
    #[arg(short = 'D', long = "discordants", value_delimiter = ',')]
    pub discordants: Vec<PathBuf>,

    /// Read-depth evidence as <sample>:<bedpe file> (may be repeated)
    #[arg(short = 'd', long = "depth")]
    pub depth: Vec<DepthDescriptor>,

    /// Output VCF [default: <first input file name>.vcf]
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// BED file of regions to exclude
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Option<PathBuf>,

    /// Emit the probability curve of each breakpoint
    #[arg(short = 'P', long = "probability-curves")]
    pub probability_curves: bool,

    /// Minimum evidence weight across all samples for a call
    #[arg(short = 'm', long = "min-sample-weight", default_value_t = DEFAULT_MIN_SAMPLE_WEIGHT)]
    pub min_sample_weight: u32,

    /// Trim threshold of the breakpoint probability curves
    #[arg(short = 'r', long = "trim-threshold", default_value = "0")]
    pub trim_threshold: f64,

    /// Scratch directory [default: a unique directory in the working directory]
    #[arg(short = 'T', long = "tmp-dir")]
    pub tmp_dir: Option<PathBuf>,

    /// Keep the scratch directory
    #[arg(short = 'k', long = "keep-temp")]
    pub keep_temp: bool,

    /// Maximum number of split alignments for a read to be reported as a split read
    #[arg(long = "max-split-count", default_value = "2")]
    pub max_split_count: u32,

    /// Minimum non-overlapping bases between split alignments
    #[arg(long = "min-non-overlap", default_value = "20")]
    pub min_non_overlap: u32,

    #[command(flatten)]
    pub reference: ReferenceOptions,

    #[command(flatten)]
    pub tools: ToolOptions,
}

impl Express {
    /// Converts the parsed arguments into pipeline options.
    fn options(&self) -> Result<ExpressOptions> {
        self.reference.validate()?;
        let tools = self.tools.load()?;
        Ok(ExpressOptions {
            inputs: self.bams.clone(),
            splitters: self.splitters.clone(),
            discordants: self.discordants.clone(),
            depth: self.depth.clone(),
            output: self.output.clone(),
            reference: self.reference.reference.clone(),
            tmp_dir: self.tmp_dir.clone(),
            keep_temp: self.keep_temp,
            caller: CallerOptions {
                min_sample_weight: self.min_sample_weight,
                trim_threshold: self.trim_threshold,
                probability_curves: self.probability_curves,
                exclude: self.exclude.clone(),
            },
            dedup: DedupParams {
                max_split_count: self.max_split_count,
                min_non_overlap: self.min_non_overlap,
            },
            threads: self.tools.threads,
            backend: self.tools.backend,
            tools,
        })
    }
}

impl Command for Express {
    fn execute(&self, command_line: &str) -> Result<()> {
        info!("{command_line}");
        let options = self.options()?;
        let timer = OperationTimer::new("Running svexpress");
        let summary = run_express(&options).context("svexpress run failed")?;

        info!(
            "Called with {} discordant-pair, {} split-read and {} depth descriptors",
            summary.descriptors.discordant().len(),
            summary.descriptors.split().len(),
            summary.descriptors.depth().len()
        );
        if let Some(workspace) = &summary.retained_workspace {
            info!("Intermediate files are in {}", workspace.display());
        }
        info!("Output: {}", summary.output.display());
        timer.log_completion();
        Ok(())
    }
}
