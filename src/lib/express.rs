//! The evidence pipeline: from alignment files to a variant-caller run.
//!
//! [`run_express`] validates every input and resolves every tool, then reads the libraries
//! and sample names of every input. All of this happens before the workspace is created, so
//! configuration and input errors never leave partial work behind. It then processes the inputs one sample at a time:
//!
//! 1. extract evidence and insert statistics per library (or, with supplied evidence files,
//!    only compute the statistics)
//! 2. merge the per-library evidence of the sample
//! 3. add the sample's descriptors to the [`DescriptorSet`]
//!
//! and finally runs the caller with all descriptors. The workspace is released when the
//! function returns, whatever the outcome.

use std::io::BufReader;
use std::path::PathBuf;
use std::process::Stdio;

use log::info;

use crate::caller::CallerOptions;
use crate::descriptor::{DepthDescriptor, DescriptorSet, DiscordantDescriptor, SplitDescriptor};
use crate::errors::{ExpressError, Result};
use crate::extraction::Extractor;
use crate::format::{AlignmentFile, AlignmentFormat};
use crate::insert_size::{
    EstimatorParams, InsertSizeEstimator, InsertStats, estimate_from_tail, measure_read_length,
    sam_records,
};
use crate::library::{Library, discover_libraries, resolve_sample_name};
use crate::logging::OperationTimer;
use crate::process::{self, ProcessChain};
use crate::signals;
use crate::tools::toolkit::{AlignmentToolkit, RecordFilter};
use crate::tools::{Backend, DedupParams, ToolConfig, ToolRequirements, Toolchain};
use crate::validation::{validate_file_exists, validate_files_exist, validate_same_length};
use crate::workspace::{SamplePaths, UnitPaths, Workspace};

/// Everything an `express` run needs.
#[derive(Debug, Clone, Default)]
pub struct ExpressOptions {
    /// Input alignment files, one per sample
    pub inputs: Vec<PathBuf>,
    /// Pre-extracted split-read evidence, one per input (or none)
    pub splitters: Vec<PathBuf>,
    /// Pre-extracted discordant-pair evidence, one per input (or none)
    pub discordants: Vec<PathBuf>,
    /// Read-depth evidence
    pub depth: Vec<DepthDescriptor>,
    /// Caller output; defaults to `<first input file name>.vcf` in the working directory
    pub output: Option<PathBuf>,
    /// Reference for decoding CRAM inputs
    pub reference: Option<PathBuf>,
    /// Scratch directory
    pub tmp_dir: Option<PathBuf>,
    /// Keep the scratch directory
    pub keep_temp: bool,
    /// Caller options
    pub caller: CallerOptions,
    /// Duplicate-marker tuning
    pub dedup: DedupParams,
    /// Threads for the alignment toolkit
    pub threads: usize,
    /// Alignment toolkit selection
    pub backend: Backend,
    /// Tool locations
    pub tools: ToolConfig,
}

impl ExpressOptions {
    /// Whether evidence files were supplied instead of being extracted.
    #[must_use]
    pub fn evidence_supplied(&self) -> bool {
        !self.splitters.is_empty() || !self.discordants.is_empty()
    }

    /// The caller output path.
    ///
    /// # Errors
    ///
    /// Returns an input error if no output is given and there is no input to name it after.
    pub fn output_path(&self) -> Result<PathBuf> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        let first = self.inputs.first().ok_or_else(|| ExpressError::InvalidParameter {
            parameter: "bam".to_string(),
            reason: "at least one input file is required".to_string(),
        })?;
        let name = first.file_name().ok_or_else(|| {
            ExpressError::invalid_input("input file", first.display(), "has no file name")
        })?;
        Ok(PathBuf::from(format!("{}.vcf", name.to_string_lossy())))
    }

    /// Checks every input before any work starts.
    ///
    /// # Errors
    ///
    /// Returns the first input or parameter error found.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(ExpressError::InvalidParameter {
                parameter: "bam".to_string(),
                reason: "at least one input file is required".to_string(),
            });
        }
        for input in &self.inputs {
            validate_file_exists(input, "input alignment file")?;
        }
        if self.evidence_supplied() {
            validate_same_length(&self.inputs, "--bam", &self.splitters, "--splitters")?;
            validate_same_length(&self.inputs, "--bam", &self.discordants, "--discordants")?;
            let supplied: Vec<(&PathBuf, &str)> = self
                .splitters
                .iter()
                .map(|path| (path, "split-read evidence file"))
                .chain(self.discordants.iter().map(|path| (path, "discordant-pair evidence file")))
                .collect();
            validate_files_exist(&supplied)?;
        }
        for depth in &self.depth {
            validate_file_exists(&depth.bedpe, "depth BEDPE file")?;
        }
        if let Some(exclude) = &self.caller.exclude {
            validate_file_exists(exclude, "exclude BED file")?;
        }
        if let Some(reference) = &self.reference {
            validate_file_exists(reference, "reference")?;
        }
        Ok(())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ExpressSummary {
    /// Caller output
    pub output: PathBuf,
    /// Descriptors the caller was run with
    pub descriptors: DescriptorSet,
    /// Workspace location, if it was retained
    pub retained_workspace: Option<PathBuf>,
}

/// Runs the whole pipeline.
///
/// # Errors
///
/// Returns the first configuration, input, pipeline or collaborator error. The workspace is
/// removed (unless retained) before returning.
pub fn run_express(options: &ExpressOptions) -> Result<ExpressSummary> {
    options.validate()?;
    let files = options
        .inputs
        .iter()
        .map(|input| AlignmentFile::open(input, options.reference.as_deref()))
        .collect::<Result<Vec<_>>>()?;
    for file in &files {
        info!("{}: {}", file.path.display(), file.format);
    }

    let requirements = ToolRequirements {
        extraction: !options.evidence_supplied(),
        cram_input: files.iter().any(|file| file.format == AlignmentFormat::Cram),
    };
    let tools = Toolchain::resolve(&options.tools, options.backend, options.threads, requirements)?;
    info!("Using {} as the alignment toolkit", tools.toolkit.name());
    info!("Using the {} insert-size estimator", tools.estimator.name());

    let plans = plan_samples(options, &tools, &files)?;

    let output = options.output_path()?;
    let basename =
        output.file_name().map_or_else(|| "svexpress".into(), |name| name.to_string_lossy());
    let workspace = Workspace::create(options.tmp_dir.as_deref(), &basename, options.keep_temp)?;

    let mut descriptors = DescriptorSet::new();
    for depth in &options.depth {
        descriptors.add_depth(depth.clone());
    }

    for (index, (file, plan)) in files.iter().zip(&plans).enumerate() {
        let sample = index + 1;
        let libraries = &plan.libraries;

        let (evidence, stats) = if options.evidence_supplied() {
            let evidence = SamplePaths {
                discordants: options.discordants[index].clone(),
                splitters: options.splitters[index].clone(),
            };
            let stats = supplied_statistics(&tools, file, libraries, &workspace, sample)?;
            (evidence, stats)
        } else {
            let Some(samblaster) = tools.samblaster.as_ref() else {
                return Err(ExpressError::Configuration("samblaster is required".to_string()));
            };
            let extractor = Extractor::new(
                tools.toolkit.as_ref(),
                samblaster,
                tools.estimator.as_ref(),
                options.dedup,
                &workspace,
            );
            let mut units = Vec::with_capacity(libraries.len());
            let mut stats = Vec::with_capacity(libraries.len());
            for (l, library) in libraries.iter().enumerate() {
                check_interrupted()?;
                let unit = workspace.unit(sample, l + 1);
                let timer = OperationTimer::new(&format!(
                    "Extracting evidence of library {} from {}",
                    library.name,
                    file.path.display()
                ));
                stats.push(extractor.extract(file, library, &unit)?);
                timer.log_completion();
                units.push(unit);
            }
            let evidence = workspace.sample(sample);
            crate::merge::consolidate(tools.toolkit.as_ref(), &units, &evidence)?;
            (evidence, stats)
        };

        add_sample_descriptors(&mut descriptors, plan, &evidence, stats);
    }

    check_interrupted()?;
    tools.lumpy.run(
        &options.caller,
        &workspace.caller_prefix(&basename),
        &descriptors,
        &output,
    )?;
    info!("Wrote {}", output.display());

    let retained_workspace = workspace.is_retained().then(|| workspace.root().to_path_buf());
    Ok(ExpressSummary { output, descriptors, retained_workspace })
}

fn check_interrupted() -> Result<()> {
    if signals::interrupted() { Err(ExpressError::Interrupted) } else { Ok(()) }
}

/// Libraries and evidence sample names of one input, known before any extraction.
#[derive(Debug)]
struct SamplePlan {
    libraries: Vec<Library>,
    /// `SM` of the first `@RG` of the discordant evidence
    discordant_sample: String,
    /// `SM` of the first `@RG` of the split evidence
    split_sample: String,
}

/// Reads the header of every input (and of every supplied evidence file).
///
/// Extracted evidence carries the header of its input, so its sample names are those of the
/// input.
fn plan_samples(
    options: &ExpressOptions,
    tools: &Toolchain,
    files: &[AlignmentFile],
) -> Result<Vec<SamplePlan>> {
    let toolkit = tools.toolkit.as_ref();
    let mut plans = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let libraries = discover_libraries(toolkit, file)?;
        info!(
            "{}: {} librar{}",
            file.path.display(),
            libraries.len(),
            if libraries.len() == 1 { "y" } else { "ies" }
        );
        let (discordant_sample, split_sample) = if options.evidence_supplied() {
            (
                resolve_sample_name(toolkit, &options.discordants[index], None)?,
                resolve_sample_name(toolkit, &options.splitters[index], None)?,
            )
        } else {
            let sample = resolve_sample_name(toolkit, &file.path, file.decoding_reference())?;
            (sample.clone(), sample)
        };
        plans.push(SamplePlan { libraries, discordant_sample, split_sample });
    }
    Ok(plans)
}

/// Adds one discordant descriptor per library and one split descriptor for the sample.
fn add_sample_descriptors(
    descriptors: &mut DescriptorSet,
    plan: &SamplePlan,
    evidence: &SamplePaths,
    stats: Vec<InsertStats>,
) {
    for (library, stats) in plan.libraries.iter().zip(stats) {
        descriptors.add_discordant(DiscordantDescriptor {
            sample: plan.discordant_sample.clone(),
            bam: evidence.discordants.clone(),
            stats,
            read_groups: library.read_groups.clone(),
        });
    }

    descriptors.add_split(SplitDescriptor {
        sample: plan.split_sample.clone(),
        bam: evidence.splitters.clone(),
        read_groups: plan.libraries.iter().flat_map(|l| l.read_groups.iter().cloned()).collect(),
    });
}

/// Computes the insert statistics of every library from the trailing records of the file.
fn supplied_statistics(
    tools: &Toolchain,
    file: &AlignmentFile,
    libraries: &[Library],
    workspace: &Workspace,
    sample: usize,
) -> Result<Vec<InsertStats>> {
    let mut all = Vec::with_capacity(libraries.len());
    for (l, library) in libraries.iter().enumerate() {
        check_interrupted()?;
        let unit = workspace.unit(sample, l + 1);
        let timer = OperationTimer::new(&format!(
            "Estimating insert sizes of library {} from {}",
            library.name,
            file.path.display()
        ));
        all.push(library_statistics(
            tools.toolkit.as_ref(),
            tools.estimator.as_ref(),
            file,
            library,
            &unit,
        )?);
        timer.log_completion();
    }
    Ok(all)
}

fn library_statistics(
    toolkit: &dyn AlignmentToolkit,
    estimator: &dyn InsertSizeEstimator,
    file: &AlignmentFile,
    library: &Library,
    unit: &UnitPaths,
) -> Result<InsertStats> {
    let filter = RecordFilter::all().with_read_groups(&library.read_groups, &unit.read_groups);
    filter.write_read_group_file()?;
    let params = EstimatorParams::new(measure_read_length(toolkit, file, &filter)?);

    let command = toolkit.view_command(file, &filter);
    let stage = process::stage_name(&command);
    let mut chain = ProcessChain::spawn_one(command, Stdio::null(), Stdio::piped())?;
    let stdout = chain
        .take_stdout()
        .ok_or_else(|| ExpressError::pipeline(&stage, "stdout not captured"))?;
    let mut records = sam_records(BufReader::new(stdout));
    let stats = estimate_from_tail(estimator, &mut records, &params, &unit.histogram, &unit.stats);
    drop(records);
    match stats {
        Ok(stats) => {
            chain.wait()?;
            Ok(stats)
        }
        Err(e) => {
            chain.terminate();
            Err(e)
        }
    }
}
