//! Consolidation of per-library evidence into per-sample evidence files.

use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::{ExpressError, Result};
use crate::logging::{OperationTimer, format_count};
use crate::process;
use crate::tools::toolkit::{AlignmentToolkit, count_records};
use crate::workspace::{SamplePaths, UnitPaths};

/// Merges (or, for a single library, renames) the evidence files of a sample's units into its
/// per-sample files. The per-library files no longer exist afterwards.
///
/// # Errors
///
/// Returns a pipeline error if merging fails, or a collaborator error if a merged file does
/// not hold exactly the records of its inputs.
pub fn consolidate(
    toolkit: &dyn AlignmentToolkit,
    units: &[UnitPaths],
    sample: &SamplePaths,
) -> Result<()> {
    let discordants: Vec<PathBuf> = units.iter().map(|unit| unit.discordants.clone()).collect();
    let splitters: Vec<PathBuf> = units.iter().map(|unit| unit.splitters.clone()).collect();
    merge_evidence(toolkit, &discordants, &sample.discordants)?;
    merge_evidence(toolkit, &splitters, &sample.splitters)?;
    Ok(())
}

/// Merges `inputs` into `output`, verifying the record count, and removes the inputs.
///
/// # Errors
///
/// See [`consolidate`].
pub fn merge_evidence(
    toolkit: &dyn AlignmentToolkit,
    inputs: &[PathBuf],
    output: &Path,
) -> Result<()> {
    match inputs {
        [] => Err(ExpressError::pipeline(
            format!("{} merge", toolkit.name()),
            format!("no evidence files to merge into '{}'", output.display()),
        )),
        [single] => {
            debug!("Promoting {} to {}", single.display(), output.display());
            std::fs::rename(single, output).map_err(ExpressError::io(single))
        }
        _ => {
            let timer = OperationTimer::new(&format!(
                "Merging {} evidence files into {}",
                inputs.len(),
                output.display()
            ));
            let mut expected = 0;
            for input in inputs {
                expected += count_records(toolkit, input)?;
            }

            process::run(toolkit.merge_command(output, inputs))?;

            let merged = count_records(toolkit, output)?;
            if merged != expected {
                return Err(ExpressError::collaborator(
                    format!("{} merge", toolkit.name()),
                    format!(
                        "'{}' holds {} records but its inputs hold {}",
                        output.display(),
                        format_count(merged),
                        format_count(expected)
                    ),
                ));
            }
            for input in inputs {
                std::fs::remove_file(input).map_err(ExpressError::io(input))?;
            }
            timer.log_completion_with(merged, "records");
            Ok(())
        }
    }
}
