//! External tool resolution and the command builders for each collaborator.
//!
//! Tool locations come from an optional TOML file (see [`ToolConfig`]); tools that are not
//! configured are looked up on `PATH` by their default names. Every tool a run needs is
//! resolved up front by [`Toolchain::resolve`], so a missing tool fails the run before any
//! work starts.
//!
//! ```toml
//! samtools = "/opt/samtools/bin/samtools"
//! samblaster = "/opt/bin/samblaster"
//! lumpy = "/opt/lumpy/bin/lumpy"
//! # optional: use the external estimator script instead of the built-in one
//! python = "/usr/bin/python3"
//! pairend_distro = "/opt/lumpy/scripts/pairend_distro.py"
//! ```

pub mod samblaster;
pub mod sambamba;
pub mod samtools;
pub mod toolkit;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::{debug, info};
use serde::Deserialize;

pub use samblaster::{DedupParams, Samblaster};
pub use sambamba::Sambamba;
pub use samtools::Samtools;
pub use toolkit::{AlignmentToolkit, RecordFilter};

use crate::caller::Lumpy;
use crate::errors::{ExpressError, Result};
use crate::insert_size::{InsertSizeEstimator, NativeEstimator, ScriptEstimator};

/// Locations of external tools, as read from the `--config` TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// samtools executable
    pub samtools: Option<PathBuf>,
    /// sambamba executable
    pub sambamba: Option<PathBuf>,
    /// samblaster executable
    pub samblaster: Option<PathBuf>,
    /// lumpy executable
    pub lumpy: Option<PathBuf>,
    /// Python interpreter for the estimator script
    pub python: Option<PathBuf>,
    /// External insert-size estimator script; the built-in estimator is used when unset
    pub pairend_distro: Option<PathBuf>,
}

impl ToolConfig {
    /// Reads a tool configuration file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExpressError::Configuration(format!("cannot read '{}': {e}", path.display()))
        })?;
        toml::from_str(&text).map_err(|e| {
            ExpressError::Configuration(format!("cannot parse '{}': {e}", path.display()))
        })
    }

    /// Reads `path` if given, otherwise returns the empty configuration.
    ///
    /// # Errors
    ///
    /// See [`ToolConfig::from_file`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    /// Resolves a tool: the configured path if set (which must exist), else a `PATH` lookup.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the tool cannot be found.
    pub fn locate(&self, tool: Tool) -> Result<PathBuf> {
        match self.configured(tool) {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(ExpressError::Configuration(format!(
                "configured {} '{}' does not exist",
                tool.key(),
                path.display()
            ))),
            None => find_executable(tool.default_name()).ok_or_else(|| {
                ExpressError::Configuration(format!(
                    "{} not found on PATH (set `{}` in the --config file)",
                    tool.default_name(),
                    tool.key()
                ))
            }),
        }
    }

    fn configured(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::Samtools => self.samtools.as_ref(),
            Tool::Sambamba => self.sambamba.as_ref(),
            Tool::Samblaster => self.samblaster.as_ref(),
            Tool::Lumpy => self.lumpy.as_ref(),
            Tool::Python => self.python.as_ref(),
            Tool::PairendDistro => self.pairend_distro.as_ref(),
        }
    }
}

/// External tools known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// samtools
    Samtools,
    /// sambamba
    Sambamba,
    /// samblaster
    Samblaster,
    /// lumpy
    Lumpy,
    /// Python interpreter
    Python,
    /// pairend_distro.py estimator script
    PairendDistro,
}

impl Tool {
    /// Key of the tool in the configuration file.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Tool::Samtools => "samtools",
            Tool::Sambamba => "sambamba",
            Tool::Samblaster => "samblaster",
            Tool::Lumpy => "lumpy",
            Tool::Python => "python",
            Tool::PairendDistro => "pairend_distro",
        }
    }

    /// Executable name searched on `PATH`.
    #[must_use]
    pub fn default_name(self) -> &'static str {
        match self {
            Tool::Python => "python3",
            Tool::PairendDistro => "pairend_distro.py",
            other => other.key(),
        }
    }
}

/// Which alignment toolkit to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// sambamba when available (and no input is CRAM), otherwise samtools
    #[default]
    Auto,
    /// Always samtools
    Samtools,
    /// Always sambamba
    Sambamba,
}

/// Searches `PATH` for an executable file called `name`.
#[must_use]
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Selects the alignment toolkit once, at startup.
///
/// # Errors
///
/// Returns a configuration error if the requested (or any, for `auto`) toolkit is missing.
pub fn select_toolkit(
    config: &ToolConfig,
    backend: Backend,
    threads: usize,
    cram_input: bool,
) -> Result<Box<dyn AlignmentToolkit>> {
    let toolkit: Box<dyn AlignmentToolkit> = match backend {
        Backend::Samtools => Box::new(Samtools::new(config.locate(Tool::Samtools)?, threads)),
        Backend::Sambamba => Box::new(Sambamba::new(config.locate(Tool::Sambamba)?, threads)),
        Backend::Auto => match config.locate(Tool::Sambamba) {
            Ok(path) if !cram_input => Box::new(Sambamba::new(path, threads)),
            _ => Box::new(Samtools::new(config.locate(Tool::Samtools)?, threads)),
        },
    };
    debug!("Selected alignment toolkit: {}", toolkit.name());
    Ok(toolkit)
}

/// Selects the insert-size estimator: the configured script, or the built-in estimator.
///
/// # Errors
///
/// Returns a configuration error if the script is configured but it or python is missing.
pub fn select_estimator(config: &ToolConfig) -> Result<Box<dyn InsertSizeEstimator>> {
    if config.pairend_distro.is_some() {
        let script = config.locate(Tool::PairendDistro)?;
        let python = config.locate(Tool::Python)?;
        info!("Using external insert-size estimator {}", script.display());
        Ok(Box::new(ScriptEstimator::new(python, script)))
    } else {
        Ok(Box::new(NativeEstimator))
    }
}

/// What a run needs from the toolchain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolRequirements {
    /// Evidence must be extracted (samblaster required)
    pub extraction: bool,
    /// At least one input is CRAM
    pub cram_input: bool,
}

/// Every external collaborator of an `express` run, resolved before any work starts.
pub struct Toolchain {
    /// Alignment toolkit strategy
    pub toolkit: Box<dyn AlignmentToolkit>,
    /// Duplicate marker, present when extraction is required
    pub samblaster: Option<Samblaster>,
    /// Variant caller
    pub lumpy: Lumpy,
    /// Insert-size estimator strategy
    pub estimator: Box<dyn InsertSizeEstimator>,
}

impl Toolchain {
    /// Resolves every tool required by `requirements`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first tool that cannot be resolved.
    pub fn resolve(
        config: &ToolConfig,
        backend: Backend,
        threads: usize,
        requirements: ToolRequirements,
    ) -> Result<Self> {
        let lumpy = Lumpy::new(config.locate(Tool::Lumpy)?);
        let samblaster = if requirements.extraction {
            Some(Samblaster::new(config.locate(Tool::Samblaster)?))
        } else {
            None
        };
        let toolkit = select_toolkit(config, backend, threads, requirements.cram_input)?;
        let estimator = select_estimator(config)?;
        Ok(Self { toolkit, samblaster, lumpy, estimator })
    }
}
