//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use svexpress_lib::tools::toolkit::AlignmentToolkit;
use svexpress_lib::tools::{Backend, ToolConfig, select_toolkit};
use svexpress_lib::validation::{validate_file_exists, validate_positive};

/// Options locating and tuning the external tools.
#[derive(Debug, Clone, Args)]
pub struct ToolOptions {
    /// TOML file with the paths of the external tools
    #[arg(short = 'K', long = "config")]
    pub config: Option<PathBuf>,

    /// Alignment toolkit to use
    #[arg(long = "backend", value_enum, default_value_t = Backend::Auto)]
    pub backend: Backend,

    /// Threads for the alignment toolkit
    #[arg(short = 't', long = "threads", default_value = "1")]
    pub threads: usize,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self { config: None, backend: Backend::Auto, threads: 1 }
    }
}

impl ToolOptions {
    /// Validates the thread count and reads the tool configuration file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if `--threads` is zero or the configuration cannot be read.
    pub fn load(&self) -> anyhow::Result<ToolConfig> {
        validate_positive(self.threads, "threads")?;
        let config = ToolConfig::load(self.config.as_deref())
            .context("Failed to load the tool configuration")?;
        Ok(config)
    }

    /// Resolves the alignment toolkit for commands that only read headers or records.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or no toolkit can be found.
    pub fn toolkit(&self, cram_input: bool) -> anyhow::Result<Box<dyn AlignmentToolkit>> {
        let config = self.load()?;
        let toolkit = select_toolkit(&config, self.backend, self.threads, cram_input)
            .context("Failed to resolve the alignment toolkit")?;
        Ok(toolkit)
    }
}

/// Reference option for decoding CRAM inputs.
#[derive(Debug, Clone, Default, Args)]
pub struct ReferenceOptions {
    /// Reference FASTA, required for CRAM inputs
    #[arg(short = 'R', long = "reference")]
    pub reference: Option<PathBuf>,
}

impl ReferenceOptions {
    /// Validates that the reference exists when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference file does not exist.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(reference) = &self.reference {
            validate_file_exists(reference, "reference")?;
        }
        Ok(())
    }
}
