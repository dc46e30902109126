//! Custom error types for svexpress operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for svexpress operations
pub type Result<T> = std::result::Result<T, ExpressError>;

/// Error type for svexpress operations
#[derive(Error, Debug)]
pub enum ExpressError {
    /// A required tool, configuration file or header field could not be resolved
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An input file or argument failed validation
    #[error("Invalid {description} '{path}': {reason}")]
    InvalidInput {
        /// Human-readable description of the input (e.g., "Input BAM")
        description: String,
        /// Path or value that failed validation
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A stage of a process pipeline failed
    #[error("Pipeline stage '{stage}' failed: {reason}")]
    Pipeline {
        /// Name of the failing stage (usually the program name)
        stage: String,
        /// Exit status or I/O failure description, with captured stderr when available
        reason: String,
        /// Whether the stage was killed by SIGPIPE after its reader went away
        broken_pipe: bool,
    },

    /// A collaborator produced malformed or inconsistent output
    #[error("Unexpected output from {collaborator}: {reason}")]
    Collaborator {
        /// Which collaborator misbehaved (e.g., "insert-size estimator")
        collaborator: String,
        /// Explanation of the problem
        reason: String,
    },

    /// The run was interrupted by a signal
    #[error("Interrupted by signal")]
    Interrupted,

    /// An I/O failure on a specific path
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path being accessed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ExpressError {
    /// Builds an [`ExpressError::InvalidInput`] from displayable parts.
    pub fn invalid_input(
        description: impl Into<String>,
        path: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            description: description.into(),
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Builds an [`ExpressError::Pipeline`] error.
    pub fn pipeline(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pipeline { stage: stage.into(), reason: reason.into(), broken_pipe: false }
    }

    /// Builds an [`ExpressError::Pipeline`] error for a stage killed by SIGPIPE.
    pub fn broken_pipe(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pipeline { stage: stage.into(), reason: reason.into(), broken_pipe: true }
    }

    /// True for a stage that died only because the stage reading its output stopped.
    #[must_use]
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Pipeline { broken_pipe: true, .. })
    }

    /// Builds an [`ExpressError::Collaborator`] error.
    pub fn collaborator(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Collaborator { collaborator: collaborator.into(), reason: reason.into() }
    }

    /// Returns a closure that wraps an `io::Error` with the given path.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
