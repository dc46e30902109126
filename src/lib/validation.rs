//! Input validation utilities
//!
//! Validation functions return structured errors from [`crate::errors`] naming the offending
//! input, and are run before any external tool is started.

use std::fmt::Display;
use std::path::Path;

use crate::errors::{ExpressError, Result};

/// Validate that a file exists
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use svexpress_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/file.bam", "Input BAM");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.is_file() {
        return Err(ExpressError::invalid_input(
            description,
            path_ref.display(),
            "File does not exist",
        ));
    }
    Ok(())
}

/// Validate that multiple files exist
///
/// # Errors
/// Returns an error for the first file that doesn't exist
pub fn validate_files_exist<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<()> {
    for (path, desc) in files {
        validate_file_exists(path, desc)?;
    }
    Ok(())
}

/// Validate that a value is positive (> 0)
///
/// # Errors
/// Returns an error if the value is zero or negative
pub fn validate_positive<T: PartialOrd + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(ExpressError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive, got {value}"),
        });
    }
    Ok(())
}

/// Validate that two lists given for the same inputs have the same length
///
/// # Errors
/// Returns an error naming both parameters if the lengths differ
pub fn validate_same_length<A, B>(a: &[A], a_name: &str, b: &[B], b_name: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(ExpressError::InvalidParameter {
            parameter: b_name.to_string(),
            reason: format!(
                "{} values given for {} {a_name} inputs; exactly one per input is required",
                b.len(),
                a.len()
            ),
        });
    }
    Ok(())
}
