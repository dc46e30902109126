//! Discovery of sequencing libraries and samples from alignment headers.
//!
//! Read groups are grouped into libraries by their `LB` field. Read groups without `LB` all
//! belong to the [`UNKNOWN_LIBRARY`]. Library order follows the first appearance of each
//! library in the header, so repeated discovery on the same file always yields the same
//! order (and therefore the same workspace file names).

use std::path::Path;

use log::warn;
use noodles::sam::Header;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;

use crate::errors::{ExpressError, Result};
use crate::format::AlignmentFile;
use crate::tools::toolkit::{AlignmentToolkit, read_header};

/// Library name used for read groups without an `LB` field.
pub const UNKNOWN_LIBRARY: &str = "unknown";

/// A set of read groups sharing one insert-size distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    /// Library name (`LB`), or [`UNKNOWN_LIBRARY`]
    pub name: String,
    /// Read-group IDs in header order; empty for the implicit library of a file without
    /// read groups, meaning "no filter"
    pub read_groups: Vec<String>,
}

/// Groups the read groups of `header` into libraries.
///
/// Returns an empty vector when the header has no read groups.
#[must_use]
pub fn libraries_from_header(header: &Header) -> Vec<Library> {
    let mut libraries: Vec<Library> = Vec::new();
    for (id, rg) in header.read_groups() {
        let name = rg
            .other_fields()
            .get(&rg_tag::LIBRARY)
            .map_or_else(|| UNKNOWN_LIBRARY.to_string(), ToString::to_string);
        match libraries.iter_mut().find(|library| library.name == name) {
            Some(library) => library.read_groups.push(id.to_string()),
            None => libraries.push(Library { name, read_groups: vec![id.to_string()] }),
        }
    }
    libraries
}

/// Discovers the libraries of an alignment file through the toolkit's header reader.
///
/// A file without read groups yields a single implicit library (with a warning).
///
/// # Errors
///
/// Returns an error if the header cannot be read or parsed.
pub fn discover_libraries(
    toolkit: &dyn AlignmentToolkit,
    file: &AlignmentFile,
) -> Result<Vec<Library>> {
    let header = read_header(toolkit, &file.path, file.decoding_reference())?;
    let libraries = libraries_from_header(&header);
    if libraries.is_empty() {
        warn!(
            "{} has no read groups; paired-end statistics may be degraded. Treating it as a \
             single library.",
            file.path.display()
        );
        return Ok(vec![Library { name: UNKNOWN_LIBRARY.to_string(), read_groups: Vec::new() }]);
    }
    Ok(libraries)
}

/// Returns the `SM` field of the first read group of `header`, if any.
#[must_use]
pub fn sample_from_header(header: &Header) -> Option<String> {
    header
        .read_groups()
        .values()
        .next()
        .and_then(|rg| rg.other_fields().get(&rg_tag::SAMPLE))
        .map(ToString::to_string)
}

/// Resolves the sample name of an evidence file from the first `@RG` line of its header.
///
/// # Errors
///
/// Returns a configuration error if the first read group has no sample name (or there is no
/// read group at all), or any error from reading the header.
pub fn resolve_sample_name(
    toolkit: &dyn AlignmentToolkit,
    path: &Path,
    reference: Option<&Path>,
) -> Result<String> {
    let header = read_header(toolkit, path, reference)?;
    sample_from_header(&header).ok_or_else(|| {
        ExpressError::Configuration(format!(
            "no sample name (SM) on the first @RG line of '{}'",
            path.display()
        ))
    })
}
