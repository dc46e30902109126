//! Alignment file format detection.
//!
//! Files are classified by their magic bytes only; no records are decoded:
//!
//! - **CRAM**: the file starts with the ASCII literal `CRAM`.
//! - **BAM**: the file starts with the gzip magic (`1f 8b`) and the decompressed stream
//!   starts with the ASCII literal `BAM`.
//!
//! Anything else is [`AlignmentFormat::Invalid`].

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::errors::{ExpressError, Result};

const CRAM_MAGIC: &[u8; 4] = b"CRAM";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BAM_MAGIC: &[u8; 3] = b"BAM";

/// Format of an alignment file as determined by [`sniff_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentFormat {
    /// BGZF-compressed BAM
    Bam,
    /// CRAM (requires a reference for decoding)
    Cram,
    /// Neither BAM nor CRAM
    Invalid,
}

impl AlignmentFormat {
    /// Returns true for formats the pipeline can process.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != AlignmentFormat::Invalid
    }
}

impl fmt::Display for AlignmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlignmentFormat::Bam => "BAM",
            AlignmentFormat::Cram => "CRAM",
            AlignmentFormat::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// Classifies a file by reading a bounded prefix of it.
///
/// # Errors
///
/// Returns an error only if the file cannot be opened; unreadable or unrecognised content
/// yields [`AlignmentFormat::Invalid`].
pub fn sniff_format<P: AsRef<Path>>(path: P) -> Result<AlignmentFormat> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        ExpressError::invalid_input("alignment file", path.display(), format!("cannot open: {e}"))
    })?;

    let mut prefix = Vec::with_capacity(CRAM_MAGIC.len());
    if (&mut file).take(CRAM_MAGIC.len() as u64).read_to_end(&mut prefix).is_err() {
        return Ok(AlignmentFormat::Invalid);
    }

    if prefix.as_slice() == CRAM_MAGIC {
        return Ok(AlignmentFormat::Cram);
    }
    if prefix.len() < GZIP_MAGIC.len() || prefix[..2] != GZIP_MAGIC {
        return Ok(AlignmentFormat::Invalid);
    }

    if file.seek(SeekFrom::Start(0)).is_err() {
        return Ok(AlignmentFormat::Invalid);
    }
    let mut decompressed = Vec::with_capacity(BAM_MAGIC.len());
    let mut decoder = MultiGzDecoder::new(file).take(BAM_MAGIC.len() as u64);
    let read = decoder.read_to_end(&mut decompressed);
    match read {
        Ok(_) if decompressed.as_slice() == BAM_MAGIC => Ok(AlignmentFormat::Bam),
        _ => Ok(AlignmentFormat::Invalid),
    }
}

/// An input alignment file together with its detected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentFile {
    /// Path to the file
    pub path: PathBuf,
    /// Detected format (never `Invalid` once constructed through [`AlignmentFile::open`])
    pub format: AlignmentFormat,
    /// Reference FASTA, required for CRAM decoding
    pub reference: Option<PathBuf>,
}

impl AlignmentFile {
    /// Sniffs `path` and validates that it can be decoded.
    ///
    /// # Errors
    ///
    /// Returns an input validation error if the file is not BAM/CRAM, or if it is CRAM and
    /// no reference was given.
    pub fn open(path: impl Into<PathBuf>, reference: Option<&Path>) -> Result<Self> {
        let path = path.into();
        let format = sniff_format(&path)?;
        match format {
            AlignmentFormat::Invalid => Err(ExpressError::invalid_input(
                "alignment file",
                path.display(),
                "not a BAM or CRAM file (bad magic bytes)",
            )),
            AlignmentFormat::Cram if reference.is_none() => Err(ExpressError::invalid_input(
                "alignment file",
                path.display(),
                "CRAM input requires a reference (--reference)",
            )),
            _ => Ok(Self { path, format, reference: reference.map(Path::to_path_buf) }),
        }
    }

    /// Reference to pass to decoding tools, only set for CRAM inputs.
    #[must_use]
    pub fn decoding_reference(&self) -> Option<&Path> {
        match self.format {
            AlignmentFormat::Cram => self.reference.as_deref(),
            _ => None,
        }
    }
}
