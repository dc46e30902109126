//! Evidence descriptors passed to the variant caller.
//!
//! Each descriptor becomes one `-bedpe`, `-pe` or `-sr` argument pair of the form
//! `-pe id:<sample>,bam_file:<file>,...`. Descriptors are collected in a [`DescriptorSet`],
//! which renders them in a fixed order: depth, then discordant, then split.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{ExpressError, Result};
use crate::insert_size::InsertStats;

/// Standard deviations from the mean beyond which a pair is discordant.
pub const DISCORDANT_Z: u32 = 5;
/// Distance to extend evidence intervals past the breakpoint.
pub const BACK_DISTANCE: u32 = 10;
/// Minimum mapping quality of evidence alignments.
pub const MIN_MAPPING_THRESHOLD: u32 = 20;
/// Minimum clipped bases of a split read.
pub const MIN_CLIP: u32 = 20;
/// Weight of extracted discordant and split evidence.
pub const EVIDENCE_WEIGHT: u32 = 1;
/// Weight of user-supplied depth evidence.
pub const DEPTH_WEIGHT: u32 = 4;

/// Read-depth evidence supplied by the user as a BEDPE file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthDescriptor {
    /// Sample id
    pub sample: String,
    /// BEDPE file
    pub bedpe: PathBuf,
}

impl DepthDescriptor {
    /// Always [`DEPTH_WEIGHT`].
    #[must_use]
    pub fn weight(&self) -> u32 {
        DEPTH_WEIGHT
    }
}

impl FromStr for DepthDescriptor {
    type Err = ExpressError;

    /// Parses `<sample>:<bedpe file>`.
    fn from_str(spec: &str) -> Result<Self> {
        match spec.split_once(':') {
            Some((sample, bedpe)) if !sample.is_empty() && !bedpe.is_empty() => {
                Ok(Self { sample: sample.to_string(), bedpe: PathBuf::from(bedpe) })
            }
            _ => Err(ExpressError::InvalidParameter {
                parameter: "depth".to_string(),
                reason: format!("expected <sample>:<bedpe file>, got '{spec}'"),
            }),
        }
    }
}

impl fmt::Display for DepthDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id:{},bedpe_file:{},weight:{}", self.sample, self.bedpe.display(), self.weight())
    }
}

/// Discordant-pair evidence of one library.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscordantDescriptor {
    /// Sample id
    pub sample: String,
    /// Sorted discordant-pair alignments of the sample
    pub bam: PathBuf,
    /// Insert-size statistics of the library
    pub stats: InsertStats,
    /// Read groups of the library; empty for a file without read groups
    pub read_groups: Vec<String>,
}

impl DiscordantDescriptor {
    /// Always [`EVIDENCE_WEIGHT`].
    #[must_use]
    pub fn weight(&self) -> u32 {
        EVIDENCE_WEIGHT
    }
}

impl fmt::Display for DiscordantDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        write!(
            f,
            "id:{},bam_file:{},histo_file:{},mean:{},stdev:{},read_length:{},min_non_overlap:{},\
             discordant_z:{DISCORDANT_Z},back_distance:{BACK_DISTANCE},weight:{},\
             min_mapping_threshold:{MIN_MAPPING_THRESHOLD}",
            self.sample,
            self.bam.display(),
            stats.histogram.display(),
            stats.mean,
            stats.stdev,
            stats.read_length,
            stats.read_length,
            self.weight(),
        )?;
        write_read_groups(f, &self.read_groups)
    }
}

/// Split-read evidence of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDescriptor {
    /// Sample id
    pub sample: String,
    /// Sorted split-read alignments of the sample
    pub bam: PathBuf,
    /// Read groups of all libraries of the sample
    pub read_groups: Vec<String>,
}

impl SplitDescriptor {
    /// Always [`EVIDENCE_WEIGHT`].
    #[must_use]
    pub fn weight(&self) -> u32 {
        EVIDENCE_WEIGHT
    }
}

impl fmt::Display for SplitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{},bam_file:{},back_distance:{BACK_DISTANCE},weight:{},\
             min_mapping_threshold:{MIN_MAPPING_THRESHOLD},min_clip:{MIN_CLIP}",
            self.sample,
            self.bam.display(),
            self.weight(),
        )?;
        write_read_groups(f, &self.read_groups)
    }
}

fn write_read_groups(f: &mut fmt::Formatter<'_>, read_groups: &[String]) -> fmt::Result {
    read_groups.iter().try_for_each(|rg| write!(f, ",read_group:{rg}"))
}

/// Ordered collection of every descriptor of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorSet {
    depth: Vec<DepthDescriptor>,
    discordant: Vec<DiscordantDescriptor>,
    split: Vec<SplitDescriptor>,
}

impl DescriptorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a depth descriptor.
    pub fn add_depth(&mut self, descriptor: DepthDescriptor) {
        self.depth.push(descriptor);
    }

    /// Appends a discordant-pair descriptor.
    pub fn add_discordant(&mut self, descriptor: DiscordantDescriptor) {
        self.discordant.push(descriptor);
    }

    /// Appends a split-read descriptor.
    pub fn add_split(&mut self, descriptor: SplitDescriptor) {
        self.split.push(descriptor);
    }

    /// Depth descriptors, in insertion order.
    #[must_use]
    pub fn depth(&self) -> &[DepthDescriptor] {
        &self.depth
    }

    /// Discordant-pair descriptors, in insertion order.
    #[must_use]
    pub fn discordant(&self) -> &[DiscordantDescriptor] {
        &self.discordant
    }

    /// Split-read descriptors, in insertion order.
    #[must_use]
    pub fn split(&self) -> &[SplitDescriptor] {
        &self.split
    }

    /// Whether the set holds no descriptor at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth.is_empty() && self.discordant.is_empty() && self.split.is_empty()
    }

    /// Caller arguments: `-bedpe`, then `-pe`, then `-sr` descriptors.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let depth = self.depth.iter().map(|d| ("-bedpe", d.to_string()));
        let discordant = self.discordant.iter().map(|d| ("-pe", d.to_string()));
        let split = self.split.iter().map(|d| ("-sr", d.to_string()));
        depth
            .chain(discordant)
            .chain(split)
            .flat_map(|(flag, value)| [flag.to_string(), value])
            .collect()
    }
}
