//! CLI command implementations for svexpress.
//!
//! - [`express`] - Extract evidence from alignment files and run the caller
//! - [`sniff`] - Report the format of alignment files
//! - [`libraries`] - List the libraries of an alignment file
//! - [`insert_size`] - Estimate the insert-size distribution of a SAM stream

#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod express;
pub mod insert_size;
pub mod libraries;
pub mod sniff;
