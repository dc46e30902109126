//! Helper utilities for integration tests.


use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

pub use tools::*;

/// Path of the built `svexpress` binary.
pub fn svexpress_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_svexpress"))
}

/// Read group of a synthetic alignment file.
#[derive(Debug, Clone)]
pub struct ReadGroup {
    pub id: &'static str,
    pub library: Option<&'static str>,
    pub sample: &'static str,
}

impl ReadGroup {
    pub fn new(id: &'static str, library: &'static str, sample: &'static str) -> Self {
        Self { id, library: Some(library), sample }
    }
}

/// SAM text of `pairs` read pairs spread round-robin over `read_groups`.
///
/// Every tenth pair is improper with an `SA` tag on read 1, the next is improper without
/// one, and the rest are proper pairs. Template lengths are `300 + i % 50`, reads are 100bp.
pub fn paired_sam(read_groups: &[ReadGroup], pairs: usize) -> String {
    let mut text = String::from("@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:10000000\n");
    for rg in read_groups {
        text.push_str(&format!("@RG\tID:{}\tSM:{}", rg.id, rg.sample));
        if let Some(library) = rg.library {
            text.push_str(&format!("\tLB:{library}"));
        }
        text.push('\n');
    }
    let seq = "ACGT".repeat(25);
    for i in 0..pairs {
        let rg = if read_groups.is_empty() {
            String::new()
        } else {
            format!("\tRG:Z:{}", read_groups[i % read_groups.len()].id)
        };
        let tlen = 300 + (i % 50);
        let (flag1, flag2, sa) = match i % 10 {
            0 => (97, 145, "\tSA:Z:chr1,90000,+,50M50S,60,0;"),
            1 => (65, 129, ""),
            _ => (99, 147, ""),
        };
        let pos = 1000 + i * 10;
        let mate = pos + tlen - 100;
        text.push_str(&format!(
            "p{i}\t{flag1}\tchr1\t{pos}\t60\t100M\t=\t{mate}\t{tlen}\t{seq}\t*{rg}{sa}\n"
        ));
        text.push_str(&format!(
            "p{i}\t{flag2}\tchr1\t{mate}\t60\t100M\t=\t{pos}\t-{tlen}\t{seq}\t*{rg}\n"
        ));
    }
    text
}

/// Writes `sam` as a file that sniffs as BAM and that the fake samtools can decode.
pub fn write_alignment_file(path: &Path, sam: &str) -> PathBuf {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::fast());
    encoder.write_all(b"BAM\x01\n").unwrap();
    encoder.write_all(sam.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path.to_path_buf()
}

/// A scratch directory holding fake tools, their configuration and the test inputs.
pub struct Fixture {
    pub dir: TempDir,
    pub config: PathBuf,
    pub lumpy_args: PathBuf,
}

impl Fixture {
    /// Creates fake samtools, samblaster and a working lumpy.
    pub fn new() -> Self {
        Self::with_lumpy(FAKE_LUMPY)
    }

    /// Creates fake samtools and samblaster and a lumpy running `lumpy`.
    pub fn with_lumpy(lumpy: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        let samtools = write_script(&bin.join("samtools"), FAKE_SAMTOOLS);
        let samblaster = write_script(&bin.join("samblaster"), FAKE_SAMBLASTER);
        let lumpy = write_script(&bin.join("lumpy"), lumpy);
        let config = dir.path().join("tools.toml");
        std::fs::write(
            &config,
            format!(
                "samtools = \"{}\"\nsamblaster = \"{}\"\nlumpy = \"{}\"\n",
                samtools.display(),
                samblaster.display(),
                lumpy.display()
            ),
        )
        .unwrap();
        let lumpy_args = dir.path().join("lumpy.args");
        Self { dir, config, lumpy_args }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes a synthetic input file named `name`.
    pub fn input(&self, name: &str, read_groups: &[ReadGroup], pairs: usize) -> PathBuf {
        write_alignment_file(&self.path(name), &paired_sam(read_groups, pairs))
    }

    /// `svexpress express` in the fixture directory with the fake toolchain.
    pub fn express_command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(svexpress_binary());
        command
            .current_dir(self.dir.path())
            .env("LUMPY_ARGS", &self.lumpy_args)
            .arg("express")
            .arg("--config")
            .arg(&self.config)
            .args(["--backend", "samtools"])
            .args(args);
        command
    }

    /// Runs `svexpress express` to completion.
    pub fn express(&self, args: &[&str]) -> Output {
        self.express_command(args).output().unwrap()
    }

    /// Arguments the fake lumpy was called with.
    pub fn lumpy_args(&self) -> Vec<String> {
        std::fs::read_to_string(&self.lumpy_args)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Values following each occurrence of `flag` in the lumpy arguments.
    pub fn descriptors(&self, flag: &str) -> Vec<String> {
        let args = self.lumpy_args();
        args.windows(2).filter(|w| w[0] == flag).map(|w| w[1].clone()).collect()
    }

    /// Names of entries in the fixture directory starting with `prefix`.
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<String> {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(prefix))
            .collect()
    }
}

/// Value of `key` in a `key:value,...` descriptor.
pub fn descriptor_field<'a>(descriptor: &'a str, key: &str) -> Vec<&'a str> {
    descriptor
        .split(',')
        .filter_map(|field| field.split_once(':'))
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v)
        .collect()
}

/// Asserts that a command succeeded, printing its stderr otherwise.
pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed with {}:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Asserts that a command failed and returns its stderr.
pub fn assert_failure(output: &Output) -> String {
    assert!(!output.status.success(), "command unexpectedly succeeded");
    String::from_utf8_lossy(&output.stderr).into_owned()
}
