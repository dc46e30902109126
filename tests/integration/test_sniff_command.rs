//! Tests of the `sniff` command.

use std::process::Command;

use tempfile::TempDir;

use crate::helpers::{assert_failure, assert_success, svexpress_binary, write_alignment_file};

fn sniff(dir: &TempDir, files: &[&str]) -> std::process::Output {
    Command::new(svexpress_binary())
        .current_dir(dir.path())
        .arg("sniff")
        .args(files)
        .output()
        .unwrap()
}

#[test]
fn test_reports_each_format() {
    let dir = TempDir::new().unwrap();
    write_alignment_file(&dir.path().join("a.bam"), "@HD\tVN:1.6\n");
    std::fs::write(dir.path().join("b.cram"), b"CRAM\x03\x00rest").unwrap();

    let output = sniff(&dir, &["a.bam", "b.cram"]);
    assert_success(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a.bam\tBAM\nb.cram\tCRAM\n");
}

#[test]
fn test_invalid_file_fails_naming_it() {
    let dir = TempDir::new().unwrap();
    write_alignment_file(&dir.path().join("a.bam"), "@HD\tVN:1.6\n");
    std::fs::write(dir.path().join("short"), b"\x1f").unwrap();

    let output = sniff(&dir, &["a.bam", "short"]);
    let stderr = assert_failure(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a.bam\tBAM\nshort\tINVALID\n");
    assert!(stderr.contains("short"), "{stderr}");
}

#[test]
fn test_gzip_that_is_not_bam() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reads.fq.gz");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, b"@read1\nACGT\n+\nIIII\n").unwrap();
    encoder.finish().unwrap();

    let output = sniff(&dir, &["reads.fq.gz"]);
    assert_failure(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "reads.fq.gz\tINVALID\n");
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let stderr = assert_failure(&sniff(&dir, &["missing.bam"]));
    assert!(stderr.contains("missing.bam"), "{stderr}");
}
