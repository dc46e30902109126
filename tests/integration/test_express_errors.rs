//! Failure paths of the `express` command.
//!
//! Every failure exits non-zero, names what went wrong and leaves no workspace behind.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::helpers::{
    FAILING_LUMPY, Fixture, ReadGroup, SLEEPING_LUMPY, assert_failure, paired_sam,
    svexpress_binary, write_alignment_file, write_script,
};

fn read_groups() -> Vec<ReadGroup> {
    vec![ReadGroup::new("rg1", "lib1", "s1")]
}

#[test]
fn test_invalid_input_format() {
    let fixture = Fixture::new();
    std::fs::write(fixture.path("plain.bam"), "not an alignment file").unwrap();

    let stderr = assert_failure(&fixture.express(&["-B", "plain.bam", "-T", "scratch"]));
    assert!(stderr.contains("plain.bam"), "{stderr}");
    assert!(stderr.contains("not a BAM or CRAM"), "{stderr}");
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_missing_input() {
    let fixture = Fixture::new();
    let stderr = assert_failure(&fixture.express(&["-B", "missing.bam"]));
    assert!(stderr.contains("missing.bam"), "{stderr}");
}

#[test]
fn test_cram_without_reference() {
    let fixture = Fixture::new();
    std::fs::write(fixture.path("in.cram"), b"CRAM\x03\x00").unwrap();
    let stderr = assert_failure(&fixture.express(&["-B", "in.cram"]));
    assert!(stderr.contains("requires a reference"), "{stderr}");
}

#[test]
fn test_mismatched_evidence_lists() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 10);
    fixture.input("b.bam", &read_groups(), 10);
    std::fs::write(fixture.path("a.split.bam"), "").unwrap();
    std::fs::write(fixture.path("a.disc.bam"), "").unwrap();

    let stderr = assert_failure(&fixture.express(&[
        "-B",
        "a.bam,b.bam",
        "-S",
        "a.split.bam",
        "-D",
        "a.disc.bam",
    ]));
    assert!(stderr.contains("--splitters"), "{stderr}");
}

#[test]
fn test_only_one_evidence_list() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 10);
    std::fs::write(fixture.path("a.split.bam"), "").unwrap();

    let stderr = assert_failure(&fixture.express(&["-B", "a.bam", "-S", "a.split.bam"]));
    assert!(stderr.contains("--discordants"), "{stderr}");
}

#[test]
fn test_malformed_depth() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 10);
    let stderr = assert_failure(&fixture.express(&["-B", "a.bam", "-d", "a.bedpe"]));
    assert!(stderr.contains("<sample>:<bedpe file>"), "{stderr}");
}

#[test]
fn test_missing_tool_is_a_configuration_error() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 10);
    std::fs::write(fixture.path("bad.toml"), "lumpy = \"/nonexistent/lumpy\"\n").unwrap();

    let output = Command::new(svexpress_binary())
        .current_dir(fixture.dir.path())
        .args(["express", "-B", "a.bam", "-T", "scratch", "--config", "bad.toml"])
        .output()
        .unwrap();
    let stderr = assert_failure(&output);
    assert!(stderr.contains("Configuration error"), "{stderr}");
    assert!(stderr.contains("/nonexistent/lumpy"), "{stderr}");
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_unknown_config_key() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 10);
    std::fs::write(fixture.path("bad.toml"), "lumpyy = \"/x\"\n").unwrap();

    let output = Command::new(svexpress_binary())
        .current_dir(fixture.dir.path())
        .args(["express", "-B", "a.bam", "--config", "bad.toml"])
        .output()
        .unwrap();
    let stderr = assert_failure(&output);
    assert!(stderr.contains("bad.toml"), "{stderr}");
}

#[test]
fn test_failing_caller_removes_output_and_workspace() {
    let fixture = Fixture::with_lumpy(FAILING_LUMPY);
    fixture.input("a.bam", &read_groups(), 1500);

    let stderr = assert_failure(&fixture.express(&["-B", "a.bam", "-T", "scratch"]));
    assert!(stderr.contains("lumpy"), "{stderr}");
    assert!(stderr.contains("139"), "{stderr}");
    assert!(!fixture.path("a.bam.vcf").exists());
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_failing_duplicate_marker() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 1500);
    write_script(
        &fixture.path("bin/samblaster"),
        "#!/bin/sh\ncat >/dev/null\necho 'samblaster: bad input' >&2\nexit 1\n",
    );

    let stderr = assert_failure(&fixture.express(&["-B", "a.bam", "-T", "scratch", "-k"]));
    assert!(stderr.contains("samblaster"), "{stderr}");
    // Retention keeps the tree even on failure.
    assert!(fixture.path("scratch/stats").is_dir());
}

#[test]
fn test_too_few_pairs_is_an_estimator_error() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 100);

    let stderr = assert_failure(&fixture.express(&["-B", "a.bam", "-T", "scratch"]));
    assert!(stderr.contains("insert-size estimator"), "{stderr}");
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_malformed_second_header_fails_before_extraction() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 1500);
    let sam = paired_sam(&[ReadGroup::new("b1", "lib1", "s2")], 1500).replace("ID:b1\t", "");
    write_alignment_file(&fixture.path("b.bam"), &sam);

    let stderr = assert_failure(&fixture.express(&["-B", "a.bam,b.bam", "-T", "scratch"]));
    assert!(stderr.contains("b.bam"), "{stderr}");
    assert!(!stderr.contains("Extracting evidence"), "{stderr}");
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_missing_sample_name_fails_before_extraction() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &read_groups(), 1500);
    let sam = paired_sam(&[ReadGroup::new("b1", "lib1", "s2")], 1500).replace("\tSM:s2", "");
    write_alignment_file(&fixture.path("b.bam"), &sam);

    let stderr = assert_failure(&fixture.express(&["-B", "a.bam,b.bam", "-T", "scratch"]));
    assert!(stderr.contains("Configuration error"), "{stderr}");
    assert!(stderr.contains("SM"), "{stderr}");
    assert!(!stderr.contains("Extracting evidence"), "{stderr}");
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_supplied_evidence_without_sample_name() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &read_groups(), 1500);
    std::fs::write(fixture.path("in.split.bam"), "@HD\tVN:1.6\n@RG\tID:rg1\tSM:s1\n").unwrap();
    std::fs::write(fixture.path("in.disc.bam"), "@HD\tVN:1.6\n@RG\tID:rg1\n").unwrap();

    let stderr = assert_failure(&fixture.express(&[
        "-B",
        "in.bam",
        "-S",
        "in.split.bam",
        "-D",
        "in.disc.bam",
        "-T",
        "scratch",
    ]));
    assert!(stderr.contains("in.disc.bam"), "{stderr}");
    assert!(!stderr.contains("Estimating insert sizes"), "{stderr}");
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_sigterm_removes_workspace_and_output() {
    let fixture = Fixture::with_lumpy(SLEEPING_LUMPY);
    fixture.input("a.bam", &read_groups(), 1500);

    let mut child = fixture
        .express_command(&["-B", "a.bam", "-T", "scratch"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // The caller has started once it touched its marker.
    let deadline = Instant::now() + Duration::from_secs(60);
    while !fixture.lumpy_args.exists() {
        assert!(Instant::now() < deadline, "caller never started");
        assert!(child.try_wait().unwrap().is_none(), "run ended before the caller started");
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(fixture.path("scratch").is_dir());

    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -TERM {}", child.id()))
        .status()
        .unwrap();
    assert!(status.success());

    let status = child.wait().unwrap();
    assert!(!status.success());
    assert!(!fixture.path("scratch").exists());
    assert!(!fixture.path("a.bam.vcf").exists());
}
