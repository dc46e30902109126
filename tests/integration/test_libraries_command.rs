//! Tests of the `libraries` command.

use std::process::Command;

use crate::helpers::{Fixture, ReadGroup, assert_success, svexpress_binary};

fn libraries(fixture: &Fixture, args: &[&str]) -> std::process::Output {
    Command::new(svexpress_binary())
        .current_dir(fixture.dir.path())
        .arg("libraries")
        .arg("--config")
        .arg(&fixture.config)
        .args(["--backend", "samtools"])
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_groups_read_groups_by_library() {
    let fixture = Fixture::new();
    let read_groups = vec![
        ReadGroup::new("rg1", "libB", "s1"),
        ReadGroup::new("rg2", "libA", "s1"),
        ReadGroup::new("rg3", "libB", "s1"),
        ReadGroup { id: "rg4", library: None, sample: "s1" },
    ];
    fixture.input("in.bam", &read_groups, 4);

    let output = libraries(&fixture, &["-i", "in.bam"]);
    assert_success(&output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "library\tread_groups\nlibB\trg1,rg3\nlibA\trg2\nunknown\trg4\n"
    );
}

#[test]
fn test_writes_tsv_file() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &[ReadGroup::new("rg1", "lib1", "s1")], 4);

    let output = libraries(&fixture, &["-i", "in.bam", "-o", "libraries.tsv"]);
    assert_success(&output);
    let tsv = std::fs::read_to_string(fixture.path("libraries.tsv")).unwrap();
    assert_eq!(tsv, "library\tread_groups\nlib1\trg1\n");
}

#[test]
fn test_file_without_read_groups() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &[], 4);

    let output = libraries(&fixture, &["-i", "in.bam"]);
    assert_success(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "library\tread_groups\nunknown\t\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("no read groups"));
}
