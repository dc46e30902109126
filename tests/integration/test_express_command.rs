//! End-to-end tests of the `express` command.

use crate::helpers::{
    Fixture, ReadGroup, assert_success, descriptor_field, paired_sam, write_alignment_file,
};

fn one_library() -> Vec<ReadGroup> {
    vec![ReadGroup::new("rg1", "lib1", "NA12878"), ReadGroup::new("rg2", "lib1", "NA12878")]
}

/// `##evidence=<file>,<records>` lines printed by the fake lumpy, as (file, records).
fn evidence_counts(vcf: &str) -> Vec<(String, usize)> {
    vcf.lines()
        .filter_map(|line| line.strip_prefix("##evidence="))
        .filter_map(|rest| rest.rsplit_once(','))
        .map(|(file, n)| (file.to_string(), n.parse().unwrap()))
        .collect()
}

#[test]
fn test_single_library_defaults() {
    let fixture = Fixture::new();
    fixture.input("NA12878.bam", &one_library(), 3000);

    let output = fixture.express(&["-B", "NA12878.bam"]);
    assert_success(&output);

    let vcf_path = fixture.path("NA12878.bam.vcf");
    assert!(vcf_path.is_file(), "default output should be <input>.vcf in the working directory");

    let pe = fixture.descriptors("-pe");
    let sr = fixture.descriptors("-sr");
    assert_eq!(pe.len(), 1);
    assert_eq!(sr.len(), 1);
    assert!(fixture.descriptors("-bedpe").is_empty());

    assert_eq!(descriptor_field(&pe[0], "id"), vec!["NA12878"]);
    assert_eq!(descriptor_field(&pe[0], "read_length"), vec!["100"]);
    assert_eq!(descriptor_field(&pe[0], "min_non_overlap"), vec!["100"]);
    assert_eq!(descriptor_field(&pe[0], "discordant_z"), vec!["5"]);
    assert_eq!(descriptor_field(&pe[0], "weight"), vec!["1"]);
    assert_eq!(descriptor_field(&pe[0], "read_group"), vec!["rg1", "rg2"]);
    let mean: f64 = descriptor_field(&pe[0], "mean")[0].parse().unwrap();
    assert!((mean - 324.5).abs() < 1.0, "mean {mean}");

    assert_eq!(descriptor_field(&sr[0], "id"), vec!["NA12878"]);
    assert_eq!(descriptor_field(&sr[0], "min_clip"), vec!["20"]);
    assert_eq!(descriptor_field(&sr[0], "read_group"), vec!["rg1", "rg2"]);

    // 300 split reads; 1,200 records of improper pairs.
    let vcf = std::fs::read_to_string(&vcf_path).unwrap();
    let counts = evidence_counts(&vcf);
    assert_eq!(counts.len(), 2);
    assert!(counts[0].0.ends_with("sample1.discordants.bam"));
    assert_eq!(counts[0].1, 1200);
    assert!(counts[1].0.ends_with("sample1.splitters.bam"));
    assert_eq!(counts[1].1, 300);

    let args = fixture.lumpy_args();
    assert_eq!(args[0], "-t");
    assert_eq!(&args[2..6], &["-msw", "4", "-tt", "0"]);

    // The workspace is removed; only the output carries the basename.
    assert_eq!(fixture.entries_with_prefix("NA12878.bam.vcf"), vec!["NA12878.bam.vcf"]);
}

#[test]
fn test_two_libraries_merge_per_sample() {
    let fixture = Fixture::new();
    let read_groups =
        vec![ReadGroup::new("rg1", "libA", "s1"), ReadGroup::new("rg2", "libB", "s1")];
    fixture.input("s1.bam", &read_groups, 2400);

    let output = fixture.express(&["-B", "s1.bam", "-o", "calls.vcf"]);
    assert_success(&output);

    let pe = fixture.descriptors("-pe");
    assert_eq!(pe.len(), 2);
    assert_eq!(descriptor_field(&pe[0], "read_group"), vec!["rg1"]);
    assert_eq!(descriptor_field(&pe[1], "read_group"), vec!["rg2"]);
    assert_eq!(descriptor_field(&pe[0], "bam_file"), descriptor_field(&pe[1], "bam_file"));
    assert_ne!(descriptor_field(&pe[0], "histo_file"), descriptor_field(&pe[1], "histo_file"));

    let sr = fixture.descriptors("-sr");
    assert_eq!(sr.len(), 1);
    assert_eq!(descriptor_field(&sr[0], "read_group"), vec!["rg1", "rg2"]);

    // Merged evidence holds the records of both libraries.
    let vcf = std::fs::read_to_string(fixture.path("calls.vcf")).unwrap();
    let counts = evidence_counts(&vcf);
    assert_eq!(counts.iter().filter(|(_, n)| *n == 960).count(), 2);
    assert_eq!(counts.last().unwrap().1, 240);
}

#[test]
fn test_two_samples_and_depth_ordering() {
    let fixture = Fixture::new();
    fixture.input("a.bam", &[ReadGroup::new("a1", "la", "sampleA")], 1500);
    fixture.input("b.bam", &[ReadGroup::new("b1", "lb", "sampleB")], 1500);
    std::fs::write(fixture.path("a.bedpe"), "chr1\t1\t2\tchr1\t3\t4\n").unwrap();

    let output = fixture.express(&["-B", "a.bam,b.bam", "-d", "sampleA:a.bedpe"]);
    assert_success(&output);
    assert!(fixture.path("a.bam.vcf").is_file());

    let args = fixture.lumpy_args();
    let flags: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|arg| matches!(*arg, "-bedpe" | "-pe" | "-sr"))
        .collect();
    assert_eq!(flags, vec!["-bedpe", "-pe", "-pe", "-sr", "-sr"]);
    assert_eq!(fixture.descriptors("-bedpe"), vec!["id:sampleA,bedpe_file:a.bedpe,weight:4"]);

    let pe = fixture.descriptors("-pe");
    let ids: Vec<&str> = pe.iter().map(|d| descriptor_field(d, "id")[0]).collect();
    assert_eq!(ids, vec!["sampleA", "sampleB"]);
}

#[test]
fn test_file_without_read_groups() {
    let fixture = Fixture::new();
    write_alignment_file(&fixture.path("norg.bam"), &paired_sam(&[], 1500));

    let output = fixture.express(&["-B", "norg.bam"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("no read groups"), "{stderr}");
    assert!(stderr.contains("SM"), "{stderr}");
    assert!(fixture.entries_with_prefix("norg.bam.vcf").is_empty());
}

#[test]
fn test_retained_workspace_layout() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &one_library(), 1500);

    let output = fixture.express(&["-B", "in.bam", "-T", "scratch", "-k"]);
    assert_success(&output);

    let scratch = fixture.path("scratch");
    for path in [
        "discordants",
        "splitters",
        "stats",
        "stats/sample1.lib1.histo",
        "stats/sample1.lib1.insert.stats",
        "stats/sample1.lib1.read_groups",
        "sample1.discordants.bam",
        "sample1.splitters.bam",
    ] {
        assert!(scratch.join(path).exists(), "missing {path}");
    }
    let stats = std::fs::read_to_string(scratch.join("stats/sample1.lib1.insert.stats")).unwrap();
    assert!(stats.starts_with("mean:"), "{stats}");
    assert_eq!(
        std::fs::read_to_string(scratch.join("stats/sample1.lib1.read_groups")).unwrap(),
        "rg1\nrg2\n"
    );
    // Per-library evidence was promoted to the per-sample names.
    assert!(!scratch.join("discordants/sample1.lib1.bam").exists());
}

#[test]
fn test_absent_tmp_dir_is_created_and_removed() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &one_library(), 1500);

    let output = fixture.express(&["-B", "in.bam", "-T", "scratch"]);
    assert_success(&output);
    assert!(!fixture.path("scratch").exists());
}

#[test]
fn test_supplied_evidence() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &one_library(), 1500);
    let header = "@HD\tVN:1.6\n@RG\tID:rg1\tSM:supplied\tLB:lib1\n";
    let split = format!("{header}s1\t65\tchr1\t1\t60\t100M\t=\t1\t0\t*\t*\n");
    std::fs::write(fixture.path("in.split.bam"), split).unwrap();
    std::fs::write(fixture.path("in.disc.bam"), header).unwrap();

    let output = fixture.express(&[
        "-B",
        "in.bam",
        "-S",
        "in.split.bam",
        "-D",
        "in.disc.bam",
        "-T",
        "scratch",
        "-k",
    ]);
    assert_success(&output);

    let pe = fixture.descriptors("-pe");
    let sr = fixture.descriptors("-sr");
    assert_eq!(pe.len(), 1);
    assert_eq!(sr.len(), 1);
    assert_eq!(descriptor_field(&pe[0], "bam_file"), vec!["in.disc.bam"]);
    assert_eq!(descriptor_field(&pe[0], "id"), vec!["supplied"]);
    assert_eq!(descriptor_field(&sr[0], "bam_file"), vec!["in.split.bam"]);
    assert_eq!(descriptor_field(&pe[0], "read_length"), vec!["100"]);

    // No extraction happened.
    assert!(!fixture.path("scratch/sample1.discordants.bam").exists());
    assert!(fixture.path("scratch/stats/sample1.lib1.histo").is_file());
}

#[test]
fn test_caller_options_are_passed_once() {
    let fixture = Fixture::new();
    fixture.input("in.bam", &one_library(), 1500);
    std::fs::write(fixture.path("exclude.bed"), "chr1\t0\t100\n").unwrap();

    let output =
        fixture.express(&["-B", "in.bam", "-P", "-m", "7", "-r", "0.5", "-x", "exclude.bed"]);
    assert_success(&output);

    let args = fixture.lumpy_args();
    assert_eq!(args[0], "-P");
    assert_eq!(args[1], "-t");
    assert_eq!(&args[3..7], &["-msw", "7", "-tt", "0.5"]);
    assert_eq!(args.iter().filter(|arg| *arg == "-x").count(), 1);
    assert_eq!(args[8], "exclude.bed");
}
