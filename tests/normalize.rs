use assert_matches::assert_matches;

use kira_merge::discovery::Mode;
use kira_merge::domain::{Scope, ScriptDirective};
use kira_merge::error::KiraError;
use kira_merge::normalize::{MergeParams, SpecBuilder};
use kira_merge::registry::DataRegistry;

fn registry() -> DataRegistry {
    DataRegistry::from_json_str(
        r#"{
            "title": "proj",
            "project_data": {"fasta.nucl": "/ref.fa"},
            "samples": {
                "A": {"fastq.F": "/A_1.fq", "fastq.R": "/A_2.fq", "bam": "/A.bam"},
                "B": {"fastq.F": "/B_1.fq", "fastq.R": "/B_2.fq"}
            }
        }"#,
    )
    .unwrap()
}

#[test]
fn scalar_values_broadcast_to_every_source() {
    let params = MergeParams {
        src: Some("fastq.F, fastq.R, fasta.nucl".into()),
        pipe: Some("sort -u".into()),
        script_path: Some("zcat".into()),
        ..MergeParams::default()
    };
    let spec = SpecBuilder::new(params).build(&mut registry()).unwrap();

    assert_eq!(spec.mode, Mode::Advanced);
    assert_eq!(spec.len(), 3);
    for item in &spec.items {
        assert_eq!(item.pipe.as_deref(), Some("sort -u"));
        assert_eq!(item.script, ScriptDirective::Command("zcat".to_string()));
    }
}

#[test]
fn length_mismatch_is_reported_per_parameter() {
    let params = MergeParams {
        src: Some(["fastq.F", "fastq.R", "bam"].into()),
        ext: Some(["fq", "fq"].into()),
        ..MergeParams::default()
    };
    let mut registry = registry();
    let before = registry.clone();
    let err = SpecBuilder::new(params).build(&mut registry).unwrap_err();

    assert_matches!(
        err,
        KiraError::ParamLength { ref param, len: 2, expected: 3 } if param == "ext"
    );
    assert_eq!(registry, before);
}

#[test]
fn every_problem_is_collected() {
    let params = MergeParams {
        src: Some(["fastq.F", "fastq.R"].into()),
        trg: Some(["a", "b", "c"].into()),
        scope: Some(["sample", "everywhere"].into()),
        ..MergeParams::default()
    };
    let err = SpecBuilder::new(params).build(&mut registry()).unwrap_err();

    let KiraError::InvalidSpec { errors } = err else {
        panic!("expected aggregated error");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|err| matches!(err, KiraError::InvalidScope(_))));
    assert!(errors.iter().any(|err| matches!(err, KiraError::ParamLength { .. })));
}

#[test]
fn guessed_scope_is_rejected() {
    let params = MergeParams {
        src: Some("bam".into()),
        scope: Some("..guess..".into()),
        ..MergeParams::default()
    };
    let err = SpecBuilder::new(params).build(&mut registry()).unwrap_err();
    assert_matches!(err, KiraError::UnsupportedGuess(_));
}

#[test]
fn list_form_normalizes_to_itself() {
    let params = MergeParams {
        src: Some("fastq.F, fasta.nucl".into()),
        trg: Some(["..guess..", "fasta.ref"].into()),
        ext: Some("fq".into()),
        script_path: Some(["..import..", "..guess.."].into()),
        scope: Some(["sample", "project"].into()),
        ..MergeParams::default()
    };
    let first = SpecBuilder::new(params).build(&mut registry()).unwrap();
    let second = SpecBuilder::new(first.to_params())
        .build(&mut registry())
        .unwrap();

    assert_eq!(first.items, second.items);
    assert_eq!(second.items[1].scope, Some(Scope::Project));
}

#[test]
fn empty_registry_has_nothing_to_merge() {
    let mut registry = DataRegistry::new("proj");
    let err = SpecBuilder::new(MergeParams::default())
        .build(&mut registry)
        .unwrap_err();
    assert_matches!(err, KiraError::NothingToMerge);
}
