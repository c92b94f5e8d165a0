use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_merge::config::{Config, ConfigLoader};
use kira_merge::error::KiraError;
use kira_merge::normalize::ParamValue;

#[test]
fn load_config_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let tables = temp.path().join("tables.json");
    fs::write(
        &tables,
        r#"{"script_path_map": {".sra": ["fastq-dump --stdout", "gzip -c", false]}}"#,
    )
    .unwrap();
    let path = temp.path().join("kira-merge.json");
    fs::write(
        &path,
        format!(
            r#"{{
                "name": "merge_reads",
                "sample_dirs": true,
                "tables": "{}",
                "params": {{"src": ["fastq.F", "fastq.R"], "script_path": "..guess.."}}
            }}"#,
            tables.display()
        ),
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.settings.name, "merge_reads");
    assert_eq!(resolved.base_dir, "data/merge/merge_reads");
    assert!(resolved.sample_dirs);
    assert_eq!(
        resolved.params.src,
        Some(ParamValue::from(["fastq.F", "fastq.R"]))
    );

    let tables = resolved.load_tables().unwrap();
    assert_eq!(
        tables.script_for(".sra").map(|entry| entry.command()),
        Some("fastq-dump --stdout")
    );
    assert!(tables.script_for(".fastq").is_some());
}

#[test]
fn name_with_whitespace_is_rejected() {
    let config: Config = serde_json::from_str(r#"{"name": "merge one"}"#).unwrap();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, KiraError::InvalidParam { ref param, .. } if param == "name");
}

#[test]
fn unreadable_config_reports_path() {
    let temp = tempfile::tempdir().unwrap();
    let missing = Utf8PathBuf::from_path_buf(temp.path().join("absent.json")).unwrap();
    let err = ConfigLoader::resolve(Some(missing.as_str())).unwrap_err();
    assert_matches!(err, KiraError::ConfigRead(_));
}
