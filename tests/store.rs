use std::fs;

use camino::Utf8PathBuf;

use kira_merge::app::{App, BuildOptions};
use kira_merge::host::ScriptHost;
use kira_merge::normalize::MergeParams;
use kira_merge::output::JsonOutput;
use kira_merge::planner::StepSettings;
use kira_merge::registry::DataRegistry;
use kira_merge::store::Store;
use kira_merge::tables::LookupTables;

#[test]
fn write_build_persists_scripts_registry_and_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let registry = DataRegistry::from_json_str(
        r#"{
            "title": "proj",
            "samples": {
                "A": {"fastq.F": "/data/A.fastq.gz"},
                "B": {"fastq.F": "/data/B.fastq.gz"}
            }
        }"#,
    )
    .unwrap();
    let settings = StepSettings {
        step: "merge".to_string(),
        name: "merge1".to_string(),
        jid_name_sep: "..".to_string(),
        file_tag: "merge".to_string(),
    };
    let app = App::new(LookupTables::builtin(), settings);
    let mut host = ScriptHost::new(root.join("out"))
        .with_sample_dirs(true)
        .with_create_dirs(true);

    let result = app
        .build(
            registry,
            MergeParams::default(),
            &mut host,
            BuildOptions::default(),
            &JsonOutput,
        )
        .unwrap();

    let store = Store::new(root.clone());
    let summary = store.write_build(&result, host.stamped()).unwrap();

    assert_eq!(summary.scripts.len(), 2);
    let script = fs::read_to_string(store.script_path("merge..merge1..A..fastq.F")).unwrap();
    assert!(script.starts_with("#!/bin/bash"));
    assert!(script.contains("gunzip -c \\\n\t/data/A.fastq.gz"));
    assert!(root.join("out/A").as_std_path().is_dir());

    let written = DataRegistry::load(&store.registry_path()).unwrap();
    assert_eq!(written, result.registry);

    let manifest = store.read_manifest().unwrap();
    assert_eq!(manifest.mode, "basic");
    assert_eq!(
        manifest.scripts,
        vec!["merge..merge1..A..fastq.F", "merge..merge1..B..fastq.F"]
    );
    assert_eq!(manifest.stamped.len(), 2);
    assert!(manifest.stamped[0].ends_with("out/A/A.fastq.F.merge.fastq"));
}
