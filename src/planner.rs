use std::collections::{BTreeSet, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{DataType, ScopeKey};
use crate::error::KiraError;
use crate::host::{LocalDir, StepHost};
use crate::registry::{DataRegistry, SlotValue};
use crate::resolver::{
    ResolvedSpec, ScriptPlan, Warning, WarningKind, join_extensions, lookup_command,
};
use crate::tables::{LookupTables, final_suffix, unzipped_extension};

/// Identity of the pipeline step being planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSettings {
    pub step: String,
    pub name: String,
    pub jid_name_sep: String,
    pub file_tag: String,
}

impl StepSettings {
    pub fn script_name(&self, title: &str, source: &DataType) -> String {
        [
            self.step.as_str(),
            self.name.as_str(),
            title,
            source.as_str(),
        ]
        .join(&self.jid_name_sep)
    }
}

/// One conversion command for one sample or for the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptBlock {
    pub name: String,
    pub key: ScopeKey,
    pub source: DataType,
    pub target: DataType,
    pub command: String,
    pub inputs: Vec<Utf8PathBuf>,
    pub pipe: Option<String>,
    /// Where the command writes; differs from `output` when a scratch dir is used.
    pub written_to: Utf8PathBuf,
    /// Path recorded in the registry.
    pub output: Utf8PathBuf,
    pub text: String,
}

impl ScriptBlock {
    pub fn command_line(&self) -> String {
        let inputs = self
            .inputs
            .iter()
            .map(|path| path.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        match &self.pipe {
            Some(pipe) => format!(
                "{} {inputs} | {pipe} > {}",
                self.command, self.written_to
            ),
            None => format!("{} {inputs} > {}", self.command, self.written_to),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Import {
        key: ScopeKey,
        source: DataType,
        target: DataType,
        path: Utf8PathBuf,
    },
    Skip {
        key: ScopeKey,
        source: DataType,
    },
    Convert(ScriptBlock),
}

pub struct Planner<'a, H: StepHost + ?Sized> {
    settings: &'a StepSettings,
    tables: &'a LookupTables,
    host: &'a mut H,
}

impl<'a, H: StepHost + ?Sized> Planner<'a, H> {
    pub fn new(settings: &'a StepSettings, tables: &'a LookupTables, host: &'a mut H) -> Self {
        Self {
            settings,
            tables,
            host,
        }
    }

    /// Plans every resolved spec in order and records the results in `registry`.
    pub fn plan(
        &mut self,
        registry: &mut DataRegistry,
        specs: &[ResolvedSpec],
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<PlannedAction>, KiraError> {
        check_target_conflicts(registry, specs)?;
        self.check_script_names(registry, specs)?;

        // sources are read as they were before planning; new slots are not chained
        let sources = registry.clone();
        let mut actions = Vec::new();
        for spec in specs {
            for key in sources.keys_for(spec.scope) {
                let Some(value) = sources.get(&key, &spec.source).cloned() else {
                    continue;
                };
                let action = self.plan_one(registry, spec, &key, &value, warnings)?;
                actions.push(action);
            }
        }
        info!(count = actions.len(), "planned merge actions");
        Ok(actions)
    }

    fn plan_one(
        &mut self,
        registry: &mut DataRegistry,
        spec: &ResolvedSpec,
        key: &ScopeKey,
        value: &SlotValue,
        warnings: &mut Vec<Warning>,
    ) -> Result<PlannedAction, KiraError> {
        let (command, pipe) = match &spec.script {
            ScriptPlan::Import => {
                let path = value.single().cloned().ok_or_else(|| KiraError::AmbiguousImport {
                    source_type: spec.source.to_string(),
                    at: key.to_string(),
                    count: value.files().len(),
                })?;
                registry.set(key, &spec.target, SlotValue::Single(path.clone()));
                debug!(%key, source = %spec.source, target = %spec.target, "imported slot");
                return Ok(PlannedAction::Import {
                    key: key.clone(),
                    source: spec.source.clone(),
                    target: spec.target.clone(),
                    path,
                });
            }
            ScriptPlan::Skip => {
                return Ok(PlannedAction::Skip {
                    key: key.clone(),
                    source: spec.source.clone(),
                });
            }
            ScriptPlan::Command { command, pipe } => (command.clone(), pipe.clone()),
            ScriptPlan::PerSample { pipe } => self.sample_command(spec, key, value, pipe.clone())?,
        };

        let inputs = value.files().to_vec();
        if inputs.is_empty() {
            return Err(KiraError::EmptySlot {
                source_type: spec.source.to_string(),
                at: key.to_string(),
            });
        }
        let extension = match &spec.extension {
            Some(extension) => extension.clone(),
            None => self.sniff_output_extension(spec, key, &inputs, warnings)?,
        };

        let title = registry.title_for(key).to_string();
        let file_name = format!(
            "{title}.{}.{}.{extension}",
            spec.source, self.settings.file_tag
        );
        let base_dir = self.host.make_folder_for_sample(&title)?;

        let scope = LocalDir::start(&mut *self.host, &base_dir)?;
        let written_to = scope.use_dir().join(&file_name);
        let mut block = ScriptBlock {
            name: self.settings.script_name(&title, &spec.source),
            key: key.clone(),
            source: spec.source.clone(),
            target: spec.target.clone(),
            command,
            inputs,
            pipe,
            written_to,
            output: base_dir.join(&file_name),
            text: String::new(),
        };
        block.text = render_text(&block);
        if let Some(epilogue) = scope.finish() {
            block.text.push_str(&epilogue);
        }

        registry.set(key, &spec.target, SlotValue::Single(block.output.clone()));
        self.host.stamp_file(&block.output);
        debug!(%key, source = %spec.source, output = %block.output, "planned conversion");
        Ok(PlannedAction::Convert(block))
    }

    /// Every generated block needs its own script name and output file.
    fn check_script_names(
        &self,
        registry: &DataRegistry,
        specs: &[ResolvedSpec],
    ) -> Result<(), KiraError> {
        let mut names: HashMap<String, &DataType> = HashMap::new();
        for spec in specs {
            if matches!(spec.script, ScriptPlan::Skip | ScriptPlan::Import) {
                continue;
            }
            for key in registry.keys_for(spec.scope) {
                if !registry.contains(&key, &spec.source) {
                    continue;
                }
                let name = self
                    .settings
                    .script_name(registry.title_for(&key), &spec.source);
                if let Some(first) = names.insert(name.clone(), &spec.target) {
                    return Err(KiraError::DuplicateScript {
                        name,
                        at: key.to_string(),
                        first: first.to_string(),
                        second: spec.target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Per-sample command choice for sources whose extension differs between samples.
    fn sample_command(
        &self,
        spec: &ResolvedSpec,
        key: &ScopeKey,
        value: &SlotValue,
        pipe: Option<String>,
    ) -> Result<(String, Option<String>), KiraError> {
        let extension = self.single_extension(spec, key, value.files())?;
        lookup_command(self.tables, &spec.source, &extension, &key.to_string(), pipe)
    }

    fn single_extension(
        &self,
        spec: &ResolvedSpec,
        key: &ScopeKey,
        files: &[Utf8PathBuf],
    ) -> Result<String, KiraError> {
        let extensions = files
            .iter()
            .map(|path| self.tables.sniff_extension(path))
            .collect::<BTreeSet<_>>();
        match extensions.len() {
            0 => Err(KiraError::EmptySlot {
                source_type: spec.source.to_string(),
                at: key.to_string(),
            }),
            1 => Ok(extensions.into_iter().next().unwrap_or_default()),
            _ => Err(KiraError::AmbiguousExtension {
                source_type: spec.source.to_string(),
                at: key.to_string(),
                extensions: join_extensions(&extensions),
            }),
        }
    }

    /// Output extension when none was given or implied by the source type.
    fn sniff_output_extension(
        &self,
        spec: &ResolvedSpec,
        key: &ScopeKey,
        inputs: &[Utf8PathBuf],
        warnings: &mut Vec<Warning>,
    ) -> Result<String, KiraError> {
        let sniffed = self.single_extension(spec, key, inputs)?;
        let first: &Utf8Path = &inputs[0];

        let unzipped = self
            .tables
            .script_for(&sniffed)
            .filter(|entry| entry.needs_unzip())
            .and_then(|_| unzipped_extension(first));
        if let Some(extension) = unzipped {
            return Ok(extension);
        }
        if let Some(mapping) = self.tables.default_for(&spec.source) {
            return Ok(mapping.extension.clone());
        }

        let name = first.file_name().unwrap_or(first.as_str());
        let extension = final_suffix(name).trim_start_matches('.').to_string();
        warnings.push(Warning::new(
            WarningKind::ExtensionFromFile,
            &spec.source,
            key.sample(),
            format!(
                "src '{}' is not recognized. Setting 'ext' to type of first file ({extension})",
                spec.source
            ),
        ));
        Ok(extension)
    }
}

fn render_text(block: &ScriptBlock) -> String {
    let inputs = block
        .inputs
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let mut text = format!("{} \\\n\t{inputs} \\\n\t", block.command);
    if let Some(pipe) = &block.pipe {
        text.push_str(&format!("| {pipe} \\\n\t"));
    }
    text.push_str(&format!("> {} \n\n", block.written_to));
    text
}

/// Two specs may not write the same target for the same sample.
fn check_target_conflicts(
    registry: &DataRegistry,
    specs: &[ResolvedSpec],
) -> Result<(), KiraError> {
    let mut writers: HashMap<(ScopeKey, &DataType), &DataType> = HashMap::new();
    for spec in specs {
        if spec.script == ScriptPlan::Skip {
            continue;
        }
        for key in registry.keys_for(spec.scope) {
            if !registry.contains(&key, &spec.source) {
                continue;
            }
            if let Some(first) = writers.insert((key.clone(), &spec.target), &spec.source) {
                return Err(KiraError::DuplicateTarget {
                    target: spec.target.to_string(),
                    at: key.to_string(),
                    first: first.to_string(),
                    second: spec.source.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::Scope;
    use crate::host::ScriptHost;

    fn settings() -> StepSettings {
        StepSettings {
            step: "merge".to_string(),
            name: "merge1".to_string(),
            jid_name_sep: "..".to_string(),
            file_tag: "merge".to_string(),
        }
    }

    fn registry() -> DataRegistry {
        DataRegistry::from_json_str(
            r#"{
                "title": "proj",
                "project_data": {"fasta.nucl": ["/p/a.fa", "/p/b.fa"]},
                "samples": {
                    "A": {"reads": ["/A_1.fq", "/A_2.fq"], "fastq.S": "/A.fastq.gz"},
                    "B": {"reads": "/B.fastq", "fastq.S": ["/B.fq", "/B.fastq"]}
                }
            }"#,
        )
        .unwrap()
    }

    fn spec(source: &str, scope: Scope, script: ScriptPlan) -> ResolvedSpec {
        ResolvedSpec {
            source: DataType::from(source),
            scope,
            target: DataType::from(source),
            extension: None,
            script,
        }
    }

    #[test]
    fn per_sample_commands_and_extensions() {
        let mut registry = registry();
        let tables = LookupTables::builtin();
        let settings = settings();
        let mut host = ScriptHost::new(Utf8PathBuf::from("/out"));
        let mut warnings = Vec::new();

        let specs = vec![spec("reads", Scope::Sample, ScriptPlan::PerSample { pipe: None })];
        let actions = Planner::new(&settings, &tables, &mut host)
            .plan(&mut registry, &specs, &mut warnings)
            .unwrap();

        assert_eq!(actions.len(), 2);
        let PlannedAction::Convert(block) = &actions[0] else {
            panic!("expected conversion");
        };
        assert_eq!(block.name, "merge..merge1..A..reads");
        assert_eq!(
            block.command_line(),
            "cat /A_1.fq /A_2.fq > /out/A.reads.merge.fq"
        );
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].kind, WarningKind::ExtensionFromFile);
        assert_eq!(
            registry.get(&ScopeKey::Sample("B".to_string()), &DataType::from("reads")),
            Some(&SlotValue::Single(Utf8PathBuf::from("/out/B.reads.merge.fastq")))
        );
        assert_eq!(host.stamped().len(), 2);
    }

    #[test]
    fn mixed_extensions_within_sample_fail() {
        let mut registry = registry();
        let tables = LookupTables::builtin();
        let settings = settings();
        let mut host = ScriptHost::new(Utf8PathBuf::from("/out"));
        let specs = vec![spec("fastq.S", Scope::Sample, ScriptPlan::PerSample { pipe: None })];
        let err = Planner::new(&settings, &tables, &mut host)
            .plan(&mut registry, &specs, &mut Vec::new())
            .unwrap_err();
        assert_matches!(
            err,
            KiraError::AmbiguousExtension { ref at, .. } if at == "sample 'B'"
        );
        assert_eq!(host.open_scopes(), 0);
    }

    #[test]
    fn import_of_many_files_fails() {
        let mut registry = registry();
        let tables = LookupTables::builtin();
        let settings = settings();
        let mut host = ScriptHost::new(Utf8PathBuf::from("/out"));
        let specs = vec![spec("fasta.nucl", Scope::Project, ScriptPlan::Import)];
        let err = Planner::new(&settings, &tables, &mut host)
            .plan(&mut registry, &specs, &mut Vec::new())
            .unwrap_err();
        assert_matches!(err, KiraError::AmbiguousImport { count: 2, .. });
    }

    #[test]
    fn duplicate_targets_are_rejected_before_planning() {
        let mut registry = registry();
        let tables = LookupTables::builtin();
        let settings = settings();
        let mut host = ScriptHost::new(Utf8PathBuf::from("/out"));
        let mut first = spec("reads", Scope::Sample, ScriptPlan::Import);
        first.target = DataType::from("fastq");
        let mut second = spec("fastq.S", Scope::Sample, ScriptPlan::Import);
        second.target = DataType::from("fastq");
        let before = registry.clone();

        let err = Planner::new(&settings, &tables, &mut host)
            .plan(&mut registry, &[first, second], &mut Vec::new())
            .unwrap_err();
        assert_matches!(err, KiraError::DuplicateTarget { .. });
        assert_eq!(registry, before);
    }

    #[test]
    fn pipe_is_rendered_in_script_text() {
        let mut registry = registry();
        let tables = LookupTables::builtin();
        let settings = settings();
        let mut host = ScriptHost::new(Utf8PathBuf::from("/out"))
            .with_local_dir(Some(Utf8PathBuf::from("/tmp/local")));
        let mut project = spec(
            "fasta.nucl",
            Scope::Project,
            ScriptPlan::Command {
                command: "cat".to_string(),
                pipe: Some("seqkit rmdup".to_string()),
            },
        );
        project.extension = Some("fasta".to_string());

        let actions = Planner::new(&settings, &tables, &mut host)
            .plan(&mut registry, &[project], &mut Vec::new())
            .unwrap();
        let PlannedAction::Convert(block) = &actions[0] else {
            panic!("expected conversion");
        };
        assert_eq!(block.output, "/out/proj.fasta.nucl.merge.fasta");
        assert_eq!(
            block.written_to,
            "/tmp/local/out/proj.fasta.nucl.merge.fasta"
        );
        assert!(block.text.starts_with("cat \\\n\t/p/a.fa /p/b.fa \\\n\t| seqkit rmdup \\\n\t> "));
        assert!(block.text.contains("mv /tmp/local/out/* /out/"));
    }
}
