use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{DataType, Scope, ScopeKey, ScriptDirective, Setting};
use crate::error::KiraError;
use crate::normalize::{NormalizedSpec, SpecItem};
use crate::registry::DataRegistry;
use crate::tables::{LookupTables, ScriptEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnknownSourceType,
    MissingInSample,
    ExtensionFromFile,
}

/// Non-fatal finding. The caller decides whether warnings abort the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub source: DataType,
    pub sample: Option<String>,
    pub message: String,
}

impl Warning {
    pub(crate) fn new(
        kind: WarningKind,
        source: &DataType,
        sample: Option<&str>,
        message: String,
    ) -> Self {
        warn!(source = %source, sample = sample.unwrap_or("-"), "{message}");
        Self {
            kind,
            source: source.clone(),
            sample: sample.map(str::to_string),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptPlan {
    Import,
    Skip,
    Command {
        command: String,
        pipe: Option<String>,
    },
    /// Samples carry different extensions; the command is chosen per sample.
    PerSample {
        pipe: Option<String>,
    },
}

/// A fully resolved conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSpec {
    pub source: DataType,
    pub scope: Scope,
    pub target: DataType,
    /// `None` when the output extension is taken from the input files at plan time.
    pub extension: Option<String>,
    pub script: ScriptPlan,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub specs: Vec<ResolvedSpec>,
    pub warnings: Vec<Warning>,
}

pub struct Resolver<'a> {
    registry: &'a DataRegistry,
    tables: &'a LookupTables,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a DataRegistry, tables: &'a LookupTables) -> Self {
        Self { registry, tables }
    }

    pub fn resolve(&self, spec: &NormalizedSpec) -> Result<Resolution, KiraError> {
        let mut resolution = Resolution::default();
        for item in &spec.items {
            let resolved = self.resolve_item(item, &mut resolution.warnings)?;
            debug!(
                source = %resolved.source,
                scope = %resolved.scope,
                target = %resolved.target,
                "resolved merge item"
            );
            resolution.specs.push(resolved);
        }
        Ok(resolution)
    }

    fn resolve_item(
        &self,
        item: &SpecItem,
        warnings: &mut Vec<Warning>,
    ) -> Result<ResolvedSpec, KiraError> {
        let source = &item.source;
        let target = self.resolve_target(source, &item.target, warnings)?;
        let extension = self.resolve_extension(source, &item.extension, warnings);
        let scope = match item.scope {
            Some(scope) => scope,
            None => self.infer_scope(source)?,
        };
        self.check_presence(source, scope, warnings)?;

        let script = match &item.script {
            ScriptDirective::Import => ScriptPlan::Import,
            ScriptDirective::Skip => ScriptPlan::Skip,
            ScriptDirective::Command(command) => ScriptPlan::Command {
                command: command.clone(),
                pipe: item.pipe.clone(),
            },
            ScriptDirective::Guess => self.guess_script(source, scope, item.pipe.clone())?,
        };

        Ok(ResolvedSpec {
            source: source.clone(),
            scope,
            target,
            extension,
            script,
        })
    }

    fn resolve_target(
        &self,
        source: &DataType,
        target: &Setting<DataType>,
        warnings: &mut Vec<Warning>,
    ) -> Result<DataType, KiraError> {
        match target {
            Setting::Value(target) => Ok(target.clone()),
            Setting::Guess => self
                .tables
                .default_for(source)
                .map(|mapping| mapping.target.clone())
                .ok_or_else(|| KiraError::UnknownSourceType(source.to_string())),
            Setting::Unset => match self.tables.default_for(source) {
                Some(mapping) => Ok(mapping.target.clone()),
                None => {
                    warnings.push(Warning::new(
                        WarningKind::UnknownSourceType,
                        source,
                        None,
                        format!("the following 'src' is not recognized: {source}. Setting 'trg' to {source}"),
                    ));
                    Ok(source.clone())
                }
            },
        }
    }

    fn resolve_extension(
        &self,
        source: &DataType,
        extension: &Setting<String>,
        warnings: &mut Vec<Warning>,
    ) -> Option<String> {
        match extension {
            Setting::Value(extension) => Some(extension.clone()),
            Setting::Guess => None,
            Setting::Unset => match self.tables.default_for(source) {
                Some(mapping) => Some(mapping.extension.clone()),
                None => {
                    warnings.push(Warning::new(
                        WarningKind::UnknownSourceType,
                        source,
                        None,
                        format!(
                            "the following 'src' is not recognized: {source}. 'ext' will be taken from the input files"
                        ),
                    ));
                    None
                }
            },
        }
    }

    fn infer_scope(&self, source: &DataType) -> Result<Scope, KiraError> {
        if self.registry.in_all_samples(source) {
            Ok(Scope::Sample)
        } else if self.registry.in_project(source) {
            Ok(Scope::Project)
        } else {
            Err(KiraError::ScopeNotInferable(source.to_string()))
        }
    }

    fn check_presence(
        &self,
        source: &DataType,
        scope: Scope,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), KiraError> {
        let found = match scope {
            Scope::Sample => self.registry.in_any_sample(source),
            Scope::Project => self.registry.in_project(source),
        };
        if !found {
            return Err(KiraError::SourceNotFound {
                source_type: source.to_string(),
                scope: scope.to_string(),
            });
        }
        if scope == Scope::Sample {
            for (sample, slots) in &self.registry.samples {
                if !slots.contains_key(source.as_str()) {
                    warnings.push(Warning::new(
                        WarningKind::MissingInSample,
                        source,
                        Some(sample.as_str()),
                        format!("type '{source}' does not exist for sample '{sample}'"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn guess_script(
        &self,
        source: &DataType,
        scope: Scope,
        pipe: Option<String>,
    ) -> Result<ScriptPlan, KiraError> {
        let keys = self.registry.keys_for(scope);
        let extensions = self.extensions(source, &keys);
        let at = match scope {
            Scope::Project => ScopeKey::Project.to_string(),
            Scope::Sample => "all samples".to_string(),
        };

        match (scope, extensions.len()) {
            (_, 1) => {
                let extension = extensions.into_iter().next().unwrap_or_default();
                let (command, pipe) = lookup_command(self.tables, source, &extension, &at, pipe)?;
                Ok(ScriptPlan::Command { command, pipe })
            }
            (Scope::Sample, _) => Ok(ScriptPlan::PerSample { pipe }),
            (Scope::Project, 0) => Err(KiraError::EmptySlot {
                source_type: source.to_string(),
                at,
            }),
            (Scope::Project, _) => Err(KiraError::AmbiguousExtension {
                source_type: source.to_string(),
                at,
                extensions: join_extensions(&extensions),
            }),
        }
    }

    fn extensions(&self, source: &DataType, keys: &[ScopeKey]) -> BTreeSet<String> {
        keys.iter()
            .filter_map(|key| self.registry.get(key, source))
            .flat_map(|value| value.files())
            .map(|path| self.tables.sniff_extension(path))
            .collect()
    }
}

/// Looks an extension up in the script path table. A list entry also
/// replaces the pipe command.
pub(crate) fn lookup_command(
    tables: &LookupTables,
    source: &DataType,
    extension: &str,
    at: &str,
    pipe: Option<String>,
) -> Result<(String, Option<String>), KiraError> {
    let entry = tables
        .script_for(extension)
        .ok_or_else(|| KiraError::UnknownExtension {
            source_type: source.to_string(),
            at: at.to_string(),
            extension: extension.to_string(),
        })?;
    let command = entry.command().to_string();
    Ok(match entry {
        ScriptEntry::Command(_) => (command, pipe),
        ScriptEntry::Piped { pipe, .. } => (command, pipe.clone()),
    })
}

pub(crate) fn join_extensions(extensions: &BTreeSet<String>) -> String {
    extensions
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
