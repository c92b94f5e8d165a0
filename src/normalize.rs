use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discovery::{self, Mode, PrunedSlot, ScopeFilter};
use crate::domain::{DataType, Scope, ScriptDirective, Setting};
use crate::error::KiraError;
use crate::registry::DataRegistry;

static COMMA_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("comma split pattern"));

/// A raw user parameter: a (possibly comma-separated) string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    List(Vec<Option<String>>),
}

impl ParamValue {
    pub fn items(&self) -> Vec<Option<String>> {
        match self {
            ParamValue::Text(text) => COMMA_SPLIT
                .split(text.trim())
                .map(|item| Some(item.to_string()))
                .collect(),
            ParamValue::List(items) => items.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ParamValue::Text(text) => text.trim().is_empty(),
            ParamValue::List(items) => items.is_empty(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for ParamValue {
    fn from(values: [&str; N]) -> Self {
        ParamValue::List(values.iter().map(|value| Some(value.to_string())).collect())
    }
}

/// The user-facing parameters of the merge step, as found in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeParams {
    #[serde(default)]
    pub src: Option<ParamValue>,
    #[serde(default)]
    pub trg: Option<ParamValue>,
    #[serde(default)]
    pub ext: Option<ParamValue>,
    #[serde(default)]
    pub script_path: Option<ParamValue>,
    #[serde(default)]
    pub pipe: Option<ParamValue>,
    #[serde(default)]
    pub scope: Option<ParamValue>,
}

impl MergeParams {
    pub fn mode(&self) -> Mode {
        if present(&self.src).is_some() {
            Mode::Advanced
        } else {
            Mode::Basic
        }
    }

    /// Scopes named anywhere in the `scope` parameter, used to filter discovery.
    pub fn scope_filter(&self) -> ScopeFilter {
        let scopes = present(&self.scope)
            .map(|value| {
                value
                    .items()
                    .into_iter()
                    .flatten()
                    .filter_map(|item| item.parse::<Scope>().ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        ScopeFilter::only(scopes)
    }
}

fn present(value: &Option<ParamValue>) -> Option<&ParamValue> {
    value.as_ref().filter(|value| !value.is_empty())
}

/// One requested conversion before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecItem {
    pub source: DataType,
    pub scope: Option<Scope>,
    pub target: Setting<DataType>,
    pub extension: Setting<String>,
    pub script: ScriptDirective,
    pub pipe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSpec {
    pub mode: Mode,
    pub items: Vec<SpecItem>,
    pub pruned: Vec<PrunedSlot>,
}

impl NormalizedSpec {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Full-length list form of the merge parameters, suitable for feeding back
    /// into [`SpecBuilder`] as advanced parameters.
    pub fn to_params(&self) -> MergeParams {
        let column = |f: &dyn Fn(&SpecItem) -> Option<String>| {
            Some(ParamValue::List(self.items.iter().map(f).collect()))
        };
        MergeParams {
            src: column(&|item| Some(item.source.to_string())),
            trg: column(&|item| item.target.to_raw()),
            ext: column(&|item| item.extension.to_raw()),
            script_path: column(&|item| item.script.to_raw()),
            pipe: column(&|item| item.pipe.clone()),
            scope: column(&|item| item.scope.map(|scope| scope.to_string())),
        }
    }
}

/// Validates all six parameters together and expands them into one
/// [`SpecItem`] per source.
pub struct SpecBuilder {
    params: MergeParams,
    errors: Vec<KiraError>,
}

impl SpecBuilder {
    pub fn new(params: MergeParams) -> Self {
        Self {
            params,
            errors: Vec::new(),
        }
    }

    /// Builds the merge specification. Discovery-time pruning of `registry` happens
    /// here, once, before anything is resolved.
    pub fn build(mut self, registry: &mut DataRegistry) -> Result<NormalizedSpec, KiraError> {
        let mode = self.params.mode();
        let filter = self.params.scope_filter();
        debug!(?mode, "normalizing merge parameters");

        let (sources, scopes) = match mode {
            Mode::Basic => self.basic_sources(registry, &filter),
            Mode::Advanced => self.advanced_sources(),
        };
        let count = sources.len();

        let (targets, extensions, scripts, pipes) = match mode {
            Mode::Basic => {
                for (name, value) in [("trg", &self.params.trg), ("ext", &self.params.ext)] {
                    if present(value).is_some() {
                        self.errors
                            .push(KiraError::ForbiddenInBasicMode(name.to_string()));
                    }
                }
                let scripts = self.basic_column("script_path", self.params.script_path.clone(), count);
                let pipes = self.basic_column("pipe", self.params.pipe.clone(), count);
                (vec![None; count], vec![None; count], scripts, pipes)
            }
            Mode::Advanced => {
                let targets = self.advanced_column("trg", self.params.trg.clone(), count);
                let extensions = self.advanced_column("ext", self.params.ext.clone(), count);
                let scripts =
                    self.advanced_column("script_path", self.params.script_path.clone(), count);
                let pipes = self.advanced_column("pipe", self.params.pipe.clone(), count);
                (targets, extensions, scripts, pipes)
            }
        };

        let mut errors = std::mem::take(&mut self.errors);
        if mode == Mode::Basic && errors.is_empty() && count == 0 {
            errors.push(KiraError::NothingToMerge);
        }
        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(KiraError::InvalidSpec { errors }),
        }

        let keep = discovery::discover(registry, &filter);
        let pruned = discovery::prune(registry, &keep);

        let items = sources
            .into_iter()
            .zip(scopes)
            .zip(targets)
            .zip(extensions)
            .zip(scripts.into_iter().zip(pipes))
            .map(|((((source, scope), target), extension), (script, pipe))| SpecItem {
                source,
                scope,
                target: match Setting::parse(target.as_deref()) {
                    Setting::Value(value) => Setting::Value(DataType::new(value)),
                    Setting::Guess => Setting::Guess,
                    Setting::Unset => Setting::Unset,
                },
                extension: Setting::parse(extension.as_deref()),
                script: ScriptDirective::parse(script.as_deref()),
                pipe: match Setting::parse(pipe.as_deref()) {
                    Setting::Value(pipe) => Some(pipe),
                    Setting::Guess | Setting::Unset => None,
                },
            })
            .collect();

        Ok(NormalizedSpec {
            mode,
            items,
            pruned,
        })
    }

    fn basic_sources(
        &mut self,
        registry: &DataRegistry,
        filter: &ScopeFilter,
    ) -> (Vec<DataType>, Vec<Option<Scope>>) {
        if let Some(value) = present(&self.params.scope) {
            for item in value.items().into_iter().flatten() {
                if let Err(err) = item.parse::<Scope>() {
                    self.errors.push(err);
                }
            }
        }
        discovery::discover(registry, filter)
            .into_iter()
            .map(|slot| (slot.source, Some(slot.scope)))
            .unzip()
    }

    fn advanced_sources(&mut self) -> (Vec<DataType>, Vec<Option<Scope>>) {
        let mut sources = Vec::new();
        for item in present(&self.params.src).map(ParamValue::items).unwrap_or_default() {
            let raw = item.unwrap_or_default();
            match raw.parse::<DataType>() {
                Ok(source) => sources.push(source),
                Err(err) => {
                    self.errors.push(err);
                    // keeps the other columns aligned so their errors are reported too
                    sources.push(DataType::new(raw));
                }
            }
        }

        let scopes = self
            .advanced_column("scope", self.params.scope.clone(), sources.len())
            .into_iter()
            .map(|item| match item.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(value) => match value.parse::<Scope>() {
                    Ok(scope) => Some(scope),
                    Err(err) => {
                        self.errors.push(err);
                        None
                    }
                },
            })
            .collect();
        (sources, scopes)
    }

    /// Basic mode accepts only a single value, broadcast to every discovered source.
    fn basic_column(
        &mut self,
        name: &str,
        value: Option<ParamValue>,
        count: usize,
    ) -> Vec<Option<String>> {
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            return vec![None; count];
        };
        let items = value.items();
        if items.len() > 1 {
            self.errors.push(KiraError::ListInBasicMode(name.to_string()));
            return vec![None; count];
        }
        vec![items.into_iter().next().flatten(); count]
    }

    /// Advanced mode: one value broadcasts, `count` values pass through.
    fn advanced_column(
        &mut self,
        name: &str,
        value: Option<ParamValue>,
        count: usize,
    ) -> Vec<Option<String>> {
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            return vec![None; count];
        };
        let items = value.items();
        match items.len() {
            1 => vec![items.into_iter().next().flatten(); count],
            len if len == count => items,
            len => {
                self.errors.push(KiraError::ParamLength {
                    param: name.to_string(),
                    len,
                    expected: count,
                });
                vec![None; count]
            }
        }
    }
}
