use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;
use crate::normalize::MergeParams;
use crate::planner::StepSettings;
use crate::tables::LookupTables;

pub const DEFAULT_CONFIG: &str = "kira-merge.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub jid_name_sep: Option<String>,
    #[serde(default)]
    pub file_tag: Option<String>,
    #[serde(default)]
    pub registry: Option<Utf8PathBuf>,
    #[serde(default)]
    pub tables: Option<Utf8PathBuf>,
    #[serde(default)]
    pub local_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub sample_dirs: bool,
    #[serde(default)]
    pub params: MergeParams,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub settings: StepSettings,
    pub base_dir: Utf8PathBuf,
    pub registry: Utf8PathBuf,
    pub tables: Option<Utf8PathBuf>,
    pub local_dir: Option<Utf8PathBuf>,
    pub sample_dirs: bool,
    pub params: MergeParams,
}

impl ResolvedConfig {
    /// Built-in tables, extended by the configured tables file if any.
    pub fn load_tables(&self) -> Result<LookupTables, KiraError> {
        load_tables(self.tables.as_deref())
    }
}

pub fn load_tables(path: Option<&camino::Utf8Path>) -> Result<LookupTables, KiraError> {
    let builtin = LookupTables::builtin();
    match path {
        Some(path) => Ok(builtin.with_overrides(LookupTables::load(path)?)),
        None => Ok(builtin),
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let step = non_empty(config.step).unwrap_or_else(|| "merge".to_string());
        let name = non_empty(config.name).unwrap_or_else(|| format!("{step}1"));
        let jid_name_sep = non_empty(config.jid_name_sep).unwrap_or_else(|| "..".to_string());
        let file_tag = non_empty(config.file_tag).unwrap_or_else(|| "merge".to_string());

        if name.contains(char::is_whitespace) {
            return Err(KiraError::InvalidParam {
                param: "name".to_string(),
                message: format!("step name '{name}' must not contain whitespace"),
            });
        }

        let base_dir = config
            .base_dir
            .unwrap_or_else(|| Utf8PathBuf::from("data").join(&step).join(&name));

        Ok(ResolvedConfig {
            schema_version,
            settings: StepSettings {
                step,
                name,
                jid_name_sep,
                file_tag,
            },
            base_dir,
            registry: config
                .registry
                .unwrap_or_else(|| Utf8PathBuf::from("samples.json")),
            tables: config.tables,
            local_dir: config.local_dir,
            sample_dirs: config.sample_dirs,
            params: config.params,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_defaults() {
        let config: Config = serde_json::from_str(r#"{"params": {"src": "fastq.F"}}"#).unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.settings.step, "merge");
        assert_eq!(resolved.settings.name, "merge1");
        assert_eq!(resolved.settings.jid_name_sep, "..");
        assert_eq!(resolved.base_dir, "data/merge/merge1");
        assert_eq!(resolved.registry, "samples.json");
        assert!(resolved.params.src.is_some());
    }
}
