use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::{DataType, Scope, ScopeKey};
use crate::error::KiraError;

/// Tags that describe a sample rather than point at data. Never resolved as sources.
pub const RESERVED_TAGS: [&str; 2] = ["type", "..grouping.."];

pub fn is_reserved(tag: &str) -> bool {
    RESERVED_TAGS.contains(&tag)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Single(Utf8PathBuf),
    Many(Vec<Utf8PathBuf>),
}

impl SlotValue {
    pub fn files(&self) -> &[Utf8PathBuf] {
        match self {
            SlotValue::Single(path) => std::slice::from_ref(path),
            SlotValue::Many(paths) => paths,
        }
    }

    /// The one file in this slot. A single-element list unwraps to its element.
    pub fn single(&self) -> Option<&Utf8PathBuf> {
        match self.files() {
            [path] => Some(path),
            _ => None,
        }
    }
}

pub type SlotMap = IndexMap<String, SlotValue>;

/// Two-level map of `scope key -> type tag -> file(s)`. Key order is the
/// iteration order used by planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRegistry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project_data: SlotMap,
    #[serde(default)]
    pub samples: IndexMap<String, SlotMap>,
}

impl DataRegistry {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, KiraError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| KiraError::ConfigRead(path.as_std_path().to_path_buf()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, KiraError> {
        serde_json::from_str(content).map_err(|err| KiraError::RegistryParse(err.to_string()))
    }

    /// All scope keys covered by a scope, in registry order.
    pub fn keys_for(&self, scope: Scope) -> Vec<ScopeKey> {
        match scope {
            Scope::Project => vec![ScopeKey::Project],
            Scope::Sample => self
                .samples
                .keys()
                .map(|name| ScopeKey::Sample(name.clone()))
                .collect(),
        }
    }

    /// Name used in output file names and script names.
    pub fn title_for<'a>(&'a self, key: &'a ScopeKey) -> &'a str {
        match key {
            ScopeKey::Project => &self.title,
            ScopeKey::Sample(name) => name,
        }
    }

    pub fn slots(&self, key: &ScopeKey) -> Option<&SlotMap> {
        match key {
            ScopeKey::Project => Some(&self.project_data),
            ScopeKey::Sample(name) => self.samples.get(name),
        }
    }

    pub fn slots_mut(&mut self, key: &ScopeKey) -> Option<&mut SlotMap> {
        match key {
            ScopeKey::Project => Some(&mut self.project_data),
            ScopeKey::Sample(name) => self.samples.get_mut(name),
        }
    }

    pub fn get(&self, key: &ScopeKey, data_type: &DataType) -> Option<&SlotValue> {
        self.slots(key)
            .and_then(|slots| slots.get(data_type.as_str()))
    }

    pub fn contains(&self, key: &ScopeKey, data_type: &DataType) -> bool {
        self.get(key, data_type).is_some()
    }

    pub fn set(&mut self, key: &ScopeKey, data_type: &DataType, value: SlotValue) {
        if let Some(slots) = self.slots_mut(key) {
            slots.insert(data_type.as_str().to_string(), value);
        }
    }

    pub fn in_all_samples(&self, data_type: &DataType) -> bool {
        !self.samples.is_empty()
            && self
                .samples
                .values()
                .all(|slots| slots.contains_key(data_type.as_str()))
    }

    pub fn in_any_sample(&self, data_type: &DataType) -> bool {
        self.samples
            .values()
            .any(|slots| slots.contains_key(data_type.as_str()))
    }

    pub fn in_project(&self, data_type: &DataType) -> bool {
        self.project_data.contains_key(data_type.as_str())
    }
}
