use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const GUESS_TOKEN: &str = "..guess..";
pub const IMPORT_TOKEN: &str = "..import..";
pub const SKIP_TOKEN: &str = "..skip..";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Sample,
    Project,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Sample => "sample",
            Scope::Project => "project",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sample" => Ok(Scope::Sample),
            "project" => Ok(Scope::Project),
            GUESS_TOKEN => Err(KiraError::UnsupportedGuess("scope".to_string())),
            _ => Err(KiraError::InvalidScope(value.to_string())),
        }
    }
}

/// A data type tag such as `fasta.nucl` or `fastq.F`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataType(String);

impl DataType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DataType {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KiraError::InvalidParam {
                param: "src".to_string(),
                message: "empty type name".to_string(),
            });
        }
        if trimmed == GUESS_TOKEN {
            return Err(KiraError::UnsupportedGuess("src".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a registry entry lives: the project, or one named sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "sample")]
pub enum ScopeKey {
    Project,
    Sample(String),
}

impl ScopeKey {
    pub fn scope(&self) -> Scope {
        match self {
            ScopeKey::Project => Scope::Project,
            ScopeKey::Sample(_) => Scope::Sample,
        }
    }

    pub fn sample(&self) -> Option<&str> {
        match self {
            ScopeKey::Project => None,
            ScopeKey::Sample(name) => Some(name),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Project => write!(f, "project"),
            ScopeKey::Sample(name) => write!(f, "sample '{name}'"),
        }
    }
}

/// A per-item value that is either missing, explicitly deferred with
/// `..guess..`, or given literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    Unset,
    Guess,
    Value(T),
}

impl Setting<String> {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Setting::Unset,
            Some(GUESS_TOKEN) => Setting::Guess,
            Some(value) => Setting::Value(value.to_string()),
        }
    }
}

impl<T: fmt::Display> Setting<T> {
    pub fn to_raw(&self) -> Option<String> {
        match self {
            Setting::Unset => None,
            Setting::Guess => Some(GUESS_TOKEN.to_string()),
            Setting::Value(value) => Some(value.to_string()),
        }
    }
}

/// What the planner should do with a source slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptDirective {
    Guess,
    Import,
    Skip,
    Command(String),
}

impl ScriptDirective {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some(GUESS_TOKEN) => ScriptDirective::Guess,
            Some(IMPORT_TOKEN) => ScriptDirective::Import,
            Some(SKIP_TOKEN) => ScriptDirective::Skip,
            Some(command) => ScriptDirective::Command(command.to_string()),
        }
    }

    pub fn to_raw(&self) -> Option<String> {
        match self {
            ScriptDirective::Guess => None,
            ScriptDirective::Import => Some(IMPORT_TOKEN.to_string()),
            ScriptDirective::Skip => Some(SKIP_TOKEN.to_string()),
            ScriptDirective::Command(command) => Some(command.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_scope() {
        assert_eq!("sample".parse::<Scope>().unwrap(), Scope::Sample);
        assert_eq!(" project ".parse::<Scope>().unwrap(), Scope::Project);
        assert_matches!("both".parse::<Scope>(), Err(KiraError::InvalidScope(_)));
        assert_matches!(
            "..guess..".parse::<Scope>(),
            Err(KiraError::UnsupportedGuess(_))
        );
    }

    #[test]
    fn parse_directive_tokens() {
        assert_eq!(ScriptDirective::parse(None), ScriptDirective::Guess);
        assert_eq!(
            ScriptDirective::parse(Some("..guess..")),
            ScriptDirective::Guess
        );
        assert_eq!(
            ScriptDirective::parse(Some("..import..")),
            ScriptDirective::Import
        );
        assert_eq!(
            ScriptDirective::parse(Some("..skip..")),
            ScriptDirective::Skip
        );
        assert_eq!(
            ScriptDirective::parse(Some("zcat")),
            ScriptDirective::Command("zcat".to_string())
        );
    }

    #[test]
    fn setting_round_trips_through_raw() {
        for raw in [None, Some("..guess.."), Some("fasta")] {
            let setting = Setting::parse(raw);
            assert_eq!(setting.to_raw().as_deref(), raw);
        }
    }
}
