use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid scope value: '{0}' (expected 'sample' or 'project')")]
    InvalidScope(String),

    #[error(
        "parameter '{param}' must be a single value or a list the length of 'src' ({expected}), got {len} values. Put '..guess..' in places to be determined automatically"
    )]
    ParamLength {
        param: String,
        len: usize,
        expected: usize,
    },

    #[error("'src' not specified. Please do not specify '{0}'")]
    ForbiddenInBasicMode(String),

    #[error(
        "'src' not specified. Please do not specify '{0}' as a list (only string values are accepted)"
    )]
    ListInBasicMode(String),

    #[error("..guess.. in '{0}' is not supported")]
    UnsupportedGuess(String),

    #[error("invalid value for '{param}': {message}")]
    InvalidParam { param: String, message: String },

    #[error("invalid merge specification ({} problems)", errors.len())]
    InvalidSpec {
        #[related]
        errors: Vec<KiraError>,
    },

    #[error("no data slots found to merge in the sample registry")]
    NothingToMerge,

    #[error("type '{source_type}' does not exist in {scope} data")]
    SourceNotFound { source_type: String, scope: String },

    #[error(
        "'{0}' does not exist in all samples or in project. Make sure the sample file is correct, or pass 'scope' explicitly"
    )]
    ScopeNotInferable(String),

    #[error("src '{0}' is not recognized. Can't guess 'trg'")]
    UnknownSourceType(String),

    #[error(
        "more than one file extension in source '{source_type}' for {at} ({extensions}). Can't guess 'script_path'"
    )]
    AmbiguousExtension {
        source_type: String,
        at: String,
        extensions: String,
    },

    #[error(
        "unidentified extension in source '{source_type}' for {at} ({extension}). Can't guess 'script_path'"
    )]
    UnknownExtension {
        source_type: String,
        at: String,
        extension: String,
    },

    #[error("source '{source_type}' holds no files for {at}")]
    EmptySlot { source_type: String, at: String },

    #[error("cannot import source '{source_type}' for {at}: slot holds {count} files")]
    AmbiguousImport {
        source_type: String,
        at: String,
        count: usize,
    },

    #[error(
        "sources '{first}' and '{second}' both write target '{target}' for {at}"
    )]
    DuplicateTarget {
        target: String,
        at: String,
        first: String,
        second: String,
    },

    #[error(
        "script '{name}' for {at} would be generated for both targets '{first}' and '{second}'. Each source can be converted once per sample"
    )]
    DuplicateScript {
        name: String,
        at: String,
        first: String,
        second: String,
    },

    #[error("{0} warnings raised while resolving and --strict is set")]
    WarningsDenied(usize),

    #[error("missing config file kira-merge.json in current directory")]
    MissingConfig,

    #[error("failed to read file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to parse lookup tables: {0}")]
    TablesParse(String),

    #[error("failed to parse sample registry: {0}")]
    RegistryParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    /// Configuration problems detected before any registry data is consulted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KiraError::InvalidScope(_)
                | KiraError::ParamLength { .. }
                | KiraError::ForbiddenInBasicMode(_)
                | KiraError::ListInBasicMode(_)
                | KiraError::UnsupportedGuess(_)
                | KiraError::InvalidParam { .. }
                | KiraError::InvalidSpec { .. }
        )
    }
}
