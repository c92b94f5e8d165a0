use std::fs;

use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::DataType;
use crate::error::KiraError;

/// Target type and output extension implied by a source type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct DefaultMapping {
    pub target: DataType,
    pub extension: String,
}

impl From<(String, String)> for DefaultMapping {
    fn from((target, extension): (String, String)) -> Self {
        Self {
            target: DataType::new(target),
            extension,
        }
    }
}

impl From<DefaultMapping> for (String, String) {
    fn from(mapping: DefaultMapping) -> Self {
        (mapping.target.as_str().to_string(), mapping.extension)
    }
}

/// Command used to merge files of one extension.
///
/// In JSON a plain string is a bare command; a list is
/// `[command, pipe | null, needs_unzip]` where the trailing fields are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScriptEntry", into = "RawScriptEntry")]
pub enum ScriptEntry {
    Command(String),
    Piped {
        command: String,
        pipe: Option<String>,
        needs_unzip: bool,
    },
}

impl ScriptEntry {
    pub fn command(&self) -> &str {
        match self {
            ScriptEntry::Command(command) => command,
            ScriptEntry::Piped { command, .. } => command,
        }
    }

    pub fn needs_unzip(&self) -> bool {
        matches!(
            self,
            ScriptEntry::Piped {
                needs_unzip: true,
                ..
            }
        )
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawScriptEntry {
    Command(String),
    List(Vec<Value>),
}

impl TryFrom<RawScriptEntry> for ScriptEntry {
    type Error = String;

    fn try_from(raw: RawScriptEntry) -> Result<Self, Self::Error> {
        let items = match raw {
            RawScriptEntry::Command(command) => return Ok(ScriptEntry::Command(command)),
            RawScriptEntry::List(items) => items,
        };
        let mut items = items.into_iter();
        let command = match items.next() {
            Some(Value::String(command)) => command,
            other => return Err(format!("expected command string, got {other:?}")),
        };
        let pipe = match items.next() {
            None | Some(Value::Null) => None,
            Some(Value::String(pipe)) => Some(pipe),
            Some(other) => return Err(format!("expected pipe string or null, got {other}")),
        };
        let needs_unzip = match items.next() {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => return Err(format!("expected unzip flag, got {other}")),
        };
        if items.next().is_some() {
            return Err("script entry has more than three fields".to_string());
        }
        Ok(ScriptEntry::Piped {
            command,
            pipe,
            needs_unzip,
        })
    }
}

impl From<ScriptEntry> for RawScriptEntry {
    fn from(entry: ScriptEntry) -> Self {
        match entry {
            ScriptEntry::Command(command) => RawScriptEntry::Command(command),
            ScriptEntry::Piped {
                command,
                pipe,
                needs_unzip,
            } => RawScriptEntry::List(vec![
                Value::String(command),
                pipe.map(Value::String).unwrap_or(Value::Null),
                Value::Bool(needs_unzip),
            ]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupTables {
    #[serde(default)]
    pub default_src_trg_map: IndexMap<String, DefaultMapping>,
    #[serde(default)]
    pub script_path_map: IndexMap<String, ScriptEntry>,
}

const BUILTIN_TYPES: &[(&str, &str, &str)] = &[
    ("Forward", "fastq.F", "fastq"),
    ("Reverse", "fastq.R", "fastq"),
    ("Single", "fastq.S", "fastq"),
    ("fastq.F", "fastq.F", "fastq"),
    ("fastq.R", "fastq.R", "fastq"),
    ("fastq.S", "fastq.S", "fastq"),
    ("Nucleotide", "fasta.nucl", "fasta"),
    ("Protein", "fasta.prot", "fasta"),
    ("fasta.nucl", "fasta.nucl", "fasta"),
    ("fasta.prot", "fasta.prot", "fasta"),
    ("SAM", "sam", "sam"),
    ("BAM", "bam", "bam"),
    ("sam", "sam", "sam"),
    ("bam", "bam", "bam"),
    ("VCF", "vcf", "vcf"),
    ("vcf", "vcf", "vcf"),
    ("GFF", "gff", "gff"),
    ("gff", "gff", "gff"),
    ("GTF", "gtf", "gtf"),
    ("gtf", "gtf", "gtf"),
    ("BED", "bed", "bed"),
    ("bed", "bed", "bed"),
    ("blast.nucl", "blast.nucl", "blast"),
    ("blast.prot", "blast.prot", "blast"),
];

const BUILTIN_PLAIN: &[(&str, &str)] = &[
    (".fastq", "cat"),
    (".fq", "cat"),
    (".fasta", "cat"),
    (".fa", "cat"),
    (".fna", "cat"),
    (".faa", "cat"),
    (".sam", "cat"),
    (".vcf", "cat"),
    (".gff", "cat"),
    (".gff3", "cat"),
    (".gtf", "cat"),
    (".bed", "cat"),
    (".txt", "cat"),
    (".tsv", "cat"),
    (".csv", "cat"),
    (".bam", "samtools cat"),
];

const BUILTIN_COMPRESSED: &[(&str, &str)] = &[
    (".gz", "gzip -cd"),
    (".fastq.gz", "gunzip -c"),
    (".fq.gz", "gunzip -c"),
    (".bz2", "bzip2 -dc"),
    (".zip", "unzip -p"),
];

impl LookupTables {
    pub fn builtin() -> Self {
        let default_src_trg_map = BUILTIN_TYPES
            .iter()
            .map(|(source, target, extension)| {
                (
                    source.to_string(),
                    DefaultMapping {
                        target: DataType::from(*target),
                        extension: extension.to_string(),
                    },
                )
            })
            .collect();

        let mut script_path_map: IndexMap<String, ScriptEntry> = BUILTIN_PLAIN
            .iter()
            .map(|(ext, command)| (ext.to_string(), ScriptEntry::Command(command.to_string())))
            .collect();
        for (ext, command) in BUILTIN_COMPRESSED {
            script_path_map.insert(
                ext.to_string(),
                ScriptEntry::Piped {
                    command: command.to_string(),
                    pipe: None,
                    needs_unzip: true,
                },
            );
        }

        Self {
            default_src_trg_map,
            script_path_map,
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, KiraError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| KiraError::ConfigRead(path.as_std_path().to_path_buf()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, KiraError> {
        serde_json::from_str(content).map_err(|err| KiraError::TablesParse(err.to_string()))
    }

    /// Built-in tables with every entry of `other` added or replaced.
    pub fn with_overrides(mut self, other: LookupTables) -> Self {
        self.default_src_trg_map.extend(other.default_src_trg_map);
        self.script_path_map.extend(other.script_path_map);
        self
    }

    pub fn default_for(&self, source: &DataType) -> Option<&DefaultMapping> {
        self.default_src_trg_map.get(source.as_str())
    }

    pub fn script_for(&self, extension: &str) -> Option<&ScriptEntry> {
        self.script_path_map.get(extension)
    }

    /// Extension key used to look a file up in the script path table.
    ///
    /// Prefers a two-part suffix (`.fastq.gz`) when the table knows it.
    pub fn sniff_extension(&self, path: &Utf8Path) -> String {
        let name = path.file_name().unwrap_or(path.as_str());
        let last = final_suffix(name);
        if last.is_empty() {
            return String::new();
        }
        let previous = final_suffix(&name[..name.len() - last.len()]);
        if !previous.is_empty() {
            let compound = format!("{previous}{last}");
            if self.script_path_map.contains_key(&compound) {
                return compound;
            }
        }
        last.to_string()
    }
}

/// Final `.suffix` of a file name including the dot, or `""`. Leading dots
/// of hidden files do not start a suffix.
pub fn final_suffix(name: &str) -> &str {
    let trimmed = name.trim_start_matches('.');
    match trimmed.rfind('.') {
        Some(index) => &trimmed[index..],
        None => "",
    }
}

/// Extension of the file once its compressed suffix is removed:
/// `A.fastq.gz` -> `fastq`.
pub fn unzipped_extension(path: &Utf8Path) -> Option<String> {
    let name = path.file_name()?;
    let last = final_suffix(name);
    if last.is_empty() {
        return None;
    }
    let inner = final_suffix(&name[..name.len() - last.len()]);
    let inner = inner.trim_start_matches('.');
    (!inner.is_empty()).then(|| inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_script_entries() {
        let tables = LookupTables::from_json_str(
            r#"{
                "default_src_trg_map": {"fastq.F": ["fastq.F", "fastq"]},
                "script_path_map": {
                    ".fq": "cat",
                    ".fastq.gz": ["gunzip -c", null, true],
                    ".sff": ["sffinfo -s", "seqtk seq -"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            tables.script_for(".fq"),
            Some(&ScriptEntry::Command("cat".to_string()))
        );
        assert!(tables.script_for(".fastq.gz").unwrap().needs_unzip());
        assert_eq!(
            tables.script_for(".sff"),
            Some(&ScriptEntry::Piped {
                command: "sffinfo -s".to_string(),
                pipe: Some("seqtk seq -".to_string()),
                needs_unzip: false,
            })
        );
        let mapping = tables.default_for(&DataType::from("fastq.F")).unwrap();
        assert_eq!(mapping.extension, "fastq");
    }

    #[test]
    fn rejects_malformed_entry() {
        let err = LookupTables::from_json_str(r#"{"script_path_map": {".x": [1, null]}}"#)
            .unwrap_err();
        assert!(matches!(err, KiraError::TablesParse(_)));
    }

    #[test]
    fn sniff_prefers_known_compound_suffix() {
        let tables = LookupTables::builtin();
        assert_eq!(
            tables.sniff_extension(Utf8Path::new("/d/A.fastq.gz")),
            ".fastq.gz"
        );
        assert_eq!(tables.sniff_extension(Utf8Path::new("/d/A.vcf.gz")), ".gz");
        assert_eq!(tables.sniff_extension(Utf8Path::new("/d/A.bam")), ".bam");
        assert_eq!(tables.sniff_extension(Utf8Path::new("/d/.hidden")), "");
    }

    #[test]
    fn unzipped_extension_strips_compression() {
        assert_eq!(
            unzipped_extension(Utf8Path::new("x/A.fastq.gz")),
            Some("fastq".to_string())
        );
        assert_eq!(unzipped_extension(Utf8Path::new("x/A.gz")), None);
    }
}
