use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::app::BuildResult;
use crate::error::KiraError;

/// Output layout of a persisted build:
/// `<root>/scripts/<block>.sh`, `<root>/registry.json`, `<root>/manifest.json`.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub tool: String,
    pub generated_at: String,
    pub mode: String,
    pub scripts: Vec<String>,
    pub stamped: Vec<String>,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub scripts: Vec<Utf8PathBuf>,
    pub registry: Utf8PathBuf,
    pub manifest: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn scripts_dir(&self) -> Utf8PathBuf {
        self.root.join("scripts")
    }

    pub fn script_path(&self, name: &str) -> Utf8PathBuf {
        self.scripts_dir().join(format!("{name}.sh"))
    }

    pub fn registry_path(&self) -> Utf8PathBuf {
        self.root.join("registry.json")
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join("manifest.json")
    }

    pub fn write_build(
        &self,
        result: &BuildResult,
        stamped: &[Utf8PathBuf],
    ) -> Result<WriteSummary, KiraError> {
        let mut scripts = Vec::new();
        for block in result.scripts() {
            let path = self.script_path(&block.name);
            let content = format!("#!/bin/bash\nset -euo pipefail\n\n{}", block.text);
            Self::write_bytes_atomic(&path, content.as_bytes())?;
            scripts.push(path);
        }

        let registry = serde_json::to_vec_pretty(&result.registry)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&self.registry_path(), &registry)?;

        let manifest = Manifest {
            tool: format!("kira-merge/{}", env!("CARGO_PKG_VERSION")),
            generated_at: now_rfc3339(),
            mode: result.mode.as_str().to_string(),
            scripts: result.scripts().map(|block| block.name.clone()).collect(),
            stamped: stamped.iter().map(|path| path.to_string()).collect(),
            warnings: result.warnings.len(),
        };
        Self::write_metadata(&self.manifest_path(), &manifest)?;

        Ok(WriteSummary {
            scripts,
            registry: self.registry_path(),
            manifest: self.manifest_path(),
        })
    }

    pub fn read_manifest(&self) -> Result<Manifest, KiraError> {
        let content = fs::read_to_string(self.manifest_path().as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn write_metadata(path: &Utf8Path, manifest: &Manifest) -> Result<(), KiraError> {
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix("kira-merge-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/work/out"));
        assert!(
            store
                .script_path("merge..merge1..A..fastq.F")
                .ends_with("scripts/merge..merge1..A..fastq.F.sh")
        );
        assert!(store.registry_path().ends_with("registry.json"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/file.txt")).unwrap();
        Store::write_bytes_atomic(&path, b"one").unwrap();
        Store::write_bytes_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "two");
    }
}
