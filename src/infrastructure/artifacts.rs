//! Filesystem-backed artifact store.
//!
//! Artifacts live as flat files under one directory. Writes go through a
//! temp file followed by a rename, so a reader (or a concurrent run) never
//! observes a partially written artifact.

use crate::domain::ports::ArtifactStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact directory {:?}", dir))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.path(name)).with_context(|| format!("failed to read artifact '{}'", name))
    }

    fn store(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, bytes)
            .with_context(|| format!("failed to write temp file for artifact '{}'", name))?;
        fs::rename(&tmp, self.path(name))
            .with_context(|| format!("failed to move artifact '{}' into place", name))?;
        debug!(artifact = %name, bytes = bytes.len(), "Stored artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        assert!(!store.exists("model.json"));
        store.store("model.json", b"{\"v\":1}").unwrap();
        assert!(store.exists("model.json"));
        assert_eq!(store.load("model.json").unwrap(), b"{\"v\":1}");

        // No temp file left behind after the rename.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_artifact_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.load("absent.json").is_err());
    }
}
