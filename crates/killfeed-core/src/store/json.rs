use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{Snapshot, StateStore};

/// Whole-state JSON file, replaced atomically on save (write temp file, then rename).
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_snapshot;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_roundtrip_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("state.json"));
        store.save(&sample_snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample_snapshot()));
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(JsonStore::new(&path).load().is_err());
    }
}
