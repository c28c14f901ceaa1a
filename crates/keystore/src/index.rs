//! On-disk JSON index of a keystore.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KeystoreError;

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    /// Key file name relative to the keystore directory, or an absolute path
    /// for keys registered from elsewhere.
    pub key_file: PathBuf,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Index {
    version: u32,
    /// Keyed by the decimal file id.
    #[serde(default)]
    pub entries: BTreeMap<String, IndexEntry>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Index {
    /// Loads the index at `path`, or returns an empty one if it does not exist.
    pub fn load(path: &Path) -> Result<Self, KeystoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Index::default()),
            Err(e) => return Err(e.into()),
        };

        let index: Index =
            serde_json::from_str(&content).map_err(|e| KeystoreError::CorruptIndex {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if index.version != INDEX_VERSION {
            return Err(KeystoreError::CorruptIndex {
                path: path.to_path_buf(),
                reason: format!("unsupported index version {}", index.version),
            });
        }
        Ok(index)
    }

    /// Writes the index to a temp file and renames it over `path`.
    pub fn save(&self, path: &Path) -> Result<(), KeystoreError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| KeystoreError::CorruptIndex {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let tmp = temp_path(path);
        {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Temp file used while rewriting the index.
pub(crate) fn temp_path(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    index_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_index_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::load(&dir.path().join("keystore.json")).unwrap();
        assert!(index.entries.is_empty());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.json");
        let mut index = Index::default();
        index.entries.insert(
            "7".into(),
            IndexEntry {
                key_file: PathBuf::from("abc.key"),
                added_at: Utc::now(),
            },
        );
        index.save(&path).unwrap();

        assert_eq!(Index::load(&path).unwrap(), index);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn corrupt_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Index::load(&path),
            Err(KeystoreError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn unknown_version_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.json");
        std::fs::write(&path, r#"{"version":99,"entries":{}}"#).unwrap();
        assert!(matches!(
            Index::load(&path),
            Err(KeystoreError::CorruptIndex { .. })
        ));
    }
}
