use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use vaultdrop_crypto::{EncryptionKey, read_key_file, write_key_file};
use vaultdrop_protocol::FileId;

use crate::error::KeystoreError;
use crate::index::{Index, IndexEntry, temp_path};
use crate::shred::{ShredConfig, shred_dir, shred_file};
use crate::{INDEX_FILE, KEY_EXTENSION};

/// A key registered in the keystore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreEntry {
    pub file_id: FileId,
    pub key_path: PathBuf,
    pub added_at: DateTime<Utc>,
}

impl KeystoreEntry {
    /// Whether the key file is still on disk.
    pub fn key_exists(&self) -> bool {
        self.key_path.is_file()
    }
}

/// Summary of a keystore's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreInfo {
    pub path: PathBuf,
    pub total: usize,
    pub valid: usize,
    pub orphaned: usize,
}

/// Directory-backed key store.
///
/// Safe to share between threads: every index mutation takes the internal
/// lock, updates the in-memory index and rewrites the index file before
/// releasing it.
#[derive(Debug)]
pub struct Keystore {
    dir: PathBuf,
    index_path: PathBuf,
    /// `None` once the keystore is closed.
    state: Mutex<Option<Index>>,
}

impl Keystore {
    /// Creates a new keystore at `dir`.
    ///
    /// The directory is created if missing. An existing directory may only
    /// hold files a keystore puts there; an index already present is kept.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, KeystoreError> {
        let dir = dir.into();
        let index_path = dir.join(INDEX_FILE);

        match std::fs::metadata(&dir) {
            Ok(meta) if !meta.is_dir() => return Err(KeystoreError::InvalidDir(dir)),
            Ok(_) => {
                for entry in std::fs::read_dir(&dir)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_file() || !is_owned(&dir, &entry.path()) {
                        return Err(KeystoreError::DirNotEmpty(dir));
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir_all(&dir)?;
            }
            Err(e) => return Err(e.into()),
        }
        restrict_dir_permissions(&dir)?;

        let index = Index::load(&index_path)?;
        if index_path.exists() {
            tracing::info!(path = %dir.display(), entries = index.entries.len(), "reusing existing keystore index");
        } else {
            index.save(&index_path)?;
        }

        tracing::info!(path = %dir.display(), "created keystore");
        Ok(Self {
            dir,
            index_path,
            state: Mutex::new(Some(index)),
        })
    }

    /// Opens an existing keystore directory, writing an empty index if the
    /// directory has none yet.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KeystoreError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(KeystoreError::InvalidDir(dir));
        }

        let index_path = dir.join(INDEX_FILE);
        let index = Index::load(&index_path)?;
        if !index_path.exists() {
            index.save(&index_path)?;
        }

        tracing::debug!(path = %dir.display(), entries = index.entries.len(), "opened keystore");
        Ok(Self {
            dir,
            index_path,
            state: Mutex::new(Some(index)),
        })
    }

    /// Whether `dir` holds a keystore index.
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    /// Releases the in-memory index. Later operations fail with
    /// [`KeystoreError::Closed`].
    pub fn close(&self) {
        self.state.lock().unwrap().take();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Fresh, unused path for a key file inside the keystore.
    pub fn new_key_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{KEY_EXTENSION}", uuid::Uuid::new_v4().simple()))
    }

    /// Associates `file_id` with an existing key file, replacing any
    /// previous association.
    pub fn add_key(&self, file_id: FileId, key_path: &Path) -> Result<(), KeystoreError> {
        std::fs::metadata(key_path)?;
        let key_file = self.stored_path(key_path);

        self.mutate(|index| {
            let previous = index.entries.insert(
                file_id.to_string(),
                IndexEntry {
                    key_file,
                    added_at: Utc::now(),
                },
            );
            if previous.is_some() {
                tracing::debug!(%file_id, "replaced keystore entry");
            }
            Ok(())
        })?;

        tracing::info!(%file_id, key = %key_path.display(), "registered key");
        Ok(())
    }

    /// Writes `key` into a new key file inside the keystore and registers it.
    pub fn add_key_bytes(
        &self,
        file_id: FileId,
        key: &EncryptionKey,
    ) -> Result<PathBuf, KeystoreError> {
        self.ensure_open()?;
        let path = self.new_key_path();
        write_key_file(&path, key)?;

        if let Err(e) = self.add_key(file_id, &path) {
            if let Err(shred_err) = shred_file(&path, &ShredConfig::default()) {
                tracing::warn!(file = %path.display(), error = %shred_err, "failed to remove unregistered key file");
            }
            return Err(e);
        }
        tracing::debug!(%file_id, fingerprint = %key.fingerprint(), "stored key material");
        Ok(path)
    }

    /// Path of the key file registered for `file_id`.
    pub fn key_path(&self, file_id: FileId) -> Result<Option<PathBuf>, KeystoreError> {
        let state = self.state.lock().unwrap();
        let index = state.as_ref().ok_or(KeystoreError::Closed)?;
        Ok(index
            .entries
            .get(&file_id.to_string())
            .map(|entry| self.resolve(&entry.key_file)))
    }

    /// Reads the key registered for `file_id`.
    ///
    /// Returns `Ok(None)` when no key is registered and
    /// [`KeystoreError::KeyFileMissing`] when the entry is orphaned.
    pub fn get_key(&self, file_id: FileId) -> Result<Option<EncryptionKey>, KeystoreError> {
        let Some(path) = self.key_path(file_id)? else {
            return Ok(None);
        };
        if !path.is_file() {
            return Err(KeystoreError::KeyFileMissing(file_id));
        }
        Ok(Some(read_key_file(&path)?))
    }

    /// All entries, ordered by file id.
    pub fn get_files(&self) -> Result<Vec<KeystoreEntry>, KeystoreError> {
        let state = self.state.lock().unwrap();
        let index = state.as_ref().ok_or(KeystoreError::Closed)?;

        let mut entries: Vec<KeystoreEntry> = index
            .entries
            .iter()
            .filter_map(|(id, entry)| match id.parse::<FileId>() {
                Ok(file_id) => Some(KeystoreEntry {
                    file_id,
                    key_path: self.resolve(&entry.key_file),
                    added_at: entry.added_at,
                }),
                Err(_) => {
                    tracing::warn!(id = %id, "ignoring keystore entry with invalid file id");
                    None
                }
            })
            .collect();
        entries.sort_by_key(|e| e.file_id);
        Ok(entries)
    }

    /// Number of entries whose key file still exists.
    pub fn get_valid_key_count(&self) -> Result<usize, KeystoreError> {
        Ok(self.get_files()?.iter().filter(|e| e.key_exists()).count())
    }

    /// Unregisters `file_id` and returns the removed entry.
    ///
    /// The key file itself is left on disk; pass the returned path to
    /// [`shred_file`] to destroy it.
    pub fn delete_key(&self, file_id: FileId) -> Result<Option<KeystoreEntry>, KeystoreError> {
        let removed = self.mutate(|index| Ok(index.entries.remove(&file_id.to_string())))?;
        Ok(removed.map(|entry| {
            tracing::info!(%file_id, "unregistered key");
            KeystoreEntry {
                file_id,
                key_path: self.resolve(&entry.key_file),
                added_at: entry.added_at,
            }
        }))
    }

    /// Drops entries whose key file no longer exists and returns how many
    /// were removed.
    pub fn cleanup(&self) -> Result<usize, KeystoreError> {
        let removed = self.mutate(|index| {
            let orphans: Vec<String> = index
                .entries
                .iter()
                .filter(|(_, entry)| !self.resolve(&entry.key_file).is_file())
                .map(|(id, _)| id.clone())
                .collect();
            for id in &orphans {
                tracing::warn!(file_id = %id, "removing orphaned keystore entry");
                index.entries.remove(id);
            }
            Ok(orphans.len())
        })?;

        if removed > 0 {
            tracing::info!(removed, "cleaned up keystore");
        }
        Ok(removed)
    }

    pub fn info(&self) -> Result<KeystoreInfo, KeystoreError> {
        let files = self.get_files()?;
        let valid = files.iter().filter(|e| e.key_exists()).count();
        Ok(KeystoreInfo {
            path: self.dir.clone(),
            total: files.len(),
            valid,
            orphaned: files.len() - valid,
        })
    }

    /// Shreds everything in the keystore directory and removes it.
    ///
    /// The keystore is closed first. See [`Keystore::destroy_dir`].
    pub fn destroy(self, shred: &ShredConfig) -> Result<usize, KeystoreError> {
        self.close();
        Self::destroy_dir(&self.dir, shred)
    }

    /// Shreds every file under `dir` and removes the directory, without
    /// reading the index. Works on keystores whose index is missing or
    /// unreadable.
    ///
    /// If any file cannot be shredded the directory is kept and
    /// [`KeystoreError::ShredIncomplete`] is returned.
    pub fn destroy_dir(dir: &Path, shred: &ShredConfig) -> Result<usize, KeystoreError> {
        let (shredded, failures) = shred_dir(dir, shred);
        if !failures.is_empty() {
            for (path, error) in &failures {
                tracing::warn!(file = %path.display(), %error, "failed to shred keystore file");
            }
            return Err(KeystoreError::ShredIncomplete(failures.len()));
        }
        std::fs::remove_dir_all(dir)?;

        tracing::info!(path = %dir.display(), shredded, "destroyed keystore");
        Ok(shredded)
    }

    fn ensure_open(&self) -> Result<(), KeystoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(KeystoreError::Closed)
        }
    }

    /// Applies `f` to the index and persists it, all under the lock.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Index) -> Result<T, KeystoreError>,
    ) -> Result<T, KeystoreError> {
        let mut state = self.state.lock().unwrap();
        let index = state.as_mut().ok_or(KeystoreError::Closed)?;

        let mut updated = index.clone();
        let value = f(&mut updated)?;
        if updated != *index {
            updated.save(&self.index_path)?;
            *index = updated;
        }
        Ok(value)
    }

    fn stored_path(&self, key_path: &Path) -> PathBuf {
        match key_path.strip_prefix(&self.dir) {
            Ok(relative) if relative.components().count() == 1 => relative.to_path_buf(),
            _ => std::path::absolute(key_path).unwrap_or_else(|_| key_path.to_path_buf()),
        }
    }

    fn resolve(&self, key_file: &Path) -> PathBuf {
        if key_file.is_absolute() {
            key_file.to_path_buf()
        } else {
            self.dir.join(key_file)
        }
    }
}

/// Whether `path` is something a keystore in `dir` puts there itself.
fn is_owned(dir: &Path, path: &Path) -> bool {
    if path.parent() != Some(dir) {
        return false;
    }
    let index_path = dir.join(INDEX_FILE);
    path == index_path
        || path == temp_path(&index_path)
        || path.extension().is_some_and(|ext| ext == KEY_EXTENSION)
}

#[cfg(unix)]
fn restrict_dir_permissions(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
