//! Encryption keys, key generation and raw key files.

use std::fmt;
use std::io::Write;
use std::path::Path;

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::cipher::KeySize;
use crate::error::CryptoError;

/// Raw symmetric key material. Zeroized on drop.
///
/// `Debug` only shows the length and a fingerprint, never the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl EncryptionKey {
    /// Wraps key bytes without validating their length.
    ///
    /// Length is checked against the cipher when the key is used.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the size class, failing for lengths other than 16/24/32.
    pub fn size(&self) -> Result<KeySize, CryptoError> {
        KeySize::from_len(self.len())
    }

    /// Short identifier safe to log: first 8 hex chars of SHA-256(key).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("len", &self.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Generates a random key of `size` from the OS CSPRNG.
pub fn generate_key(size: KeySize) -> EncryptionKey {
    let mut bytes = vec![0u8; size.bytes()];
    OsRng.fill_bytes(&mut bytes);
    EncryptionKey::new(bytes)
}

/// Maps a passphrase deterministically onto a key of `size`.
///
/// The key is the SHA-256 digest of the passphrase truncated to the
/// requested length, so the same passphrase always yields the same key.
pub fn derive_key_from_passphrase(passphrase: &str, size: KeySize) -> EncryptionKey {
    let digest = Sha256::digest(passphrase.as_bytes());
    EncryptionKey::new(digest[..size.bytes()].to_vec())
}

/// Writes `key` as raw bytes to a new file readable only by the owner.
///
/// Fails with [`CryptoError::KeyFileExists`] instead of replacing a file.
pub fn write_key_file(path: &Path, key: &EncryptionKey) -> Result<(), CryptoError> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(CryptoError::KeyFileExists(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(key.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Reads a raw key file and validates its length class.
pub fn read_key_file(path: &Path) -> Result<EncryptionKey, CryptoError> {
    let key = EncryptionKey::new(std::fs::read(path)?);
    key.size()?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_requested_size() {
        for size in KeySize::ALL {
            let key = generate_key(size);
            assert_eq!(key.len(), size.bytes());
            assert_eq!(key.size().unwrap(), size);
        }
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_key(KeySize::Bytes32);
        let b = generate_key(KeySize::Bytes32);
        assert_ne!(a, b);
    }

    #[test]
    fn passphrase_derivation_is_deterministic() {
        let a = derive_key_from_passphrase("correct horse", KeySize::Bytes24);
        let b = derive_key_from_passphrase("correct horse", KeySize::Bytes24);
        let c = derive_key_from_passphrase("battery staple", KeySize::Bytes24);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn debug_does_not_leak_bytes() {
        let key = EncryptionKey::new(vec![0xAB; 16]);
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("bytes"));
        assert!(!dbg.contains("[171"));
        assert!(dbg.contains("len: 16"));
        assert!(dbg.contains(&key.fingerprint()));
    }

    #[test]
    fn key_file_roundtrip_and_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.key");
        let key = generate_key(KeySize::Bytes16);
        write_key_file(&path, &key).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), key.as_bytes());
        assert_eq!(read_key_file(&path).unwrap(), key);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn key_file_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.key");
        std::fs::write(&path, b"existing").unwrap();
        let result = write_key_file(&path, &generate_key(KeySize::Bytes16));
        assert!(matches!(result, Err(CryptoError::KeyFileExists(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
    }

    #[test]
    fn read_key_file_rejects_bad_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        std::fs::write(&path, [1u8; 10]).unwrap();
        assert!(matches!(
            read_key_file(&path),
            Err(CryptoError::InvalidKeyLength(10))
        ));
    }
}
