use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes192, Aes256};
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::error::CryptoError;
use crate::key::EncryptionKey;
use crate::IV_LEN;

/// Supported cipher identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    /// AES in CTR mode with a 128-bit big-endian counter.
    Aes,
    /// Reserved for public-key encryption; recognised but not implemented.
    Rsa,
}

impl Cipher {
    /// Wire identifier of this cipher.
    pub fn as_str(self) -> &'static str {
        match self {
            Cipher::Aes => "aes",
            Cipher::Rsa => "rsa",
        }
    }

    /// Returns `true` if the codec can encrypt and decrypt with this cipher.
    pub fn is_supported(self) -> bool {
        matches!(self, Cipher::Aes)
    }

    /// IV length, equal to the cipher block size.
    pub fn iv_len(self) -> usize {
        match self {
            Cipher::Aes | Cipher::Rsa => IV_LEN,
        }
    }

    /// Parses a cipher identifier found on an encrypted payload.
    ///
    /// Unknown and unimplemented identifiers both yield
    /// [`CryptoError::Unsupported`] carrying the offending identifier.
    pub fn for_decryption(id: &str) -> Result<Cipher, CryptoError> {
        match id.parse::<Cipher>() {
            Ok(cipher) if cipher.is_supported() => Ok(cipher),
            _ => Err(CryptoError::Unsupported(id.to_string())),
        }
    }

    /// Validates `key` for this cipher and returns its size class.
    pub fn check_key(self, key: &EncryptionKey) -> Result<KeySize, CryptoError> {
        if !self.is_supported() {
            return Err(CryptoError::Unsupported(self.as_str().to_string()));
        }
        KeySize::from_len(key.len())
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cipher {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes" | "aes-ctr" => Ok(Cipher::Aes),
            "rsa" => Ok(Cipher::Rsa),
            _ => Err(CryptoError::UnknownCipher(s.to_string())),
        }
    }
}

/// Key length class of the primary cipher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySize {
    Bytes16,
    Bytes24,
    #[default]
    Bytes32,
}

impl KeySize {
    pub const ALL: [KeySize; 3] = [KeySize::Bytes16, KeySize::Bytes24, KeySize::Bytes32];

    pub fn from_len(len: usize) -> Result<KeySize, CryptoError> {
        match len {
            16 => Ok(KeySize::Bytes16),
            24 => Ok(KeySize::Bytes24),
            32 => Ok(KeySize::Bytes32),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    /// Key length in bytes.
    pub fn bytes(self) -> usize {
        match self {
            KeySize::Bytes16 => 16,
            KeySize::Bytes24 => 24,
            KeySize::Bytes32 => 32,
        }
    }
}

// ---------------------------------------------------------------------------
// Keystream
// ---------------------------------------------------------------------------

/// AES-CTR keystream for one of the three key sizes.
pub(crate) enum Keystream {
    Aes128(Ctr128BE<Aes128>),
    Aes192(Ctr128BE<Aes192>),
    Aes256(Ctr128BE<Aes256>),
}

impl Keystream {
    pub(crate) fn new(
        cipher: Cipher,
        key: &EncryptionKey,
        iv: &[u8; IV_LEN],
    ) -> Result<Self, CryptoError> {
        let size = cipher.check_key(key)?;
        let bytes = key.as_bytes();
        let invalid = |_| CryptoError::InvalidKeyLength(bytes.len());
        Ok(match size {
            KeySize::Bytes16 => {
                Keystream::Aes128(Ctr128BE::<Aes128>::new_from_slices(bytes, iv).map_err(invalid)?)
            }
            KeySize::Bytes24 => {
                Keystream::Aes192(Ctr128BE::<Aes192>::new_from_slices(bytes, iv).map_err(invalid)?)
            }
            KeySize::Bytes32 => {
                Keystream::Aes256(Ctr128BE::<Aes256>::new_from_slices(bytes, iv).map_err(invalid)?)
            }
        })
    }

    /// XORs the keystream into `buf` in place.
    pub(crate) fn apply(&mut self, buf: &mut [u8]) {
        match self {
            Keystream::Aes128(c) => c.apply_keystream(buf),
            Keystream::Aes192(c) => c.apply_keystream(buf),
            Keystream::Aes256(c) => c.apply_keystream(buf),
        }
    }
}
