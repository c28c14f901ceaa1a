//! Symmetric encryption codec for file payloads.
//!
//! Encrypted payloads use the wire format `[IV][ciphertext]` where the IV is
//! one cipher block long. The codec is stateless; the slice functions in
//! [`codec`] perform no I/O and the adapters in [`stream`] only wrap an
//! existing reader.

pub mod cipher;
pub mod codec;
pub mod error;
pub mod key;
pub mod stream;

pub use cipher::{Cipher, KeySize};
pub use codec::{decrypt, decrypt_with_id, encrypt, encrypt_with_iv, generate_iv};
pub use error::CryptoError;
pub use key::{EncryptionKey, derive_key_from_passphrase, generate_key, read_key_file, write_key_file};
pub use stream::{DecryptingReader, EncryptingReader};

/// IV length of the primary cipher (one AES block).
pub const IV_LEN: usize = 16;
