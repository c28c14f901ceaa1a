//! Slice-level encrypt/decrypt over the `[IV][ciphertext]` format.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::IV_LEN;
use crate::cipher::{Cipher, Keystream};
use crate::error::CryptoError;
use crate::key::EncryptionKey;

/// Generates a fresh random IV.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypts `plaintext`, prepending a freshly generated IV.
pub fn encrypt(
    plaintext: &[u8],
    key: &EncryptionKey,
    cipher: Cipher,
) -> Result<Vec<u8>, CryptoError> {
    cipher.check_key(key)?;
    encrypt_with_iv(plaintext, key, cipher, &generate_iv())
}

/// Encrypts `plaintext` under a caller-chosen IV.
///
/// Only useful for fixed test vectors; reusing an IV with the same key
/// leaks the XOR of the plaintexts.
pub fn encrypt_with_iv(
    plaintext: &[u8],
    key: &EncryptionKey,
    cipher: Cipher,
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let mut keystream = Keystream::new(cipher, key, iv)?;
    let mut out = Vec::with_capacity(IV_LEN + plaintext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(plaintext);
    keystream.apply(&mut out[IV_LEN..]);
    Ok(out)
}

/// Decrypts a `[IV][ciphertext]` buffer.
pub fn decrypt(
    ciphertext: &[u8],
    key: &EncryptionKey,
    cipher: Cipher,
) -> Result<Vec<u8>, CryptoError> {
    cipher.check_key(key)?;
    if ciphertext.len() < IV_LEN {
        return Err(CryptoError::Truncated(ciphertext.len()));
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);
    let mut iv_buf = [0u8; IV_LEN];
    iv_buf.copy_from_slice(iv);

    let mut keystream = Keystream::new(cipher, key, &iv_buf)?;
    let mut out = body.to_vec();
    keystream.apply(&mut out);
    Ok(out)
}

/// Decrypts using the cipher identifier found on a payload.
///
/// Unknown identifiers yield [`CryptoError::Unsupported`].
pub fn decrypt_with_id(
    ciphertext: &[u8],
    key: &EncryptionKey,
    cipher_id: &str,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Cipher::for_decryption(cipher_id)?;
    decrypt(ciphertext, key, cipher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KeySize;
    use crate::key::generate_key;

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        // xorshift, enough to get varied bytes without an RNG dependency in tests.
        let mut x = seed.max(1);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect()
    }

    #[test]
    fn roundtrip_all_key_sizes_and_lengths() {
        for size in KeySize::ALL {
            let key = generate_key(size);
            for (i, len) in [0usize, 1, 15, 16, 17, 1000, 65_537].into_iter().enumerate() {
                let plaintext = pseudo_random(len, i as u32 + 7);
                let ct = encrypt(&plaintext, &key, Cipher::Aes).unwrap();
                assert_eq!(ct.len(), plaintext.len() + IV_LEN);
                let pt = decrypt(&ct, &key, Cipher::Aes).unwrap();
                assert_eq!(pt, plaintext, "size {size:?}, len {len}");
            }
        }
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let key = generate_key(KeySize::Bytes16);
        let a = encrypt(b"same", &key, Cipher::Aes).unwrap();
        let b = encrypt(b"same", &key, Cipher::Aes).unwrap();
        assert_ne!(a[..IV_LEN], b[..IV_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn nist_sp800_38a_ctr_aes128_vector() {
        let key = EncryptionKey::new(hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap());
        let iv: [u8; IV_LEN] = hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff")
            .unwrap()
            .try_into()
            .unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let ct = encrypt_with_iv(&plaintext, &key, Cipher::Aes, &iv).unwrap();
        assert_eq!(&ct[..IV_LEN], &iv);
        assert_eq!(hex::encode(&ct[IV_LEN..]), "874d6191b620e3261bef6864990db6ce");
        assert_eq!(decrypt(&ct, &key, Cipher::Aes).unwrap(), plaintext);
    }

    #[test]
    fn invalid_key_lengths_rejected() {
        for len in [0usize, 1, 15, 17, 20, 31, 33, 64] {
            let key = EncryptionKey::new(vec![7u8; len]);
            let enc = encrypt(b"data", &key, Cipher::Aes).unwrap_err();
            assert!(matches!(enc, CryptoError::InvalidKeyLength(l) if l == len));
            assert!(enc.is_configuration());

            let dec = decrypt(&[0u8; 32], &key, Cipher::Aes).unwrap_err();
            assert!(matches!(dec, CryptoError::InvalidKeyLength(l) if l == len));
        }
    }

    #[test]
    fn wrong_key_yields_different_plaintext() {
        let key = generate_key(KeySize::Bytes32);
        let wrong = generate_key(KeySize::Bytes32);
        let ct = encrypt(b"attack at dawn", &key, Cipher::Aes).unwrap();
        let pt = decrypt(&ct, &wrong, Cipher::Aes).unwrap();
        assert_ne!(pt, b"attack at dawn");
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let key = generate_key(KeySize::Bytes16);
        assert!(matches!(
            decrypt(&[0u8; 5], &key, Cipher::Aes),
            Err(CryptoError::Truncated(5))
        ));
    }

    #[test]
    fn unsupported_cipher_ids() {
        let key = generate_key(KeySize::Bytes16);
        let ct = encrypt(b"x", &key, Cipher::Aes).unwrap();
        match decrypt_with_id(&ct, &key, "chacha") {
            Err(CryptoError::Unsupported(id)) => assert_eq!(id, "chacha"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            encrypt(b"x", &key, Cipher::Rsa),
            Err(CryptoError::Unsupported(_))
        ));
        assert_eq!(decrypt_with_id(&ct, &key, "aes").unwrap(), b"x");
    }
}
