//! Key resolution for uploads and downloads.

use std::path::PathBuf;
use std::sync::Arc;

use vaultdrop_crypto::{
    Cipher, EncryptionKey, KeySize, derive_key_from_passphrase, generate_key, read_key_file,
};
use vaultdrop_keystore::KeystoreError;
use vaultdrop_protocol::FileId;

use crate::config::EngineContext;
use crate::error::EngineError;
use crate::prompt::Prompter;
use crate::types::DownloadOptions;

/// How an upload obtains its encryption key.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Key bytes supplied by the caller.
    Explicit(EncryptionKey),
    /// Raw key file on disk.
    KeyFile(PathBuf),
    /// Fresh key from the OS CSPRNG, one per source.
    Random { size: KeySize },
    /// Key derived from a passphrase read interactively.
    Passphrase { size: KeySize },
}

/// Key supplied for a download.
#[derive(Debug, Clone)]
pub enum DownloadKey {
    Explicit(EncryptionKey),
    KeyFile(PathBuf),
}

/// Where a resolved upload key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeyOrigin {
    Explicit,
    KeyFile(PathBuf),
    Generated,
    Passphrase,
}

/// Resolves the key for one upload and validates it against `cipher`.
pub(crate) async fn resolve_upload_key(
    source: &KeySource,
    cipher: Cipher,
    prompter: &Arc<dyn Prompter>,
) -> Result<(EncryptionKey, KeyOrigin), EngineError> {
    let (key, origin) = match source {
        KeySource::Explicit(key) => (key.clone(), KeyOrigin::Explicit),
        KeySource::KeyFile(path) => (load_key_file(path.clone()).await?, KeyOrigin::KeyFile(path.clone())),
        KeySource::Random { size } => (generate_key(*size), KeyOrigin::Generated),
        KeySource::Passphrase { size } => (
            prompt_passphrase_key(Arc::clone(prompter), *size).await?,
            KeyOrigin::Passphrase,
        ),
    };
    cipher.check_key(&key)?;
    Ok((key, origin))
}

/// Resolves the decryption key for `file_id`.
///
/// Tries, in order: the key in `options`, the keystore, then a passphrase
/// prompt. Returns `Ok(None)` when nothing produced a key.
pub(crate) async fn resolve_download_key(
    ctx: &EngineContext,
    file_id: FileId,
    options: &DownloadOptions,
) -> Result<Option<EncryptionKey>, EngineError> {
    match &options.key {
        Some(DownloadKey::Explicit(key)) => return Ok(Some(key.clone())),
        Some(DownloadKey::KeyFile(path)) => return Ok(Some(load_key_file(path.clone()).await?)),
        None => {}
    }

    if options.use_keystore
        && let Some(keystore) = &ctx.keystore
    {
        let keystore = Arc::clone(keystore);
        match tokio::task::spawn_blocking(move || keystore.get_key(file_id)).await? {
            Ok(Some(key)) => {
                tracing::debug!(%file_id, fingerprint = %key.fingerprint(), "key found in keystore");
                return Ok(Some(key));
            }
            Ok(None) => {}
            Err(KeystoreError::KeyFileMissing(_)) => {
                tracing::warn!(%file_id, "keystore entry has no key file; run keystore cleanup");
            }
            Err(e) => {
                tracing::warn!(%file_id, error = %e, "keystore lookup failed");
            }
        }
    }

    if options.allow_prompt {
        let key = prompt_passphrase_key(Arc::clone(&ctx.prompter), options.key_size).await?;
        return Ok(Some(key));
    }

    Ok(None)
}

async fn load_key_file(path: PathBuf) -> Result<EncryptionKey, EngineError> {
    let key = tokio::task::spawn_blocking(move || read_key_file(&path)).await??;
    Ok(key)
}

async fn prompt_passphrase_key(
    prompter: Arc<dyn Prompter>,
    size: KeySize,
) -> Result<EncryptionKey, EngineError> {
    let passphrase =
        tokio::task::spawn_blocking(move || prompter.passphrase("Encryption passphrase: "))
            .await?
            .map_err(|e| EngineError::KeyResolution(format!("failed to read passphrase: {e}")))?;
    if passphrase.is_empty() {
        return Err(EngineError::KeyResolution("empty passphrase".into()));
    }
    Ok(derive_key_from_passphrase(&passphrase, size))
}
