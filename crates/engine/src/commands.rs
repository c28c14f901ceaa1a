//! Keystore management commands.
//!
//! These back the `keystore create/info/cleanup/add-key/delete` commands of
//! a front end. They are blocking; async callers wrap them in
//! `spawn_blocking`.

use std::path::Path;

use tracing::{info, warn};
use vaultdrop_crypto::read_key_file;
use vaultdrop_keystore::{Keystore, KeystoreInfo};
use vaultdrop_protocol::FileId;

use crate::config::{ClientConfig, KeystoreSettings};
use crate::error::EngineError;
use crate::prompt::Prompter;

/// Creates a keystore at `path` and registers it in `config`.
///
/// The caller persists `config` afterwards.
pub fn create_keystore(config: &mut ClientConfig, path: &Path) -> Result<Keystore, EngineError> {
    let keystore = Keystore::create(path)?;
    config.keystore = Some(KeystoreSettings {
        path: path.to_path_buf(),
        enabled: true,
    });
    info!(path = %path.display(), "keystore created");
    Ok(keystore)
}

pub fn keystore_info(config: &ClientConfig) -> Result<KeystoreInfo, EngineError> {
    Ok(open_configured(config)?.info()?)
}

/// Drops entries whose key file is gone. Returns how many were removed.
pub fn cleanup_keystore(config: &ClientConfig) -> Result<usize, EngineError> {
    let removed = open_configured(config)?.cleanup()?;
    info!(removed, "keystore cleanup finished");
    Ok(removed)
}

/// Registers an existing key file for `file_id`.
///
/// The file must hold a key of a supported length.
pub fn add_key_to_keystore(
    config: &ClientConfig,
    file_id: FileId,
    key_path: &Path,
) -> Result<(), EngineError> {
    let key = read_key_file(key_path)?;
    let keystore = open_configured(config)?;
    keystore.add_key(file_id, key_path)?;
    info!(%file_id, fingerprint = %key.fingerprint(), "key added to keystore");
    Ok(())
}

/// Shreds every file of the configured keystore, removes its directory and
/// unregisters it from `config`.
///
/// Asks for confirmation unless `assume_yes`. Returns `false`, with nothing
/// touched, when the answer is no.
pub fn delete_keystore(
    config: &mut ClientConfig,
    prompter: &dyn Prompter,
    assume_yes: bool,
) -> Result<bool, EngineError> {
    let Some(settings) = config.keystore.clone() else {
        return Err(no_keystore());
    };
    let path = settings.path;

    if !assume_yes {
        let question = format!(
            "Delete the keystore at {} and shred all keys in it? This cannot be undone",
            path.display()
        );
        if !prompter.confirm(&question, false)? {
            info!(path = %path.display(), "keystore deletion declined");
            return Ok(false);
        }
    }

    if path.exists() {
        if !Keystore::exists(&path) {
            warn!(path = %path.display(), "keystore index missing, shredding directory contents");
        }
        // The index is never read here so a damaged keystore can still be wiped.
        let shredded = Keystore::destroy_dir(&path, &config.shred_config())?;
        info!(path = %path.display(), shredded, "keystore destroyed");
    } else {
        warn!(path = %path.display(), "keystore directory already gone");
    }
    config.keystore = None;
    Ok(true)
}

fn open_configured(config: &ClientConfig) -> Result<Keystore, EngineError> {
    let path = config.active_keystore().ok_or_else(no_keystore)?;
    Ok(Keystore::open(path)?)
}

fn no_keystore() -> EngineError {
    EngineError::Configuration("no keystore configured".into())
}
