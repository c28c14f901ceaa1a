//! Client configuration and the explicit engine context.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use vaultdrop_crypto::{Cipher, KeySize};
use vaultdrop_keystore::{Keystore, ShredConfig};
use vaultdrop_transfer::{BarRenderer, ProgressTracker};

use crate::error::EngineError;
use crate::keys::KeySource;
use crate::prompt::{Prompter, TerminalPrompter};
use crate::remote::RemoteStore;

/// Location of the local keystore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreSettings {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Persisted client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub keystore: Option<KeystoreSettings>,
    /// Cipher identifier used when encryption is requested without one.
    pub default_cipher: String,
    /// Key length in bytes for generated and passphrase-derived keys.
    pub default_key_size: usize,
    /// Overwrite rounds for secure deletion.
    pub shred_rounds: u32,
    pub strict_verify: bool,
    pub progress_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keystore: None,
            default_cipher: Cipher::Aes.as_str().to_string(),
            default_key_size: KeySize::default().bytes(),
            shred_rounds: ShredConfig::default().rounds,
            strict_verify: false,
            progress_interval_ms: 250,
        }
    }
}

impl ClientConfig {
    /// Loads the configuration at `path`.
    ///
    /// A missing file yields defaults; an unparsable one is logged and also
    /// yields defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ClientConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse client config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn cipher(&self) -> Result<Cipher, EngineError> {
        Ok(self.default_cipher.parse::<Cipher>()?)
    }

    pub fn key_size(&self) -> Result<KeySize, EngineError> {
        Ok(KeySize::from_len(self.default_key_size)?)
    }

    /// Fresh random key per source, sized by `default_key_size`.
    pub fn random_key(&self) -> Result<KeySource, EngineError> {
        Ok(KeySource::Random {
            size: self.key_size()?,
        })
    }

    /// Passphrase-derived key, sized by `default_key_size`.
    pub fn passphrase_key(&self) -> Result<KeySource, EngineError> {
        Ok(KeySource::Passphrase {
            size: self.key_size()?,
        })
    }

    pub fn shred_config(&self) -> ShredConfig {
        ShredConfig {
            rounds: self.shred_rounds,
            remove: true,
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    /// Path of the enabled keystore, if any.
    pub fn active_keystore(&self) -> Option<&Path> {
        self.keystore
            .as_ref()
            .filter(|k| k.enabled)
            .map(|k| k.path.as_path())
    }
}

/// Collaborators shared by the pipelines of one invocation.
///
/// Nothing in the engine reads global state; everything it touches comes
/// through this struct.
#[derive(Clone)]
pub struct EngineContext {
    pub remote: Arc<dyn RemoteStore>,
    pub keystore: Option<Arc<Keystore>>,
    pub prompter: Arc<dyn Prompter>,
    pub progress: ProgressTracker,
    pub shred: ShredConfig,
    pub cancel: CancellationToken,
}

impl EngineContext {
    /// Context with a terminal prompter, no keystore and default settings.
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            keystore: None,
            prompter: Arc::new(TerminalPrompter::new()),
            progress: ProgressTracker::default(),
            shred: ShredConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Builds a context from the persisted configuration.
    ///
    /// A keystore that fails to open is logged and left out, so commands
    /// that never need it keep working.
    pub fn from_config(config: &ClientConfig, remote: Arc<dyn RemoteStore>) -> Self {
        let keystore = config
            .active_keystore()
            .and_then(|path| match Keystore::open(path) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "keystore unavailable");
                    None
                }
            });

        Self {
            keystore,
            progress: ProgressTracker::new(Some(config.progress_interval())),
            shred: config.shred_config(),
            ..Self::new(remote)
        }
    }

    pub fn with_keystore(mut self, keystore: Arc<Keystore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// Draws a terminal bar per transfer. Pass [`BarRenderer::hidden`] to
    /// keep the state without drawing.
    pub fn with_progress_bars(self, renderer: Arc<BarRenderer>) -> Self {
        self.progress.on_progress(renderer.into_callback());
        self
    }

    pub fn with_shred(mut self, shred: ShredConfig) -> Self {
        self.shred = shred;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels every pipeline using this context.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
