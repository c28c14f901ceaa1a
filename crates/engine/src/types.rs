//! Pipeline inputs and results.

use std::fmt;
use std::path::PathBuf;

use vaultdrop_crypto::{Cipher, KeySize};
use vaultdrop_protocol::{FileAttributes, FileId};

use crate::config::ClientConfig;
use crate::error::EngineError;
use crate::keys::{DownloadKey, KeySource};

/// Where an upload reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Path(PathBuf),
    /// Process standard input; size unknown.
    Stdin,
    /// Remote URL passed through to the store unexpanded.
    Url(String),
}

impl SourceLocator {
    /// `-` is stdin, `http://` and `https://` are URLs, anything else a path.
    pub fn parse(input: &str) -> Self {
        if input == "-" {
            SourceLocator::Stdin
        } else if input.starts_with("http://") || input.starts_with("https://") {
            SourceLocator::Url(input.to_string())
        } else {
            SourceLocator::Path(PathBuf::from(input))
        }
    }

    /// Name sent to the remote for this source.
    pub fn file_name(&self) -> String {
        match self {
            SourceLocator::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            SourceLocator::Stdin => "stdin".to_string(),
            SourceLocator::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
                .filter(|s| !s.is_empty() && !s.contains(':'))
                .unwrap_or(url.as_str())
                .to_string(),
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Path(path) => write!(f, "{}", path.display()),
            SourceLocator::Stdin => f.write_str("-"),
            SourceLocator::Url(url) => f.write_str(url),
        }
    }
}

/// Options shared by every source of one upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub attributes: FileAttributes,
    pub public: bool,
    /// Explicit public name; implies `public`. Single source only.
    pub public_name: Option<String>,
    /// Report the public link for the clipboard. Single source only.
    pub set_clipboard: bool,
    pub cipher: Option<Cipher>,
    pub key_source: Option<KeySource>,
    /// Register supplied keys (explicit bytes or key files) in the keystore.
    /// Generated keys are always kept.
    pub store_key: bool,
    pub strict_verify: bool,
    /// Where generated keys go when no keystore is available.
    pub key_output_dir: Option<PathBuf>,
}

impl UploadOptions {
    /// Defaults with the verification policy taken from `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            strict_verify: config.strict_verify,
            ..Default::default()
        }
    }

    /// Enables encryption with the configured default cipher.
    pub fn encrypt_with(
        mut self,
        config: &ClientConfig,
        key_source: KeySource,
    ) -> Result<Self, EngineError> {
        self.cipher = Some(config.cipher()?);
        self.key_source = Some(key_source);
        Ok(self)
    }
}

/// Outcome of checksum verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Matched,
    /// Digests differ but verification was not strict.
    Mismatch { local: String, remote: String },
    /// Nothing to compare against, or verification was waived.
    Skipped,
}

impl Verification {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Verification::Mismatch { .. })
    }
}

/// A successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub file_id: FileId,
    pub file_name: String,
    /// Plaintext SHA-256; the remote's digest for URL sources.
    pub checksum: String,
    pub verified: Verification,
    pub public_name: Option<String>,
    pub public_url: Option<String>,
    /// Key file kept for this upload.
    pub key_path: Option<PathBuf>,
    /// Text to place on the clipboard, when requested.
    pub clipboard: Option<String>,
}

/// Result for one upload source.
#[derive(Debug)]
pub struct UploadOutcome {
    pub source: SourceLocator,
    pub job_id: String,
    pub result: Result<UploadReport, EngineError>,
}

/// Events emitted by the upload pipeline as workers start and finish.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started {
        job_id: String,
        source: String,
    },
    Completed {
        job_id: String,
        file_id: FileId,
        checksum: String,
    },
    Failed {
        job_id: String,
        error: String,
    },
}

/// Where a download is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Exact file path.
    Path(PathBuf),
    /// Directory joined with the remote file name.
    Directory(PathBuf),
    /// Process standard output.
    Stdout,
}

/// Download settings.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub destination: Destination,
    /// Replace an existing destination.
    pub force: bool,
    /// Write ciphertext as received and skip verification.
    pub no_decrypt: bool,
    pub key: Option<DownloadKey>,
    /// Look the key up in the keystore by file id.
    pub use_keystore: bool,
    /// Ask for a passphrase as a last resort.
    pub allow_prompt: bool,
    /// Size of passphrase-derived keys.
    pub key_size: KeySize,
    pub strict_verify: bool,
}

impl DownloadOptions {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            force: false,
            no_decrypt: false,
            key: None,
            use_keystore: true,
            allow_prompt: false,
            key_size: KeySize::default(),
            strict_verify: false,
        }
    }

    /// Options whose key size and verification policy come from `config`.
    pub fn from_config(destination: Destination, config: &ClientConfig) -> Result<Self, EngineError> {
        Ok(Self {
            key_size: config.key_size()?,
            strict_verify: config.strict_verify,
            ..Self::new(destination)
        })
    }
}

/// A successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub file_id: FileId,
    pub name: String,
    /// `None` when written to a caller-provided stream.
    pub path: Option<PathBuf>,
    pub bytes: u64,
    /// SHA-256 of the bytes written.
    pub checksum: String,
    pub verified: Verification,
    pub decrypted: bool,
}
