//! Bounded-concurrency upload pipeline.
//!
//! Sources are dispatched in order onto a pool of `concurrency` workers
//! gated by a semaphore. Each worker owns one source end to end:
//!
//! 1. resolve the encryption key and park generated keys on disk
//! 2. stream the source (hashing the plaintext, encrypting, hashing the wire bytes)
//! 3. compare the receipt checksum with the wire digest
//! 4. register the key in the keystore
//!
//! A failing source never stops the others. On cancellation or failure a
//! generated key that was never tied to a confirmed upload is shredded.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vaultdrop_crypto::{Cipher, EncryptingReader, EncryptionKey, IV_LEN, write_key_file};
use vaultdrop_keystore::shred_file;
use vaultdrop_protocol::{FileId, UploadReceipt, UploadRequest};
use vaultdrop_transfer::{ChecksumHandle, CountingReader, HashingReader, TransferProgress, verify};

use crate::config::EngineContext;
use crate::error::EngineError;
use crate::keys::{KeyOrigin, KeySource, resolve_upload_key};
use crate::remote::{BoxReader, UploadBody};
use crate::types::{SourceLocator, UploadEvent, UploadOptions, UploadOutcome, UploadReport, Verification};

/// Uploads sources to the remote store.
pub struct UploadPipeline {
    ctx: EngineContext,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
}

impl UploadPipeline {
    pub fn new(ctx: EngineContext) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            ctx,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel_token()
    }

    /// Uploads every source with at most `concurrency` transfers in flight.
    ///
    /// Invalid option combinations fail before anything is sent. Otherwise
    /// one outcome is returned per source, in source order, after every
    /// worker has finished its cleanup.
    pub async fn upload(
        &self,
        sources: Vec<SourceLocator>,
        concurrency: usize,
        options: UploadOptions,
    ) -> Result<Vec<UploadOutcome>, EngineError> {
        validate(&sources, &options, &self.ctx)?;

        let workers = worker_count(concurrency, sources.len());
        debug!(sources = sources.len(), workers, "starting upload");

        let semaphore = Arc::new(Semaphore::new(workers));
        let options = Arc::new(options);
        let cancel = self.ctx.cancel_token();
        self.ctx.progress.start();

        let mut handles = Vec::with_capacity(sources.len());
        let mut skipped = Vec::new();
        for (index, source) in sources.into_iter().enumerate() {
            let job_id = format!("upload-{}", index + 1);

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                skipped.push((index, source, job_id));
                continue;
            };

            debug!(job = %job_id, source = %source, "dispatching worker");
            let job = UploadJob {
                id: job_id.clone(),
                source: source.clone(),
                options: Arc::clone(&options),
                ctx: self.ctx.clone(),
                events_tx: self.events_tx.clone(),
            };
            let handle = tokio::spawn(async move {
                let result = job.run().await;
                drop(permit);
                result
            });
            handles.push((index, source, job_id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len() + skipped.len());
        for (index, source, job_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::from(e)),
            };
            outcomes.push((index, UploadOutcome { source, job_id, result }));
        }
        for (index, source, job_id) in skipped {
            outcomes.push((
                index,
                UploadOutcome {
                    source,
                    job_id,
                    result: Err(EngineError::Cancelled),
                },
            ));
        }

        self.ctx.progress.stop();
        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

/// Workers to run: at least one, never more than there are sources.
fn worker_count(concurrency: usize, sources: usize) -> usize {
    concurrency.max(1).min(sources.max(1))
}

/// Rejects option combinations before any transfer starts.
fn validate(
    sources: &[SourceLocator],
    options: &UploadOptions,
    ctx: &EngineContext,
) -> Result<(), EngineError> {
    let config = |msg: &str| -> Result<(), EngineError> {
        Err(EngineError::Configuration(msg.to_string()))
    };

    if sources.is_empty() {
        return config("no sources to upload");
    }
    let multiple = sources.len() > 1;
    if multiple && sources.contains(&SourceLocator::Stdin) {
        return config("standard input cannot be combined with other sources");
    }
    if multiple && options.set_clipboard {
        return config("clipboard can only be set for a single source");
    }
    if multiple && options.public_name.is_some() {
        return config("a public name can only be given to a single source");
    }
    if options.set_clipboard && !options.public && options.public_name.is_none() {
        return config("clipboard requires a public upload");
    }

    match (&options.cipher, &options.key_source) {
        (None, None) => {}
        (None, Some(_)) => return config("a key source was given without a cipher"),
        (Some(_), None) => return config("encryption requires a key source"),
        (Some(cipher), Some(source)) => {
            if !cipher.is_supported() {
                return Err(EngineError::Configuration(format!(
                    "cipher {cipher} is not supported for encryption"
                )));
            }
            if sources.iter().any(|s| matches!(s, SourceLocator::Url(_))) {
                return config("URL sources cannot be encrypted");
            }
            match source {
                KeySource::Explicit(key) => {
                    cipher.check_key(key)?;
                }
                KeySource::Random { .. }
                    if ctx.keystore.is_none() && options.key_output_dir.is_none() =>
                {
                    return config("generated keys need a keystore or a key output directory");
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Encryption state of one job.
struct JobKey {
    cipher: Cipher,
    key: EncryptionKey,
    origin: KeyOrigin,
    /// Generated key file not yet tied to a confirmed upload.
    ephemeral: Option<PathBuf>,
}

/// One source's transfer.
struct UploadJob {
    id: String,
    source: SourceLocator,
    options: Arc<UploadOptions>,
    ctx: EngineContext,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
}

impl UploadJob {
    async fn run(self) -> Result<UploadReport, EngineError> {
        let _ = self.events_tx.send(UploadEvent::Started {
            job_id: self.id.clone(),
            source: self.source.to_string(),
        });

        let progress = Arc::new(TransferProgress::new(
            self.id.clone(),
            self.source.file_name(),
            None,
        ));
        self.ctx.progress.track(Arc::clone(&progress));

        let mut ephemeral = None;
        let result = self.transfer(&progress, &mut ephemeral).await;

        if let Some(path) = ephemeral {
            self.discard_key(path).await;
        }

        match &result {
            Ok(report) => {
                progress.complete();
                info!(
                    job = %self.id,
                    source = %self.source,
                    file_id = %report.file_id,
                    checksum = %report.checksum,
                    "upload complete"
                );
                let _ = self.events_tx.send(UploadEvent::Completed {
                    job_id: self.id.clone(),
                    file_id: report.file_id,
                    checksum: report.checksum.clone(),
                });
            }
            Err(e) => {
                if e.is_cancelled() {
                    progress.cancel();
                } else {
                    progress.fail(&e.to_string());
                }
                error!(job = %self.id, source = %self.source, error = %e, "upload failed");
                let _ = self.events_tx.send(UploadEvent::Failed {
                    job_id: self.id.clone(),
                    error: e.to_string(),
                });
            }
        }
        self.ctx.progress.notify(&self.id);
        self.ctx.progress.untrack(&self.id);
        result
    }

    /// Runs the transfer. `ephemeral` is left set when a generated key file
    /// must be discarded by the caller.
    async fn transfer(
        &self,
        progress: &Arc<TransferProgress>,
        ephemeral: &mut Option<PathBuf>,
    ) -> Result<UploadReport, EngineError> {
        self.ctx.check_cancelled()?;

        let job_key = self.prepare_key().await?;
        if let Some(job_key) = &job_key {
            ephemeral.clone_from(&job_key.ephemeral);
        }

        let file_name = self.source.file_name();
        let plain = ChecksumHandle::new();
        let wire = ChecksumHandle::new();
        let body = self.open_body(progress, &job_key, &plain, &wire).await?;
        let is_url = matches!(body, UploadBody::Url(_));

        let request = UploadRequest {
            name: file_name.clone(),
            size: match &body {
                UploadBody::Stream { size, .. } => *size,
                UploadBody::Url(_) => None,
            },
            attributes: self.options.attributes.clone(),
            public: self.options.public || self.options.public_name.is_some(),
            public_name: self.options.public_name.clone(),
            encryption: job_key.as_ref().map(|k| k.cipher.as_str().to_string()),
            checksum: None,
        };

        progress.start();
        let cancel = &self.ctx.cancel;
        let receipt: UploadReceipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            receipt = self.ctx.remote.send_file(request, body) => receipt?,
        };

        let (checksum, verified) = if is_url {
            (receipt.checksum.clone(), Verification::Skipped)
        } else {
            let local = wire.current();
            let verified = if verify(&local, &receipt.checksum) {
                Verification::Matched
            } else if self.options.strict_verify {
                return Err(EngineError::ChecksumMismatch {
                    local: local.to_string(),
                    remote: receipt.checksum.clone(),
                });
            } else {
                warn!(
                    job = %self.id,
                    local = %local,
                    remote = %receipt.checksum,
                    "checksum mismatch"
                );
                Verification::Mismatch {
                    local: local.to_string(),
                    remote: receipt.checksum.clone(),
                }
            };
            (plain.current().to_string(), verified)
        };

        let key_path = match job_key {
            Some(job_key) => self.keep_key(receipt.file_id, job_key, ephemeral).await?,
            None => None,
        };

        let public_url = receipt
            .public_name
            .as_deref()
            .and_then(|name| self.ctx.remote.public_url(name));
        let clipboard = self
            .options
            .set_clipboard
            .then(|| public_url.clone().or_else(|| receipt.public_name.clone()))
            .flatten();

        Ok(UploadReport {
            file_id: receipt.file_id,
            file_name: receipt.file_name,
            checksum,
            verified,
            public_name: receipt.public_name,
            public_url,
            key_path,
            clipboard,
        })
    }

    /// Resolves the key and writes generated keys to disk before anything
    /// is sent, so the key exists whenever the remote has the ciphertext.
    async fn prepare_key(&self) -> Result<Option<JobKey>, EngineError> {
        let (Some(cipher), Some(source)) = (self.options.cipher, &self.options.key_source) else {
            return Ok(None);
        };
        let (key, origin) = resolve_upload_key(source, cipher, &self.ctx.prompter).await?;

        let ephemeral = if origin == KeyOrigin::Generated {
            let path = self.generated_key_path()?;
            let (write_path, write_key) = (path.clone(), key.clone());
            tokio::task::spawn_blocking(move || write_key_file(&write_path, &write_key)).await??;
            Some(path)
        } else {
            None
        };

        debug!(job = %self.id, fingerprint = %key.fingerprint(), cipher = %cipher, "resolved key");
        Ok(Some(JobKey {
            cipher,
            key,
            origin,
            ephemeral,
        }))
    }

    fn generated_key_path(&self) -> Result<PathBuf, EngineError> {
        if let Some(keystore) = &self.ctx.keystore {
            return Ok(keystore.new_key_path());
        }
        let dir = self.options.key_output_dir.as_ref().ok_or_else(|| {
            EngineError::Configuration("no keystore or key output directory".into())
        })?;
        Ok(dir.join(format!(".{}.key", uuid::Uuid::new_v4().simple())))
    }

    async fn open_body(
        &self,
        progress: &Arc<TransferProgress>,
        job_key: &Option<JobKey>,
        plain: &ChecksumHandle,
        wire: &ChecksumHandle,
    ) -> Result<UploadBody, EngineError> {
        let (reader, size): (BoxReader, Option<u64>) = match &self.source {
            SourceLocator::Url(url) => return Ok(UploadBody::Url(url.clone())),
            SourceLocator::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                (Box::pin(file), Some(len))
            }
            SourceLocator::Stdin => (Box::pin(tokio::io::stdin()), None),
        };
        progress.set_total(size);

        let counted = CountingReader::new(reader, Arc::clone(progress));
        let hashed = HashingReader::new(counted, plain.clone());
        let (encoded, size): (BoxReader, Option<u64>) = match job_key {
            Some(k) => (
                Box::pin(EncryptingReader::new(hashed, &k.key, k.cipher)?),
                size.map(|s| s + IV_LEN as u64),
            ),
            None => (Box::pin(hashed), size),
        };

        Ok(UploadBody::Stream {
            reader: Box::pin(HashingReader::new(encoded, wire.clone())),
            size,
            checksum: plain.clone(),
        })
    }

    /// Ties the key to the confirmed upload and returns the kept key file.
    ///
    /// Once the upload is confirmed a generated key is never discarded: a
    /// failed registration is logged and the file is kept where it is.
    async fn keep_key(
        &self,
        file_id: FileId,
        job_key: JobKey,
        ephemeral: &mut Option<PathBuf>,
    ) -> Result<Option<PathBuf>, EngineError> {
        if let Some(path) = ephemeral.take() {
            let kept = match &self.ctx.keystore {
                Some(keystore) => {
                    let (keystore, key_path) = (Arc::clone(keystore), path.clone());
                    match tokio::task::spawn_blocking(move || keystore.add_key(file_id, &key_path))
                        .await?
                    {
                        Ok(()) => path,
                        Err(e) => {
                            error!(%file_id, key = %path.display(), error = %e, "failed to register generated key");
                            path
                        }
                    }
                }
                None => name_key_after_file(path, file_id).await,
            };
            return Ok(Some(kept));
        }

        if !self.options.store_key {
            return Ok(match job_key.origin {
                KeyOrigin::KeyFile(path) => Some(path),
                _ => None,
            });
        }
        let Some(keystore) = self.ctx.keystore.clone() else {
            warn!(%file_id, "no keystore available, key not stored");
            return Ok(None);
        };

        let stored = match job_key.origin {
            KeyOrigin::KeyFile(path) => {
                let key_path = path.clone();
                tokio::task::spawn_blocking(move || keystore.add_key(file_id, &key_path)).await??;
                Some(path)
            }
            KeyOrigin::Explicit | KeyOrigin::Passphrase => {
                let key = job_key.key;
                Some(tokio::task::spawn_blocking(move || keystore.add_key_bytes(file_id, &key)).await??)
            }
            KeyOrigin::Generated => None,
        };
        Ok(stored)
    }

    async fn discard_key(&self, path: PathBuf) {
        let shred = self.ctx.shred;
        let target = path.clone();
        match tokio::task::spawn_blocking(move || shred_file(&target, &shred)).await {
            Ok(Ok(())) => debug!(job = %self.id, key = %path.display(), "discarded unused key"),
            Ok(Err(e)) => {
                warn!(job = %self.id, key = %path.display(), error = %e, "failed to shred unused key")
            }
            Err(e) => warn!(job = %self.id, error = %e, "key shred task failed"),
        }
    }
}

/// Renames a generated key in the output directory to `<file id>.key`,
/// keeping the temporary name if that file already exists.
async fn name_key_after_file(path: PathBuf, file_id: FileId) -> PathBuf {
    let Some(dir) = path.parent() else {
        return path;
    };
    let target = dir.join(format!("{file_id}.key"));
    if tokio::fs::try_exists(&target).await.unwrap_or(true) {
        return path;
    }
    match tokio::fs::rename(&path, &target).await {
        Ok(()) => target,
        Err(e) => {
            warn!(key = %path.display(), error = %e, "failed to rename key file");
            path
        }
    }
}
