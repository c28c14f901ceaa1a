//! Download pipeline.
//!
//! The decryption key is resolved before the destination is touched, so
//! an encrypted payload without a key never creates or truncates a file.
//! Bytes land in a hidden part file next to the destination and are
//! renamed into place only after the checksum policy passed; a cancelled or
//! rejected transfer shreds the part file and leaves any existing
//! destination as it was. An existing destination without `force` is
//! refused before any key lookup or prompt, and before the request itself
//! when the destination is an exact path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vaultdrop_crypto::{Cipher, DecryptingReader, IV_LEN};
use vaultdrop_keystore::shred_file;
use vaultdrop_protocol::{FileHeader, FileLocator};
use vaultdrop_transfer::{
    Checksum, ChecksumHandle, CountingWriter, HashingReader, TransferProgress, validate_file_name,
    verify,
};

use crate::config::EngineContext;
use crate::error::EngineError;
use crate::keys::resolve_download_key;
use crate::remote::{BoxReader, RemoteFile};
use crate::types::{Destination, DownloadOptions, DownloadReport, Verification};

const PART_SUFFIX: &str = "vaultdrop-part";

/// Downloads files from the remote store.
pub struct DownloadPipeline {
    ctx: EngineContext,
}

/// Remote file with its key resolved and reader ready.
struct Prepared {
    header: FileHeader,
    reader: BoxReader,
    /// Digest the written bytes must match, when one applies.
    expected: Option<String>,
    decrypted: bool,
}

impl DownloadPipeline {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel_token()
    }

    /// Downloads `locator` to the destination in `options`.
    pub async fn download(
        &self,
        locator: &FileLocator,
        options: &DownloadOptions,
    ) -> Result<DownloadReport, EngineError> {
        if options.destination == Destination::Stdout {
            return self.view(locator, options, tokio::io::stdout()).await;
        }

        if let Destination::Path(path) = &options.destination {
            refuse_existing(path, options).await?;
        }
        let remote = self.request(locator).await?;
        let path = destination_path(&options.destination, &remote.header.name)?;
        refuse_existing(&path, options).await?;
        let prepared = self.prepare(remote, options).await?;

        let part = part_path(&path)?;
        if tokio::fs::try_exists(&part).await? {
            debug!(part = %part.display(), "removing stale part file");
            self.discard(&part).await;
        }

        let progress = self.track(&prepared.header, prepared.decrypted);
        let Prepared {
            header,
            reader,
            expected,
            decrypted,
        } = prepared;

        let result = async {
            let file = tokio::fs::File::create(&part).await?;
            let (bytes, checksum, mut file) = self.pump(reader, file, &progress).await?;
            file.sync_all().await?;
            drop(file);
            let verified = self.check(&header, expected.as_deref(), &checksum, options)?;
            tokio::fs::rename(&part, &path).await?;
            Ok::<_, EngineError>((bytes, checksum, verified))
        }
        .await;
        self.finish(&progress, result.as_ref().map(|_| ()));
        let (bytes, checksum, verified) = match result {
            Ok(v) => v,
            Err(e) => {
                self.discard(&part).await;
                return Err(e);
            }
        };

        info!(
            file_id = %header.file_id,
            path = %path.display(),
            bytes,
            "download complete"
        );
        Ok(DownloadReport {
            file_id: header.file_id,
            name: header.name,
            path: Some(path),
            bytes,
            checksum: checksum.to_string(),
            verified,
            decrypted,
        })
    }

    /// Streams `locator` into `writer`, as for a preview.
    ///
    /// Bytes reach the writer as they arrive, so a strict checksum failure
    /// is reported after the content was already written.
    pub async fn view<W>(
        &self,
        locator: &FileLocator,
        options: &DownloadOptions,
        writer: W,
    ) -> Result<DownloadReport, EngineError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let remote = self.request(locator).await?;
        let prepared = self.prepare(remote, options).await?;
        let progress = self.track(&prepared.header, prepared.decrypted);
        let Prepared {
            header,
            reader,
            expected,
            decrypted,
        } = prepared;

        let result = async {
            let (bytes, checksum, _) = self.pump(reader, writer, &progress).await?;
            let verified = self.check(&header, expected.as_deref(), &checksum, options)?;
            Ok::<_, EngineError>((bytes, checksum, verified))
        }
        .await;
        self.finish(&progress, result.as_ref().map(|_| ()));
        let (bytes, checksum, verified) = result?;

        Ok(DownloadReport {
            file_id: header.file_id,
            name: header.name,
            path: None,
            bytes,
            checksum: checksum.to_string(),
            verified,
            decrypted,
        })
    }

    async fn request(&self, locator: &FileLocator) -> Result<RemoteFile, EngineError> {
        self.ctx.check_cancelled()?;
        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Err(EngineError::Cancelled),
            file = self.ctx.remote.request_file(locator) => Ok(file?),
        }
    }

    /// Sets up decryption for a requested file. Nothing is written here.
    async fn prepare(
        &self,
        remote: RemoteFile,
        options: &DownloadOptions,
    ) -> Result<Prepared, EngineError> {
        let RemoteFile { header, body } = remote;

        // A blank cipher id counts as plaintext, same as no id at all.
        if !header.is_encrypted() {
            return Ok(Prepared {
                expected: header.checksum.clone(),
                header,
                reader: body,
                decrypted: false,
            });
        }
        let cipher_id = header
            .encryption
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();

        if options.no_decrypt {
            debug!(file_id = %header.file_id, cipher = %cipher_id, "keeping payload encrypted");
            return Ok(Prepared {
                header,
                reader: body,
                expected: None,
                decrypted: false,
            });
        }

        let cipher = Cipher::for_decryption(&cipher_id)?;
        let key = resolve_download_key(&self.ctx, header.file_id, options)
            .await?
            .ok_or_else(|| {
                EngineError::KeyResolution(format!(
                    "{} is encrypted with {cipher_id} and no key was found",
                    header.name
                ))
            })?;
        debug!(file_id = %header.file_id, fingerprint = %key.fingerprint(), "decrypting");
        let reader: BoxReader = Box::pin(DecryptingReader::new(body, key, cipher)?);

        Ok(Prepared {
            expected: header.checksum.clone(),
            header,
            reader,
            decrypted: true,
        })
    }

    /// Copies `reader` into `writer`, hashing and counting what is written.
    async fn pump<W>(
        &self,
        reader: BoxReader,
        writer: W,
        progress: &Arc<TransferProgress>,
    ) -> Result<(u64, Checksum, W), EngineError>
    where
        W: AsyncWrite + Unpin,
    {
        let handle = ChecksumHandle::new();
        let mut reader = HashingReader::new(reader, handle.clone());
        let mut writer = CountingWriter::new(writer, Arc::clone(progress));

        progress.start();
        let bytes = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
            copied = tokio::io::copy(&mut reader, &mut writer) => copied?,
        };
        writer.flush().await?;
        Ok((bytes, handle.current(), writer.into_inner()))
    }

    /// Applies the checksum policy.
    fn check(
        &self,
        header: &FileHeader,
        expected: Option<&str>,
        local: &Checksum,
        options: &DownloadOptions,
    ) -> Result<Verification, EngineError> {
        let Some(remote) = expected else {
            return Ok(Verification::Skipped);
        };
        if verify(local, remote) {
            return Ok(Verification::Matched);
        }
        if options.strict_verify {
            return Err(EngineError::ChecksumMismatch {
                local: local.to_string(),
                remote: remote.to_string(),
            });
        }
        warn!(
            file_id = %header.file_id,
            local = %local,
            remote = %remote,
            "checksum mismatch"
        );
        Ok(Verification::Mismatch {
            local: local.to_string(),
            remote: remote.to_string(),
        })
    }

    fn track(&self, header: &FileHeader, decrypted: bool) -> Arc<TransferProgress> {
        let total = match (header.size, decrypted) {
            (Some(size), true) => Some(size.saturating_sub(IV_LEN as u64)),
            (size, _) => size,
        };
        let progress = Arc::new(TransferProgress::new(
            format!("download-{}", header.file_id),
            header.name.clone(),
            total,
        ));
        self.ctx.progress.track(Arc::clone(&progress));
        progress
    }

    fn finish(&self, progress: &Arc<TransferProgress>, result: Result<(), &EngineError>) {
        match result {
            Ok(()) => progress.complete(),
            Err(e) if e.is_cancelled() => progress.cancel(),
            Err(e) => progress.fail(&e.to_string()),
        }
        self.ctx.progress.notify(progress.id());
        self.ctx.progress.untrack(progress.id());
    }

    /// Shreds a part file. Failures are logged and never replace the error
    /// that caused the discard.
    async fn discard(&self, part: &Path) {
        let shred = self.ctx.shred;
        let target = part.to_path_buf();
        match tokio::task::spawn_blocking(move || shred_file(&target, &shred)).await {
            Ok(Ok(())) => debug!(part = %part.display(), "discarded partial download"),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Ok(Err(e)) => {
                warn!(part = %part.display(), error = %e, "failed to shred partial download")
            }
            Err(e) => warn!(error = %e, "shred task failed"),
        }
    }
}

fn destination_path(destination: &Destination, remote_name: &str) -> Result<PathBuf, EngineError> {
    match destination {
        Destination::Path(path) => Ok(path.clone()),
        Destination::Directory(dir) => Ok(dir.join(validate_file_name(remote_name)?)),
        Destination::Stdout => Err(EngineError::Configuration(
            "standard output has no path".into(),
        )),
    }
}

/// Hidden sibling `.<name>.vaultdrop-part` of the destination.
async fn refuse_existing(path: &Path, options: &DownloadOptions) -> Result<(), EngineError> {
    if !options.force && tokio::fs::try_exists(path).await? {
        return Err(EngineError::DestinationExists(path.to_path_buf()));
    }
    Ok(())
}

fn part_path(path: &Path) -> Result<PathBuf, EngineError> {
    let name = path.file_name().ok_or_else(|| {
        EngineError::Configuration(format!("not a file path: {}", path.display()))
    })?;
    let mut part = std::ffi::OsString::from(".");
    part.push(name);
    part.push(".");
    part.push(PART_SUFFIX);
    Ok(path.with_file_name(part))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vaultdrop_crypto::{EncryptionKey, KeySize, encrypt, generate_key};
    use vaultdrop_keystore::Keystore;
    use vaultdrop_protocol::FileId;
    use vaultdrop_transfer::checksum_bytes;

    use super::*;
    use crate::error::ErrorKind;
    use crate::keys::DownloadKey;
    use crate::testing::{MemoryStore, ScriptedPrompter, init_tracing};

    fn content() -> Vec<u8> {
        (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn pipeline(store: MemoryStore) -> (Arc<MemoryStore>, DownloadPipeline) {
        let store = Arc::new(store);
        let ctx = EngineContext::new(Arc::clone(&store) as Arc<dyn crate::RemoteStore>)
            .with_prompter(Arc::new(ScriptedPrompter::new(&[], &[])));
        (store, DownloadPipeline::new(ctx))
    }

    /// Stores `data` encrypted under `key`, with the plaintext checksum.
    fn put_encrypted(store: &MemoryStore, name: &str, data: &[u8], key: &EncryptionKey) -> FileId {
        let ciphertext = encrypt(data, key, Cipher::Aes).unwrap();
        store.put(
            name,
            ciphertext,
            Some("aes"),
            Some(checksum_bytes(data).to_string()),
        )
    }

    fn options_for(path: &Path) -> DownloadOptions {
        DownloadOptions::new(Destination::Path(path.to_path_buf()))
    }

    fn dir_is_only(dir: &Path, names: &[&str]) -> bool {
        let mut found: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        found.sort();
        found == names
    }

    #[tokio::test]
    async fn plaintext_download_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let data = content();
        let id = store.put("report.bin", data.clone(), None, Some(checksum_bytes(&data).to_string()));

        let report = pipeline
            .download(
                &FileLocator::Id(id),
                &DownloadOptions::new(Destination::Directory(dir.path().to_path_buf())),
            )
            .await
            .unwrap();

        let path = dir.path().join("report.bin");
        assert_eq!(report.path.as_deref(), Some(path.as_path()));
        assert_eq!(report.bytes, data.len() as u64);
        assert_eq!(report.verified, Verification::Matched);
        assert!(!report.decrypted);
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert!(dir_is_only(dir.path(), &["report.bin"]));
    }

    #[tokio::test]
    async fn encrypted_download_uses_keystore_key() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Arc::new(Keystore::create(dir.path().join("keys")).unwrap());
        let store = Arc::new(MemoryStore::new());
        let key = generate_key(KeySize::Bytes32);
        let data = content();
        let id = put_encrypted(&store, "secret.bin", &data, &key);
        keystore.add_key_bytes(id, &key).unwrap();

        let ctx = EngineContext::new(Arc::clone(&store) as Arc<dyn crate::RemoteStore>)
            .with_keystore(keystore);
        let dest = dir.path().join("out.bin");
        let report = DownloadPipeline::new(ctx)
            .download(&FileLocator::Id(id), &options_for(&dest))
            .await
            .unwrap();

        assert!(report.decrypted);
        assert_eq!(report.verified, Verification::Matched);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn wrong_key_under_strict_verification_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let id = put_encrypted(&store, "a.bin", &content(), &generate_key(KeySize::Bytes16));

        let dest = dir.path().join("a.bin");
        let mut options = options_for(&dest);
        options.key = Some(DownloadKey::Explicit(generate_key(KeySize::Bytes16)));
        options.strict_verify = true;

        let err = pipeline.download(&FileLocator::Id(id), &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert!(!dest.exists());
        assert!(dir_is_only(dir.path(), &[]));
    }

    #[tokio::test]
    async fn wrong_key_by_default_keeps_file_with_warning() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let data = content();
        let id = put_encrypted(&store, "a.bin", &data, &generate_key(KeySize::Bytes16));

        let dest = dir.path().join("a.bin");
        let mut options = options_for(&dest);
        options.key = Some(DownloadKey::Explicit(generate_key(KeySize::Bytes16)));

        let report = pipeline.download(&FileLocator::Id(id), &options).await.unwrap();
        assert!(report.verified.is_mismatch());
        assert!(dest.exists());
        assert_ne!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn missing_key_aborts_before_touching_destination() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let id = put_encrypted(&store, "a.bin", &content(), &generate_key(KeySize::Bytes32));

        let fresh = dir.path().join("fresh.bin");
        let err = pipeline
            .download(&FileLocator::Id(id), &options_for(&fresh))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyResolution);
        assert!(!fresh.exists());

        let existing = dir.path().join("existing.bin");
        std::fs::write(&existing, b"keep me").unwrap();
        let mut options = options_for(&existing);
        options.force = true;
        let err = pipeline.download(&FileLocator::Id(id), &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyResolution);
        assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");
        assert!(dir_is_only(dir.path(), &["existing.bin"]));
    }

    #[tokio::test]
    async fn unsupported_cipher_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let id = store.put("a.bin", vec![1, 2, 3], Some("rsa"), None);

        let dest = dir.path().join("a.bin");
        let mut options = options_for(&dest);
        options.key = Some(DownloadKey::Explicit(generate_key(KeySize::Bytes32)));
        let err = pipeline.download(&FileLocator::Id(id), &options).await.unwrap_err();
        assert!(matches!(err, EngineError::DecryptionUnsupported(ref id) if id == "rsa"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn existing_destination_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let data = content();
        let id = store.put("a.bin", data.clone(), None, None);

        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, b"old").unwrap();
        let err = pipeline
            .download(&FileLocator::Id(id), &options_for(&dest))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DestinationExists(_)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert_eq!(store.request_count(), 0);

        let mut options = options_for(&dest);
        options.force = true;
        let report = pipeline.download(&FileLocator::Id(id), &options).await.unwrap();
        assert_eq!(report.verified, Verification::Skipped);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn existing_file_in_directory_is_refused_before_prompting() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let id = put_encrypted(&store, "a.bin", &content(), &generate_key(KeySize::Bytes32));
        std::fs::write(dir.path().join("a.bin"), b"old").unwrap();

        let prompter = Arc::new(ScriptedPrompter::new(&["unused"], &[]));
        let ctx = EngineContext::new(Arc::clone(&store) as Arc<dyn crate::RemoteStore>)
            .with_prompter(Arc::clone(&prompter) as Arc<dyn crate::Prompter>);
        let mut options = DownloadOptions::new(Destination::Directory(dir.path().to_path_buf()));
        options.allow_prompt = true;

        let err = DownloadPipeline::new(ctx)
            .download(&FileLocator::Id(id), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DestinationExists(_)));
        assert_eq!(prompter.asked.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn blank_encryption_header_is_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let data = content();
        let id = store.put("a.bin", data.clone(), Some(""), Some(checksum_bytes(&data).to_string()));

        let dest = dir.path().join("a.bin");
        let report = pipeline.download(&FileLocator::Id(id), &options_for(&dest)).await.unwrap();
        assert!(!report.decrypted);
        assert_eq!(report.verified, Verification::Matched);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn strict_config_makes_wrong_key_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let id = put_encrypted(&store, "a.bin", &content(), &generate_key(KeySize::Bytes16));
        let config = crate::ClientConfig {
            strict_verify: true,
            ..Default::default()
        };

        let dest = dir.path().join("a.bin");
        let mut options =
            DownloadOptions::from_config(Destination::Path(dest.clone()), &config).unwrap();
        options.key = Some(DownloadKey::Explicit(generate_key(KeySize::Bytes16)));

        let err = pipeline.download(&FileLocator::Id(id), &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert!(dir_is_only(dir.path(), &[]));
    }

    #[tokio::test]
    async fn shared_cancel_token_stops_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let id = store.put("a.bin", content(), None, None);

        let token = CancellationToken::new();
        let ctx = EngineContext::new(Arc::clone(&store) as Arc<dyn crate::RemoteStore>)
            .with_cancel(token.clone());
        token.cancel();

        let dest = dir.path().join("a.bin");
        let err = DownloadPipeline::new(ctx)
            .download(&FileLocator::Id(id), &options_for(&dest))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.request_count(), 0);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn cancelled_download_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new().with_stall_after(4096));
        let id = store.put("a.bin", content(), None, None);

        let cancel = pipeline.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let dest = dir.path().join("a.bin");
        let err = pipeline
            .download(&FileLocator::Id(id), &options_for(&dest))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.exists());
        assert!(dir_is_only(dir.path(), &[]));
    }

    #[tokio::test]
    async fn cancelled_forced_download_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new().with_stall_after(4096));
        let id = store.put("a.bin", content(), None, None);

        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, b"previous version").unwrap();

        let cancel = pipeline.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let mut options = options_for(&dest);
        options.force = true;
        let err = pipeline.download(&FileLocator::Id(id), &options).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous version");
        assert!(dir_is_only(dir.path(), &["a.bin"]));
    }

    #[tokio::test]
    async fn no_decrypt_writes_ciphertext() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let id = put_encrypted(&store, "a.bin", &content(), &generate_key(KeySize::Bytes32));
        let ciphertext = store.get(id).unwrap().data;

        let dest = dir.path().join("a.bin.enc");
        let mut options = options_for(&dest);
        options.no_decrypt = true;
        let report = pipeline.download(&FileLocator::Id(id), &options).await.unwrap();

        assert_eq!(report.verified, Verification::Skipped);
        assert!(!report.decrypted);
        assert_eq!(std::fs::read(&dest).unwrap(), ciphertext);
    }

    #[tokio::test]
    async fn passphrase_prompt_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let data = content();
        let key = vaultdrop_crypto::derive_key_from_passphrase("open sesame", KeySize::Bytes32);
        let id = put_encrypted(&store, "a.bin", &data, &key);

        let prompter = Arc::new(ScriptedPrompter::new(&["open sesame"], &[]));
        let ctx = EngineContext::new(Arc::clone(&store) as Arc<dyn crate::RemoteStore>)
            .with_prompter(prompter);
        let dest = dir.path().join("a.bin");
        let mut options = options_for(&dest);
        options.allow_prompt = true;

        let report = DownloadPipeline::new(ctx)
            .download(&FileLocator::Id(id), &options)
            .await
            .unwrap();
        assert_eq!(report.verified, Verification::Matched);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn view_streams_into_writer() {
        let (store, pipeline) = pipeline(MemoryStore::new());
        let data = content();
        let id = store.put("a.bin", data.clone(), None, Some(checksum_bytes(&data).to_string()));

        let mut out = Vec::new();
        let report = pipeline
            .view(&FileLocator::Id(id), &DownloadOptions::new(Destination::Stdout), &mut out)
            .await
            .unwrap();
        assert_eq!(out, data);
        assert!(report.path.is_none());
        assert_eq!(report.verified, Verification::Matched);
    }

    #[tokio::test]
    async fn remote_name_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = pipeline(MemoryStore::new());
        let id = store.put("../escape.bin", vec![1], None, None);

        let err = pipeline
            .download(
                &FileLocator::Id(id),
                &DownloadOptions::new(Destination::Directory(dir.path().to_path_buf())),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn missing_remote_file_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, pipeline) = pipeline(MemoryStore::new());
        let err = pipeline
            .download(&FileLocator::Id(FileId(99)), &options_for(&dir.path().join("x")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn part_file_is_hidden_sibling() {
        assert_eq!(
            part_path(Path::new("/tmp/out/a.bin")).unwrap(),
            PathBuf::from("/tmp/out/.a.bin.vaultdrop-part")
        );
        assert!(part_path(Path::new("/")).is_err());
    }
}
