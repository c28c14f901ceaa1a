//! In-memory remote store and scripted prompter for tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use vaultdrop_protocol::{FileHeader, FileId, FileLocator, UploadReceipt, UploadRequest};
use vaultdrop_transfer::checksum_bytes;
use zeroize::Zeroizing;

use crate::prompt::Prompter;
use crate::remote::{RemoteError, RemoteFile, RemoteFuture, RemoteStore, UploadBody};

/// Routes engine logs to the test harness, filtered by `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub(crate) struct StoredFile {
    pub header: FileHeader,
    pub data: Vec<u8>,
    pub request: Option<UploadRequest>,
}

/// Remote store keeping files in a map.
#[derive(Default)]
pub(crate) struct MemoryStore {
    files: Mutex<HashMap<u64, StoredFile>>,
    next_id: AtomicU64,
    active: AtomicUsize,
    max_active: AtomicUsize,
    sends: AtomicUsize,
    requests: AtomicUsize,
    /// Delay while holding an upload open, to observe overlap.
    send_delay: Option<Duration>,
    /// Receipts report a bogus checksum.
    pub corrupt_receipts: AtomicBool,
    /// Download bodies stop producing bytes after this many.
    stall_after: Option<usize>,
    /// Names whose upload is rejected by the remote.
    reject_names: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn with_stall_after(mut self, bytes: usize) -> Self {
        self.stall_after = Some(bytes);
        self
    }

    pub fn rejecting(mut self, name: &str) -> Self {
        self.reject_names.push(name.to_string());
        self
    }

    /// Stores a file directly, as if uploaded earlier.
    pub fn put(
        &self,
        name: &str,
        data: Vec<u8>,
        encryption: Option<&str>,
        checksum: Option<String>,
    ) -> FileId {
        let id = FileId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let header = FileHeader {
            file_id: id,
            name: name.to_string(),
            namespace: None,
            size: Some(data.len() as u64),
            checksum,
            encryption: encryption.map(str::to_string),
        };
        self.files.lock().unwrap().insert(
            id.0,
            StoredFile {
                header,
                data,
                request: None,
            },
        );
        id
    }

    pub fn get(&self, id: FileId) -> Option<StoredFile> {
        self.files.lock().unwrap().get(&id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RemoteStore for MemoryStore {
    fn send_file(
        &self,
        request: UploadRequest,
        body: UploadBody,
    ) -> RemoteFuture<'_, UploadReceipt> {
        Box::pin(async move {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.reject_names.contains(&request.name) {
                return Err(RemoteError::Declared {
                    status: 413,
                    message: format!("{} rejected", request.name),
                });
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);

            let received = async {
                if let Some(delay) = self.send_delay {
                    tokio::time::sleep(delay).await;
                }
                match body {
                    UploadBody::Stream {
                        mut reader,
                        checksum,
                        ..
                    } => {
                        let mut data = Vec::new();
                        reader
                            .read_to_end(&mut data)
                            .await
                            .map_err(|e| RemoteError::Network(e.to_string()))?;
                        Ok::<_, RemoteError>((data, Some(checksum.current().to_string())))
                    }
                    UploadBody::Url(url) => Ok((format!("fetched from {url}").into_bytes(), None)),
                }
            }
            .await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let (data, plaintext) = received?;

            let wire = checksum_bytes(&data).to_string();
            let id = self.put(
                &request.name,
                data,
                request.encryption.as_deref(),
                plaintext.or_else(|| Some(wire.clone())),
            );
            if let Some(stored) = self.files.lock().unwrap().get_mut(&id.0) {
                stored.request = Some(request.clone());
            }

            let checksum = if self.corrupt_receipts.load(Ordering::SeqCst) {
                "0".repeat(64)
            } else {
                wire
            };
            Ok(UploadReceipt {
                file_id: id,
                file_name: request.name,
                checksum,
                public_name: request.public_name.clone().or_else(|| {
                    request
                        .public
                        .then(|| format!("pub-{id}"))
                }),
            })
        })
    }

    fn request_file(&self, locator: &FileLocator) -> RemoteFuture<'_, RemoteFile> {
        let locator = locator.clone();
        self.requests.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let files = self.files.lock().unwrap();
            let found = match &locator {
                FileLocator::Id(id) => files.get(&id.0),
                FileLocator::Name { name, .. } => files.values().find(|f| &f.header.name == name),
                FileLocator::PublicName(_) => None,
            };
            let Some(file) = found else {
                return Err(RemoteError::Declared {
                    status: 404,
                    message: format!("{locator} not found"),
                });
            };

            let header = file.header.clone();
            let body: crate::remote::BoxReader = match self.stall_after {
                Some(n) => {
                    let prefix = file.data[..n.min(file.data.len())].to_vec();
                    Box::pin(io::Cursor::new(prefix).chain(Stall))
                }
                None => Box::pin(io::Cursor::new(file.data.clone())),
            };
            Ok(RemoteFile { header, body })
        })
    }

    fn public_url(&self, public_name: &str) -> Option<String> {
        Some(format!("https://files.test/p/{public_name}"))
    }
}

/// Reader that never produces data.
struct Stall;

impl AsyncRead for Stall {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

/// Prompter answering from fixed scripts.
pub(crate) struct ScriptedPrompter {
    passphrases: Mutex<VecDeque<String>>,
    confirms: Mutex<VecDeque<bool>>,
    pub asked: AtomicUsize,
}

impl ScriptedPrompter {
    pub fn new(passphrases: &[&str], confirms: &[bool]) -> Self {
        Self {
            passphrases: Mutex::new(passphrases.iter().map(|s| s.to_string()).collect()),
            confirms: Mutex::new(confirms.iter().copied().collect()),
            asked: AtomicUsize::new(0),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn passphrase(&self, _prompt: &str) -> io::Result<Zeroizing<String>> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.passphrases
            .lock()
            .unwrap()
            .pop_front()
            .map(Zeroizing::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted passphrase"))
    }

    fn confirm(&self, _prompt: &str, _default: bool) -> io::Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.confirms
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer"))
    }
}
