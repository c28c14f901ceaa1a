use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::TransferError;

/// SHA-256 digest as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Parses a hex digest, normalising case.
    pub fn from_hex(hex_digest: &str) -> Result<Self, TransferError> {
        let trimmed = hex_digest.trim();
        if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TransferError::InvalidChecksum(hex_digest.to_string()));
        }
        Ok(Checksum(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(hasher: Sha256) -> Self {
        Checksum(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data`.
pub fn checksum_bytes(data: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Checksum::from_digest(hasher)
}

/// Computes SHA-256 of an entire file.
pub fn checksum_file(path: &Path) -> Result<Checksum, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Checksum::from_digest(hasher))
}

/// Compares a local digest with the one reported by the remote side.
///
/// The remote value is compared case-insensitively; a malformed remote
/// value never matches.
pub fn verify(local: &Checksum, remote: &str) -> bool {
    match Checksum::from_hex(remote) {
        Ok(remote) => remote == *local,
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Streaming hashers
// ---------------------------------------------------------------------------

/// Shared running digest, fed by [`HashingReader`] or [`HashingWriter`].
///
/// Cloning the handle shares the same hasher, so the owner can read the
/// result after the stream itself was handed off and dropped.
#[derive(Clone, Default)]
pub struct ChecksumHandle {
    hasher: Arc<Mutex<Sha256>>,
}

impl ChecksumHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, data: &[u8]) {
        if !data.is_empty() {
            self.hasher.lock().unwrap().update(data);
        }
    }

    /// Returns the digest of everything hashed so far.
    pub fn current(&self) -> Checksum {
        let hasher = self.hasher.lock().unwrap().clone();
        Checksum::from_digest(hasher)
    }
}

/// Hashes every byte read through it.
pub struct HashingReader<R> {
    inner: R,
    handle: ChecksumHandle,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R, handle: ChecksumHandle) -> Self {
        Self { inner, handle }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.handle.update(&buf.filled()[start..]);
        Poll::Ready(Ok(()))
    }
}

/// Hashes every byte successfully written through it.
pub struct HashingWriter<W> {
    inner: W,
    handle: ChecksumHandle,
}

impl<W> HashingWriter<W> {
    pub fn new(inner: W, handle: ChecksumHandle) -> Self {
        Self { inner, handle }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.handle.update(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
