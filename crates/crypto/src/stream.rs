//! Streaming adapters applying the codec to an `AsyncRead`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};

use crate::IV_LEN;
use crate::cipher::{Cipher, Keystream};
use crate::codec::generate_iv;
use crate::error::CryptoError;
use crate::key::EncryptionKey;

/// Encrypts an inner plaintext reader, yielding `[IV][ciphertext]`.
pub struct EncryptingReader<R> {
    inner: R,
    keystream: Keystream,
    iv: [u8; IV_LEN],
    iv_sent: usize,
}

impl<R: AsyncRead + Unpin> EncryptingReader<R> {
    /// Wraps `inner`, validating the key and drawing a fresh IV.
    pub fn new(inner: R, key: &EncryptionKey, cipher: Cipher) -> Result<Self, CryptoError> {
        let iv = generate_iv();
        let keystream = Keystream::new(cipher, key, &iv)?;
        Ok(Self {
            inner,
            keystream,
            iv,
            iv_sent: 0,
        })
    }

    /// Number of bytes this adapter adds to the plaintext length.
    pub fn overhead(&self) -> u64 {
        IV_LEN as u64
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for EncryptingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.iv_sent < IV_LEN {
            let n = (IV_LEN - this.iv_sent).min(buf.remaining());
            buf.put_slice(&this.iv[this.iv_sent..this.iv_sent + n]);
            this.iv_sent += n;
            return Poll::Ready(Ok(()));
        }

        let start = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.keystream.apply(&mut buf.filled_mut()[start..]);
        Poll::Ready(Ok(()))
    }
}

/// Decrypts an inner `[IV][ciphertext]` reader into plaintext.
///
/// The IV is read lazily from the stream prefix on the first poll. A stream
/// that ends before a full IV was read fails with `UnexpectedEof`.
pub struct DecryptingReader<R> {
    inner: R,
    cipher: Cipher,
    key: EncryptionKey,
    iv: [u8; IV_LEN],
    iv_read: usize,
    keystream: Option<Keystream>,
}

impl<R: AsyncRead + Unpin> DecryptingReader<R> {
    /// Wraps `inner`, validating the key before any byte is read.
    pub fn new(inner: R, key: EncryptionKey, cipher: Cipher) -> Result<Self, CryptoError> {
        cipher.check_key(&key)?;
        Ok(Self {
            inner,
            cipher,
            key,
            iv: [0u8; IV_LEN],
            iv_read: 0,
            keystream: None,
        })
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DecryptingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        while this.keystream.is_none() {
            let mut iv_buf = ReadBuf::new(&mut this.iv[this.iv_read..]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut iv_buf))?;
            let n = iv_buf.filled().len();
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    CryptoError::Truncated(this.iv_read),
                )));
            }
            this.iv_read += n;
            if this.iv_read == IV_LEN {
                let keystream = Keystream::new(this.cipher, &this.key, &this.iv)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                this.keystream = Some(keystream);
            }
        }

        let start = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        if let Some(keystream) = this.keystream.as_mut() {
            keystream.apply(&mut buf.filled_mut()[start..]);
        }
        Poll::Ready(Ok(()))
    }
}
