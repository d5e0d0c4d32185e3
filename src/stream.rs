//! Stream decorators: byte counting, cryptographic digesting, discarding.
//!
//! Decorators are transparent pass-throughs: they never alter the length,
//! ordering, or content of the bytes flowing through the wrapped stream;
//! they only observe. They are backend-agnostic and carry no network state,
//! so they compose over anything a backend's `open_read`/`open_write`
//! returns.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use digest::{Digest, DynDigest};

use crate::OmniError;

/// A write destination that accepts and discards all bytes.
///
/// Useful where a valid destination is required but no output is wanted,
/// e.g. measuring size or digest of data consumed only for verification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Write for NullSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cloneable handle onto a counting decorator's running byte count.
///
/// Readable at any time, including concurrently with ongoing I/O.
#[derive(Debug, Clone)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    /// Bytes observed so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Reader wrapper that counts the bytes delivered through it.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle for reading the count concurrently with I/O.
    pub fn counter(&self) -> ByteCounter {
        ByteCounter(self.count.clone())
    }

    /// Bytes delivered so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Unwrap, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Writer wrapper that counts the bytes delivered through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: Arc<AtomicU64>,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle for reading the count concurrently with I/O.
    pub fn counter(&self) -> ByteCounter {
        ByteCounter(self.count.clone())
    }

    /// Bytes written so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Unwrap, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Incremental hasher selected by algorithm name.
fn hasher_by_name(algorithm: &str) -> Result<Box<dyn DynDigest + Send>, OmniError> {
    match algorithm.to_ascii_lowercase().as_str() {
        "md5" => Ok(Box::new(md5::Md5::new())),
        "sha256" | "sha-256" => Ok(Box::new(sha2::Sha256::new())),
        "sha512" | "sha-512" => Ok(Box::new(sha2::Sha512::new())),
        other => Err(OmniError::config(format!(
            "unknown digest algorithm: {other}"
        ))),
    }
}

/// Reader wrapper that feeds every observed byte into a named hash algorithm.
///
/// The digest is finalized by [`close_and_digest`](DigestReader::close_and_digest),
/// exactly once; repeat calls return the cached value.
pub struct DigestReader<R> {
    inner: R,
    hasher: Box<dyn DynDigest + Send>,
    digest: Option<Vec<u8>>,
}

impl<R> std::fmt::Debug for DigestReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestReader")
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

impl<R: Read> DigestReader<R> {
    /// Wrap a reader with an incremental digest.
    ///
    /// Supported algorithm names: `md5`, `sha256`, `sha512`.
    ///
    /// # Errors
    ///
    /// [`OmniError::Config`] for an unknown algorithm name.
    pub fn new(algorithm: &str, inner: R) -> Result<Self, OmniError> {
        Ok(Self {
            inner,
            hasher: hasher_by_name(algorithm)?,
            digest: None,
        })
    }

    /// Finalize and return the digest of all bytes observed.
    ///
    /// The first call computes the digest; later calls return the cached
    /// value without touching the source again.
    pub fn close_and_digest(&mut self) -> Vec<u8> {
        if self.digest.is_none() {
            self.digest = Some(self.hasher.finalize_reset().into_vec());
        }
        self.digest.clone().unwrap_or_default()
    }

    /// The cached digest, if already finalized.
    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer wrapper that feeds every observed byte into a named hash algorithm.
///
/// [`close_and_digest`](DigestWriter::close_and_digest) flushes the wrapped
/// writer and finalizes exactly once; repeat calls return the cached value.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Box<dyn DynDigest + Send>,
    digest: Option<Vec<u8>>,
}

impl<W: Write> DigestWriter<W> {
    /// Wrap a writer with an incremental digest.
    ///
    /// Supported algorithm names: `md5`, `sha256`, `sha512`.
    ///
    /// # Errors
    ///
    /// [`OmniError::Config`] for an unknown algorithm name.
    pub fn new(algorithm: &str, inner: W) -> Result<Self, OmniError> {
        Ok(Self {
            inner,
            hasher: hasher_by_name(algorithm)?,
            digest: None,
        })
    }

    /// Flush the wrapped writer, finalize, and return the digest.
    ///
    /// The first call computes the digest; later calls return the cached
    /// value without flushing again.
    pub fn close_and_digest(&mut self) -> io::Result<Vec<u8>> {
        if self.digest.is_none() {
            self.inner.flush()?;
            self.digest = Some(self.hasher.finalize_reset().into_vec());
        }
        Ok(self.digest.clone().unwrap_or_default())
    }

    /// The cached digest, if already finalized.
    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    /// Unwrap, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
