//! Shared access to the archive's byte source.
//!
//! Several folder pipelines may be live at once (the pool parks them
//! between file reads), and each owns section readers into the archive
//! body. The source itself is a single `Read + Seek` value, so it sits
//! behind a mutex and every section read locks, positions, and reads.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A cloneable handle to the underlying byte source.
pub(crate) struct SharedSource<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Clone for SharedSource<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> SharedSource<R> {
    pub(crate) fn new(source: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, R> {
        // The guarded value holds no invariant beyond its seek position,
        // which every access re-establishes.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: Read + Seek> SharedSource<R> {
    /// Reads at an absolute offset. Returns the number of bytes read,
    /// which is zero only at end of source.
    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.lock();
        guard.seek(SeekFrom::Start(offset))?;
        guard.read(buf)
    }

    /// Reads at an absolute offset until `buf` is full or the source
    /// ends; returns the bytes read.
    pub(crate) fn read_full_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_at(offset + filled as u64, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// The archive body: the packed-stream region between the signature
/// header and the metadata blob.
pub(crate) struct Body<R> {
    source: SharedSource<R>,
    start: u64,
    end: u64,
}

impl<R> Clone for Body<R> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

impl<R> Body<R> {
    pub(crate) fn new(source: SharedSource<R>, start: u64, end: u64) -> Self {
        Self { source, start, end }
    }

    /// Carves out a section reader over `[offset, offset + len)`,
    /// relative to the body start and clamped to the body end.
    pub(crate) fn section(&self, offset: u64, len: u64) -> SectionReader<R> {
        let abs_start = (self.start + offset).min(self.end);
        let abs_end = abs_start.saturating_add(len).min(self.end);
        SectionReader {
            source: self.source.clone(),
            position: abs_start,
            end: abs_end,
        }
    }
}

/// A positioned reader over one sub-range of the source.
pub(crate) struct SectionReader<R> {
    source: SharedSource<R>,
    position: u64,
    end: u64,
}

impl<R: Read + Seek> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.end {
            return Ok(0);
        }

        let max = ((self.end - self.position).min(buf.len() as u64)) as usize;
        let n = self.source.read_at(self.position, &mut buf[..max])?;
        self.position += n as u64;
        Ok(n)
    }
}
