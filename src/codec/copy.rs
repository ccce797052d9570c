//! Copy method (no compression).

use std::io::{self, Read};

use super::CoderReader;

/// Passes bytes through unchanged, capped at the declared size.
pub struct CopyReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read + Send> CopyReader<R> {
    /// Creates a new copy reader yielding at most `size` bytes.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read + Send> Read for CopyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let max = (self.remaining.min(buf.len() as u64)) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl<R: Read + Send> CoderReader for CopyReader<R> {}
