//! Bzip2 decoder.

use std::io::{self, Read};

use super::{CoderInput, CoderReader, expect_single};
use crate::Result;

/// Bzip2 decoder over one input stream.
pub struct Bzip2Reader {
    inner: bzip2::read::BzDecoder<CoderInput>,
}

impl Read for Bzip2Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for Bzip2Reader {}

/// Builds a bzip2 decoder. The stream is self-describing; there are no
/// properties.
pub(crate) fn new_reader(
    _properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "bzip2")?;
    Ok(Box::new(Bzip2Reader {
        inner: bzip2::read::BzDecoder::new(input),
    }))
}
