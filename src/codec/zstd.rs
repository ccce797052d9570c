//! Zstandard decoder.

use std::io::{self, BufReader, Read};

use super::{CoderInput, CoderReader, expect_single};
use crate::{Error, Result};

/// Zstandard decoder over one input stream.
pub struct ZstdReader {
    inner: zstd::stream::read::Decoder<'static, BufReader<CoderInput>>,
}

impl Read for ZstdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for ZstdReader {}

/// Builds a Zstandard decoder; the frame format is self-describing.
pub(crate) fn new_reader(
    _properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "zstd")?;
    let inner = zstd::stream::read::Decoder::new(input).map_err(Error::Io)?;
    Ok(Box::new(ZstdReader { inner }))
}
