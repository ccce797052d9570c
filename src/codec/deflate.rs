//! Deflate decoder.

use std::io::{self, BufReader, Read};

use super::{CoderInput, CoderReader, expect_single};
use crate::Result;

/// Raw deflate decoder over one input stream.
pub struct DeflateReader {
    inner: flate2::read::DeflateDecoder<BufReader<CoderInput>>,
}

impl Read for DeflateReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for DeflateReader {}

/// Builds a deflate decoder. 7z stores raw deflate with no zlib wrapper
/// and no properties.
pub(crate) fn new_reader(
    _properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "deflate")?;
    Ok(Box::new(DeflateReader {
        inner: flate2::read::DeflateDecoder::new(BufReader::new(input)),
    }))
}
