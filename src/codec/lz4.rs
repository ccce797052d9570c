//! LZ4 frame decoder.

use std::io::{self, Read};

use super::{CoderInput, CoderReader, expect_single};
use crate::Result;

/// LZ4 frame decoder over one input stream.
pub struct Lz4Reader {
    inner: lz4_flex::frame::FrameDecoder<CoderInput>,
}

impl Read for Lz4Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for Lz4Reader {}

/// Builds an LZ4 decoder; the frame format is self-describing.
pub(crate) fn new_reader(
    _properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "lz4")?;
    Ok(Box::new(Lz4Reader {
        inner: lz4_flex::frame::FrameDecoder::new(input),
    }))
}
