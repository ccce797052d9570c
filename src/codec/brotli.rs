//! Brotli decoder with the 7-zip framing header.
//!
//! The 7-Zip Brotli compressor prepends a 16-byte frame (a skippable-frame
//! magic, the compressed size, a 'BR' marker, and the uncompressed size in
//! 64 KiB units) that a pure Brotli decoder chokes on. The frame is read
//! and either discarded or, when it does not look like the frame, stitched
//! back in front of the stream.

use std::io::{self, Chain, Cursor, Read};

use super::{CoderInput, CoderReader, expect_single};
use crate::Result;

const FRAME_MAGIC: u32 = 0x184D2A50;
const FRAME_SIZE: u32 = 8;
const BROTLI_MAGIC: u16 = 0x5242; // 'B', 'R'

const FRAME_LEN: usize = 16;

/// Brotli decoder over one input stream.
pub struct BrotliReader {
    inner: brotli::Decompressor<Chain<Cursor<Vec<u8>>, CoderInput>>,
}

impl Read for BrotliReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for BrotliReader {}

fn looks_like_frame(header: &[u8; FRAME_LEN]) -> bool {
    let frame_magic = u32::from_le_bytes(header[0..4].try_into().expect("fixed slice"));
    let frame_size = u32::from_le_bytes(header[4..8].try_into().expect("fixed slice"));
    let brotli_magic = u16::from_le_bytes(header[12..14].try_into().expect("fixed slice"));

    frame_magic == FRAME_MAGIC && frame_size == FRAME_SIZE && brotli_magic == BROTLI_MAGIC
}

/// Builds a Brotli decoder, sniffing and skipping the 7-zip frame.
pub(crate) fn new_reader(
    _properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let mut input = expect_single(inputs, "brotli")?;

    let mut header = [0u8; FRAME_LEN];
    let mut filled = 0;
    while filled < FRAME_LEN {
        let n = input.read(&mut header[filled..]).map_err(crate::Error::Io)?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    // Keep a copy to prepend again when the bytes are not the frame.
    let prefix = if filled == FRAME_LEN && looks_like_frame(&header) {
        Vec::new()
    } else {
        header[..filled].to_vec()
    };

    let chained = Cursor::new(prefix).chain(input);

    Ok(Box::new(BrotliReader {
        inner: brotli::Decompressor::new(chained, 4096),
    }))
}
