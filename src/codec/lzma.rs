//! LZMA and LZMA2 decoders.

use std::io::{self, Read};

use super::{CoderInput, CoderReader, expect_single};
use crate::{Error, Result};

/// LZMA decoder over one input stream.
pub struct LzmaReader {
    inner: lzma_rust2::LzmaReader<CoderInput>,
}

impl Read for LzmaReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for LzmaReader {}

/// Builds an LZMA decoder.
///
/// The property blob carries the lc/lp/pb byte followed by the
/// little-endian dictionary size; together with the declared unpack size
/// this is everything the raw LZMA stream omits.
pub(crate) fn new_lzma_reader(
    properties: &[u8],
    size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "lzma")?;

    if properties.len() < 5 {
        return Err(Error::InvalidProperties {
            codec: "lzma",
            reason: format!("need 5 property bytes, got {}", properties.len()),
        });
    }

    let props_byte = properties[0];
    let dict_size = u32::from_le_bytes(properties[1..5].try_into().expect("length checked"));

    let inner = lzma_rust2::LzmaReader::new_with_props(input, size, props_byte, dict_size, None)
        .map_err(|e| Error::InvalidProperties {
            codec: "lzma",
            reason: e.to_string(),
        })?;

    Ok(Box::new(LzmaReader { inner }))
}

/// LZMA2 decoder over one input stream.
pub struct Lzma2Reader {
    inner: lzma_rust2::Lzma2Reader<CoderInput>,
}

impl Read for Lzma2Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for Lzma2Reader {}

/// Decodes the LZMA2 dictionary-size property byte:
/// `dict = (2 | (p & 1)) << (p / 2 + 11)`, with 40 meaning 4 GiB - 1.
pub(crate) fn lzma2_dict_size(p: u8) -> Result<u32> {
    if p > 40 {
        return Err(Error::InvalidProperties {
            codec: "lzma2",
            reason: format!("dictionary property {p} out of range"),
        });
    }
    if p == 40 {
        return Ok(u32::MAX);
    }
    Ok((2 | (p as u32 & 1)) << (p / 2 + 11))
}

/// Builds an LZMA2 decoder. The single property byte encodes the
/// dictionary size and is validated before construction.
pub(crate) fn new_lzma2_reader(
    properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "lzma2")?;

    if properties.len() != 1 {
        return Err(Error::InvalidProperties {
            codec: "lzma2",
            reason: format!("need 1 property byte, got {}", properties.len()),
        });
    }

    let dict_size = lzma2_dict_size(properties[0])?;
    let inner = lzma_rust2::Lzma2Reader::new(input, dict_size, None);

    Ok(Box::new(Lzma2Reader { inner }))
}
