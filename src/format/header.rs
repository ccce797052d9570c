//! Signature location and start-header parsing.
//!
//! A 7z archive begins with a fixed 32-byte signature header: the 6-byte
//! magic, a format version, and a CRC-protected [`StartHeader`] locating
//! the metadata blob. Self-extracting archives prefix the magic with an
//! executable stub, so the magic is searched for within the first
//! mebibyte of the source.

use std::io::{Read, Seek, SeekFrom};

use super::SIGNATURE;
use super::reader::{read_u8, read_u32_le, read_u64_le};
use crate::{Error, Result};

/// Scan granularity for the signature search.
const CHUNK_SIZE: usize = 4096;

/// How far into the source the magic is searched for. This bounds the
/// tolerated self-extracting stub size; archives whose magic lies beyond
/// it fail to open.
pub const SEARCH_LIMIT: u64 = 1 << 20;

/// The fixed fields following the magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Archive format version, major number.
    pub major: u8,
    /// Archive format version, minor number.
    pub minor: u8,
    /// CRC of the 20-byte [`StartHeader`] that follows.
    pub crc: u32,
}

/// Locates the metadata blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartHeader {
    /// Offset of the metadata blob, relative to the end of the signature
    /// header.
    pub offset: u64,
    /// Size of the metadata blob in bytes.
    pub size: u64,
    /// CRC of the metadata blob.
    pub crc: u32,
}

/// Finds every occurrence of the 7z magic within [`SEARCH_LIMIT`].
///
/// The source is scanned in [`CHUNK_SIZE`] pieces with enough overlap that
/// a signature straddling a chunk boundary is still found. A hit at offset
/// zero short-circuits: that is a plain archive and no other candidate can
/// be better.
pub(crate) fn find_signature<R: Read + Seek>(r: &mut R) -> Result<Vec<u64>> {
    let mut chunk = vec![0u8; CHUNK_SIZE + SIGNATURE.len()];
    let mut offsets = Vec::with_capacity(2);

    let mut base = 0u64;
    while base < SEARCH_LIMIT {
        r.seek(SeekFrom::Start(base))?;
        let n = read_full(r, &mut chunk)?;

        let mut i = 0;
        while i + SIGNATURE.len() <= n {
            match chunk[i..n]
                .windows(SIGNATURE.len())
                .position(|w| w == *SIGNATURE)
            {
                Some(idx) => {
                    let absolute = base + (i + idx) as u64;
                    if absolute == 0 {
                        return Ok(vec![0]);
                    }
                    // Chunks overlap by the signature length, so a boundary
                    // hit can show up twice.
                    if offsets.last() != Some(&absolute) {
                        offsets.push(absolute);
                    }
                    i += idx + 1;
                }
                None => break,
            }
        }

        if n < chunk.len() {
            break; // EOF
        }
        base += CHUNK_SIZE as u64;
    }

    Ok(offsets)
}

/// Reads as many bytes as the source will give, stopping only at EOF.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// Parses the 32-byte signature header at the reader's current position.
///
/// The magic is assumed to be at the current position (callers locate it
/// first); the 20 [`StartHeader`] bytes are verified against the CRC in
/// the [`SignatureHeader`].
pub(crate) fn read_signature_header<R: Read>(r: &mut R) -> Result<(SignatureHeader, StartHeader)> {
    let mut magic = [0u8; 6];
    r.read_exact(&mut magic).map_err(Error::Io)?;
    if magic != *SIGNATURE {
        return Err(Error::InvalidFormat("bad signature".into()));
    }

    let major = read_u8(r)?;
    let minor = read_u8(r)?;
    let crc = read_u32_le(r)?;

    let mut start_bytes = [0u8; 20];
    r.read_exact(&mut start_bytes).map_err(Error::Io)?;

    let actual = crc32fast::hash(&start_bytes);
    if actual != crc {
        return Err(Error::ChecksumMismatch {
            scope: "start header",
            expected: crc,
            actual,
        });
    }

    let mut cursor = &start_bytes[..];
    let offset = read_u64_le(&mut cursor)?;
    let size = read_u64_le(&mut cursor)?;
    let start_crc = read_u32_le(&mut cursor)?;

    Ok((
        SignatureHeader { major, minor, crc },
        StartHeader {
            offset,
            size,
            crc: start_crc,
        },
    ))
}

/// Finds and validates the archive's signature header.
///
/// Returns the magic's offset together with the parsed headers. Candidate
/// offsets are tried in order and the first whose start-header CRC checks
/// out wins; this is what makes self-extracting archives (payload appended
/// to an executable stub) open transparently.
///
/// # Errors
///
/// [`Error::InvalidFormat`] when no magic exists in the searched region,
/// [`Error::ChecksumMismatch`] when candidates exist but none validates.
pub(crate) fn locate<R: Read + Seek>(r: &mut R) -> Result<(u64, SignatureHeader, StartHeader)> {
    let offsets = find_signature(r)?;

    if offsets.is_empty() {
        return Err(Error::InvalidFormat("no 7z signature found".into()));
    }

    let mut last_err = None;
    for offset in offsets {
        r.seek(SeekFrom::Start(offset))?;
        match read_signature_header(r) {
            Ok((sig, start)) => return Ok((offset, sig, start)),
            Err(e @ Error::ChecksumMismatch { .. }) => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_err.expect("at least one candidate was probed"))
}
