//! The folder engine: coder-graph wiring and the folder pipeline.
//!
//! A folder describes a DAG of coders. Inputs are ports: some are fed
//! from packed streams in the archive body, the rest from other coders'
//! outputs via bind pairs. Coders appear in the header in an order where
//! each bound input's producer precedes its consumer, so one forward pass
//! wires the whole graph. The single output no bind pair consumes is the
//! folder's decoded byte stream, wrapped in [`FolderReader`].

use std::io::{self, BufReader, Read, Seek, SeekFrom};

use crate::codec::{CoderInput, decompressor};
use crate::crypto::Password;
use crate::error::SeekError;
use crate::format::streams::StreamsInfo;
use crate::{Error, READ_BUFFER_SIZE, Result};

use super::source::Body;

/// A folder-construction failure plus the encryption hint accumulated
/// before the failure, for [`Error::Read`] wrapping at the call site.
pub(crate) struct FolderError {
    pub encrypted: bool,
    pub source: Error,
}

/// The decoded output of one folder.
///
/// Tracks a running CRC-32 and byte count over everything read, knows the
/// folder's declared size, and supports forward-only seeking by reading
/// and discarding (the CRC keeps accumulating through discarded bytes).
pub struct FolderReader {
    inner: Box<dyn Read + Send>,
    hasher: crc32fast::Hasher,
    position: u64,
    size: u64,
    has_encryption: bool,
}

impl std::fmt::Debug for FolderReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderReader").finish_non_exhaustive()
    }
}

impl FolderReader {
    fn new(inner: Box<dyn Read + Send>, size: u64, has_encryption: bool) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            position: 0,
            size,
            has_encryption,
        }
    }

    /// The folder's declared uncompressed size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The current position in the uncompressed stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC-32 of every byte read so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Whether a decryption stage participates in this pipeline.
    pub fn has_encryption(&self) -> bool {
        self.has_encryption
    }

    /// Seeks forward by reading and discarding.
    ///
    /// # Errors
    ///
    /// [`Error::Seek`] when the target is negative, before the current
    /// position, or past the declared size.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
        };

        if target < 0 {
            return Err(Error::Seek(SeekError::Negative));
        }
        let target = target as u64;
        if target < self.position {
            return Err(Error::Seek(SeekError::Backwards));
        }
        if target > self.size {
            return Err(Error::Seek(SeekError::PastEof));
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        while self.position < target {
            let want = ((target - self.position).min(buf.len() as u64)) as usize;
            let n = self.read(&mut buf[..want]).map_err(Error::Io)?;
            if n == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "folder ended before seek target",
                )));
            }
        }

        Ok(self.position)
    }
}

impl Read for FolderReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

/// Builds the decode pipeline for one folder.
///
/// Returns the pipeline, the folder's recorded output CRC (if any), and
/// whether encryption participates. On failure the encryption hint
/// gathered so far rides along in [`FolderError`] so callers can wrap
/// the error with it.
pub(crate) fn folder_reader<R: Read + Seek + Send + 'static>(
    si: &StreamsInfo,
    body: &Body<R>,
    folder_index: usize,
    password: &Password,
) -> std::result::Result<(FolderReader, Option<u32>), FolderError> {
    let mut encrypted = false;
    build(si, body, folder_index, password, &mut encrypted).map_err(|source| FolderError {
        encrypted,
        source,
    })
}

fn build<R: Read + Seek + Send + 'static>(
    si: &StreamsInfo,
    body: &Body<R>,
    folder_index: usize,
    password: &Password,
    encrypted: &mut bool,
) -> Result<(FolderReader, Option<u32>)> {
    let unpack = si.unpack_info.as_ref().ok_or(Error::MissingUnpackInfo)?;
    let pack = si.pack_info.as_ref().ok_or(Error::MissingUnpackInfo)?;

    let folder = unpack
        .folders
        .get(folder_index)
        .ok_or_else(|| Error::InvalidFormat(format!("no folder {folder_index}")))?;

    let total_in = folder.total_in_streams() as usize;
    let total_out = folder.total_out_streams() as usize;

    let mut in_slots: Vec<Option<CoderInput>> = (0..total_in).map(|_| None).collect();
    let mut out_slots: Vec<Option<CoderInput>> = (0..total_out).map(|_| None).collect();

    // Wire the packed streams: consecutive slices of the archive body,
    // starting at this folder's offset, each landing on its input port.
    let packed_base = si.folder_packed_base(folder_index);
    let folder_offset = si.folder_offset(folder_index);

    let mut offset = 0u64;
    for (i, &input_index) in folder.packed_streams.iter().enumerate() {
        let size = pack
            .pack_sizes
            .get(packed_base + i)
            .copied()
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "folder {folder_index} references packed stream {} of {}",
                    packed_base + i,
                    pack.pack_sizes.len()
                ))
            })?;

        let slot = in_slots
            .get_mut(input_index as usize)
            .ok_or(Error::UnboundInput { index: input_index })?;
        *slot = Some(Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            body.section(folder_offset + offset, size),
        )));
        offset += size;
    }

    // One pass over the coders: every input is either a packed stream or
    // a previously produced output reached through a bind pair.
    let mut input = 0usize;
    let mut output = 0usize;

    for coder in &folder.coders {
        if coder.num_out_streams != 1 {
            return Err(Error::MultipleOutputStreams);
        }

        let in_count = coder.num_in_streams as usize;
        for j in input..input + in_count {
            if in_slots[j].is_some() {
                continue;
            }

            let bound = folder
                .find_bind_pair_for_input(j as u64)
                .and_then(|bp| out_slots.get_mut(bp.out_index as usize))
                .and_then(Option::take);

            match bound {
                Some(reader) => in_slots[j] = Some(reader),
                None => return Err(Error::UnboundInput { index: j as u64 }),
            }
        }

        let inputs: Vec<CoderInput> = in_slots[input..input + in_count]
            .iter_mut()
            .map(|slot| slot.take().expect("wired above"))
            .collect();

        let dcomp = decompressor(&coder.method_id).ok_or(Error::UnsupportedMethod {
            method_id: coder.method_id_u64(),
        })?;

        let size = folder.unpack_sizes.get(output).copied().ok_or_else(|| {
            Error::InvalidFormat(format!("no unpack size for output {output}"))
        })?;

        let properties = coder.properties.as_deref().unwrap_or(&[]);
        let mut reader = dcomp(properties, size, inputs)?;

        if reader.set_password(password)? {
            *encrypted = true;
        }

        // Cap the stage at its declared output size.
        out_slots[output] = Some(Box::new(reader.take(size)));

        input += in_count;
        output += coder.num_out_streams as usize;
    }

    // Exactly one output must be left unconsumed by bind pairs.
    let mut unbound = Vec::with_capacity(1);
    for i in 0..total_out {
        if folder.find_bind_pair_for_output(i as u64).is_none() {
            unbound.push(i);
        }
    }

    if unbound.len() != 1 {
        return Err(Error::NoUnboundStream);
    }
    let final_output = out_slots[unbound[0]].take().ok_or(Error::NoUnboundStream)?;

    Ok((
        FolderReader::new(final_output, folder.unpack_size(), *encrypted),
        folder.unpack_crc,
    ))
}
