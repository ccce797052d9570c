//! Stream metadata: pack info, folders, coders, and substreams.
//!
//! A folder is a unit of solid compression: a small DAG of coders whose
//! single unbound output yields the concatenation of one or more member
//! files. These structures describe where each folder's packed input
//! bytes live in the archive body and how its coders are wired together.

use std::io::Read;

use super::reader::{read_all_or_bits, read_bytes, read_packed_u64, read_u8, read_u32_le};
use super::{MAX_BLOB, MAX_ENTRIES, property_id};
use crate::{Error, Result};

/// Upper bound on coders in one folder. Real archives use at most five
/// (BCJ2 plus its four feeders).
const MAX_CODERS_PER_FOLDER: u64 = 16;

/// One compression, encryption, or filter stage.
#[derive(Debug, Clone)]
pub struct Coder {
    /// Method id bytes (1-15 bytes).
    pub method_id: Vec<u8>,
    /// Number of input streams.
    pub num_in_streams: u64,
    /// Number of output streams.
    pub num_out_streams: u64,
    /// Method-specific property blob.
    pub properties: Option<Vec<u8>>,
}

impl Coder {
    /// Returns the method id packed little-endian into a u64, for error
    /// reporting and comparisons against known method constants.
    pub fn method_id_u64(&self) -> u64 {
        let mut result = 0u64;
        for (i, &byte) in self.method_id.iter().take(8).enumerate() {
            result |= (byte as u64) << (8 * i);
        }
        result
    }
}

/// A directed edge from one coder's output port to another coder's input
/// port inside the same folder.
#[derive(Debug, Clone, Copy)]
pub struct BindPair {
    /// Folder-global input stream index.
    pub in_index: u64,
    /// Folder-global output stream index.
    pub out_index: u64,
}

/// A folder: an ordered list of coders plus the wiring between them.
#[derive(Debug, Clone)]
pub struct Folder {
    /// Coders in header order.
    pub coders: Vec<Coder>,
    /// Edges connecting coder outputs to coder inputs.
    pub bind_pairs: Vec<BindPair>,
    /// Input stream indices fed from the archive body, in packed-stream
    /// order.
    pub packed_streams: Vec<u64>,
    /// Unpacked size of each output stream, indexed by folder-global
    /// output index.
    pub unpack_sizes: Vec<u64>,
    /// CRC of the folder's decoded output, when recorded.
    pub unpack_crc: Option<u32>,
}

impl Folder {
    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let num_coders = read_packed_u64(r)?;
        if num_coders == 0 || num_coders > MAX_CODERS_PER_FOLDER {
            return Err(Error::InvalidFormat(format!(
                "folder has {num_coders} coders"
            )));
        }

        let mut coders = Vec::with_capacity(num_coders as usize);
        let mut total_in = 0u64;
        let mut total_out = 0u64;

        for _ in 0..num_coders {
            let flags = read_u8(r)?;
            let id_size = (flags & 0x0F) as usize;
            let is_complex = flags & 0x10 != 0;
            let has_properties = flags & 0x20 != 0;

            let method_id = read_bytes(r, id_size)?;

            let (num_in_streams, num_out_streams) = if is_complex {
                (read_packed_u64(r)?, read_packed_u64(r)?)
            } else {
                (1, 1)
            };

            let properties = if has_properties {
                let len = read_packed_u64(r)?;
                if len > MAX_BLOB {
                    return Err(Error::InvalidFormat(format!(
                        "coder properties of {len} bytes"
                    )));
                }
                Some(read_bytes(r, len as usize)?)
            } else {
                None
            };

            total_in += num_in_streams;
            total_out += num_out_streams;

            coders.push(Coder {
                method_id,
                num_in_streams,
                num_out_streams,
                properties,
            });
        }

        let num_bind_pairs = total_out.saturating_sub(1);
        let mut bind_pairs = Vec::with_capacity(num_bind_pairs as usize);

        for i in 0..num_bind_pairs {
            let in_index = read_packed_u64(r)?;
            let out_index = read_packed_u64(r)?;

            if in_index >= total_in {
                return Err(Error::InvalidFormat(format!(
                    "bind pair {i}: input index {in_index} out of range ({total_in} inputs)"
                )));
            }
            if out_index >= total_out {
                return Err(Error::InvalidFormat(format!(
                    "bind pair {i}: output index {out_index} out of range ({total_out} outputs)"
                )));
            }

            bind_pairs.push(BindPair {
                in_index,
                out_index,
            });
        }

        // A single packed stream is implied: it is the one input no bind
        // pair feeds. Multiple packed streams are listed explicitly.
        let num_packed = total_in - num_bind_pairs;
        let mut packed_streams = Vec::with_capacity(num_packed as usize);

        if num_packed == 1 {
            let bound: Vec<bool> = (0..total_in)
                .map(|i| bind_pairs.iter().any(|bp| bp.in_index == i))
                .collect();
            match bound.iter().position(|&b| !b) {
                Some(i) => packed_streams.push(i as u64),
                None => {
                    return Err(Error::InvalidFormat(
                        "folder has no unbound input stream".into(),
                    ));
                }
            }
        } else {
            for _ in 0..num_packed {
                let index = read_packed_u64(r)?;
                if index >= total_in {
                    return Err(Error::InvalidFormat(format!(
                        "packed stream index {index} out of range ({total_in} inputs)"
                    )));
                }
                packed_streams.push(index);
            }
        }

        Ok(Self {
            coders,
            bind_pairs,
            packed_streams,
            unpack_sizes: Vec::new(),
            unpack_crc: None,
        })
    }

    /// Total number of input streams across all coders.
    pub fn total_in_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_in_streams).sum()
    }

    /// Total number of output streams across all coders.
    pub fn total_out_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Finds the bind pair feeding the given input stream, if any.
    pub fn find_bind_pair_for_input(&self, in_index: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.in_index == in_index)
    }

    /// Finds the bind pair consuming the given output stream, if any.
    pub fn find_bind_pair_for_output(&self, out_index: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.out_index == out_index)
    }

    /// The folder's uncompressed size: the size of the last output stream
    /// that is not bound as another coder's input.
    pub fn unpack_size(&self) -> u64 {
        for i in (0..self.unpack_sizes.len()).rev() {
            if self.find_bind_pair_for_output(i as u64).is_none() {
                return self.unpack_sizes[i];
            }
        }
        self.unpack_sizes.last().copied().unwrap_or(0)
    }
}

/// Location and sizes of the packed streams in the archive body.
#[derive(Debug, Clone, Default)]
pub struct PackInfo {
    /// Offset of the first packed stream, relative to the start of the
    /// archive body.
    pub pack_pos: u64,
    /// Size of each packed stream, in order.
    pub pack_sizes: Vec<u64>,
    /// CRC of each packed stream, when recorded.
    pub pack_crcs: Vec<Option<u32>>,
}

impl PackInfo {
    /// Parses PackInfo. The reader is positioned after the tag byte.
    pub(crate) fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let pack_pos = read_packed_u64(r)?;
        let num_streams = read_packed_u64(r)?;
        if num_streams > MAX_ENTRIES {
            return Err(Error::InvalidFormat(format!(
                "{num_streams} pack streams"
            )));
        }
        let num_streams = num_streams as usize;

        let mut pack_sizes = Vec::new();
        let mut pack_crcs = vec![None; num_streams];

        loop {
            let id = read_u8(r)?;
            match id {
                property_id::END => break,

                property_id::SIZE => {
                    pack_sizes.reserve(num_streams);
                    for _ in 0..num_streams {
                        pack_sizes.push(read_packed_u64(r)?);
                    }
                }

                property_id::CRC => {
                    let defined = read_all_or_bits(r, num_streams)?;
                    for (i, &has_crc) in defined.iter().enumerate() {
                        if has_crc {
                            pack_crcs[i] = Some(read_u32_le(r)?);
                        }
                    }
                }

                id => {
                    return Err(Error::UnexpectedId {
                        id,
                        context: "pack info",
                    });
                }
            }
        }

        if pack_sizes.len() != num_streams {
            return Err(Error::InvalidFormat(format!(
                "pack info declares {num_streams} streams but lists {} sizes",
                pack_sizes.len()
            )));
        }

        Ok(Self {
            pack_pos,
            pack_sizes,
            pack_crcs,
        })
    }
}

/// The folder definitions.
#[derive(Debug, Clone, Default)]
pub struct UnpackInfo {
    /// All folders, in archive order.
    pub folders: Vec<Folder>,
}

impl UnpackInfo {
    /// Parses UnpackInfo. The reader is positioned after the tag byte.
    pub(crate) fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let mut folders = Vec::new();

        loop {
            let id = read_u8(r)?;
            match id {
                property_id::END => break,

                property_id::FOLDER => {
                    let num_folders = read_packed_u64(r)?;
                    if num_folders > MAX_ENTRIES {
                        return Err(Error::InvalidFormat(format!("{num_folders} folders")));
                    }

                    let external = read_u8(r)?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external folder definitions",
                        });
                    }

                    folders.reserve(num_folders as usize);
                    for _ in 0..num_folders {
                        folders.push(Folder::parse(r)?);
                    }
                }

                property_id::CODERS_UNPACK_SIZE => {
                    for folder in &mut folders {
                        let n = folder.total_out_streams() as usize;
                        folder.unpack_sizes = Vec::with_capacity(n);
                        for _ in 0..n {
                            folder.unpack_sizes.push(read_packed_u64(r)?);
                        }
                    }
                }

                property_id::CRC => {
                    let defined = read_all_or_bits(r, folders.len())?;
                    for (folder, &has_crc) in folders.iter_mut().zip(defined.iter()) {
                        if has_crc {
                            folder.unpack_crc = Some(read_u32_le(r)?);
                        }
                    }
                }

                id => {
                    return Err(Error::UnexpectedId {
                        id,
                        context: "unpack info",
                    });
                }
            }
        }

        Ok(Self { folders })
    }
}

/// Per-file breakdown of each folder's decoded output.
///
/// In solid archives several files share one folder; this structure says
/// how many files each folder holds and how its output splits among them.
#[derive(Debug, Clone, Default)]
pub struct SubStreamsInfo {
    /// Number of files in each folder.
    pub num_unpack_streams: Vec<u64>,
    /// Uncompressed size of every non-empty file, in archive order.
    pub unpack_sizes: Vec<u64>,
    /// CRC of every non-empty file, in archive order, when recorded.
    pub digests: Vec<Option<u32>>,
}

impl SubStreamsInfo {
    /// Parses SubStreamsInfo. The reader is positioned after the tag byte.
    pub(crate) fn parse<R: Read>(r: &mut R, folders: &[Folder]) -> Result<Self> {
        let mut num_unpack_streams = vec![1u64; folders.len()];
        let mut unpack_sizes = Vec::new();
        let mut digests = Vec::new();

        loop {
            let id = read_u8(r)?;
            match id {
                property_id::END => break,

                property_id::NUM_UNPACK_STREAM => {
                    for streams in num_unpack_streams.iter_mut() {
                        *streams = read_packed_u64(r)?;
                    }
                    let total: u64 = num_unpack_streams.iter().sum();
                    if total > MAX_ENTRIES {
                        return Err(Error::InvalidFormat(format!("{total} substreams")));
                    }
                }

                property_id::SIZE => {
                    // The last file of each folder is implied: folder size
                    // minus the sum of the listed sizes.
                    for (folder_idx, &streams) in num_unpack_streams.iter().enumerate() {
                        if streams == 0 {
                            continue;
                        }

                        let mut remaining = folders[folder_idx].unpack_size();
                        for _ in 0..streams - 1 {
                            let size = read_packed_u64(r)?;
                            unpack_sizes.push(size);
                            remaining = remaining.checked_sub(size).ok_or_else(|| {
                                Error::InvalidFormat(format!(
                                    "substream sizes exceed folder {folder_idx} size"
                                ))
                            })?;
                        }
                        unpack_sizes.push(remaining);
                    }
                }

                property_id::CRC => {
                    // Single-file folders whose folder-level digest is
                    // recorded inherit it; only the rest carry digests here.
                    let mut needing = 0usize;
                    for (folder_idx, &streams) in num_unpack_streams.iter().enumerate() {
                        if folders[folder_idx].unpack_crc.is_none() || streams != 1 {
                            needing += streams as usize;
                        }
                    }

                    let defined = read_all_or_bits(r, needing)?;
                    let mut defined_iter = defined.iter();

                    for (folder_idx, &streams) in num_unpack_streams.iter().enumerate() {
                        let folder = &folders[folder_idx];

                        if folder.unpack_crc.is_some() && streams == 1 {
                            digests.push(folder.unpack_crc);
                        } else {
                            for _ in 0..streams {
                                match defined_iter.next() {
                                    Some(true) => digests.push(Some(read_u32_le(r)?)),
                                    _ => digests.push(None),
                                }
                            }
                        }
                    }
                }

                id => {
                    return Err(Error::UnexpectedId {
                        id,
                        context: "substreams info",
                    });
                }
            }
        }

        // No explicit sizes: every folder must then hold exactly one file
        // of the folder's own size.
        if unpack_sizes.is_empty() {
            for (folder_idx, &streams) in num_unpack_streams.iter().enumerate() {
                if streams == 1 {
                    unpack_sizes.push(folders[folder_idx].unpack_size());
                }
            }
        }

        if digests.is_empty() {
            for (folder_idx, &streams) in num_unpack_streams.iter().enumerate() {
                if streams == 1 {
                    digests.push(folders[folder_idx].unpack_crc);
                } else {
                    digests.extend(std::iter::repeat_n(None, streams as usize));
                }
            }
        }

        Ok(Self {
            num_unpack_streams,
            unpack_sizes,
            digests,
        })
    }

    /// Total number of files across all folders.
    pub fn total_streams(&self) -> u64 {
        self.num_unpack_streams.iter().sum()
    }
}

/// The combined stream metadata of one header.
#[derive(Debug, Clone, Default)]
pub struct StreamsInfo {
    /// Where the packed streams live.
    pub pack_info: Option<PackInfo>,
    /// The folder definitions.
    pub unpack_info: Option<UnpackInfo>,
    /// The per-file breakdown.
    pub substreams_info: Option<SubStreamsInfo>,
}

impl StreamsInfo {
    /// Number of folders.
    pub fn folders(&self) -> usize {
        self.unpack_info.as_ref().map_or(0, |u| u.folders.len())
    }

    /// Offset of a folder's first packed stream, relative to the start of
    /// the archive body.
    pub(crate) fn folder_offset(&self, folder: usize) -> u64 {
        let (Some(pack), Some(unpack)) = (&self.pack_info, &self.unpack_info) else {
            return 0;
        };

        let mut offset = pack.pack_pos;
        let mut stream = 0usize;
        for f in &unpack.folders[..folder] {
            for _ in 0..f.packed_streams.len() {
                offset += pack.pack_sizes.get(stream).copied().unwrap_or(0);
                stream += 1;
            }
        }
        offset
    }

    /// Index into [`PackInfo::pack_sizes`] of a folder's first packed
    /// stream.
    pub(crate) fn folder_packed_base(&self, folder: usize) -> usize {
        self.unpack_info.as_ref().map_or(0, |u| {
            u.folders[..folder]
                .iter()
                .map(|f| f.packed_streams.len())
                .sum()
        })
    }

    /// Maps a non-empty file index to its folder, uncompressed size, and
    /// recorded CRC.
    ///
    /// `file` counts non-empty files in archive order across all folders.
    pub(crate) fn file_folder_and_size(&self, file: usize) -> Result<(usize, u64, Option<u32>)> {
        let unpack = self.unpack_info.as_ref().ok_or(Error::MissingUnpackInfo)?;

        let mut folder = 0usize;
        let mut streams = 1u64;
        let mut crc = None;

        if let Some(sub) = &self.substreams_info {
            let mut total = 0u64;
            for (i, &n) in sub.num_unpack_streams.iter().enumerate() {
                folder = i;
                streams = n;
                total += n;
                if (file as u64) < total {
                    break;
                }
            }

            if !sub.digests.is_empty() {
                crc = sub.digests.get(file).copied().flatten();
            }
        }

        let folder_def = unpack
            .folders
            .get(folder)
            .ok_or(Error::MissingUnpackInfo)?;

        if streams == 1 {
            if crc.is_none() {
                crc = folder_def.unpack_crc;
            }
            return Ok((folder, folder_def.unpack_size(), crc));
        }

        let size = self
            .substreams_info
            .as_ref()
            .and_then(|sub| sub.unpack_sizes.get(file).copied())
            .ok_or_else(|| Error::InvalidFormat(format!("no substream size for file {file}")))?;

        Ok((folder, size, crc))
    }
}
