//! File metadata: the FilesInfo record stream and [`FileHeader`].

use std::io::Read;

use super::reader::{
    read_all_or_bits, read_bool_vector, read_bytes, read_packed_u64, read_u8, read_u32_le,
    read_u64_le, read_utf16le_string,
};
use super::{MAX_BLOB, MAX_ENTRIES, attributes, property_id};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Describes a single file within a 7z archive.
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    /// Archive path, with backslashes normalized to forward slashes.
    pub name: String,
    /// Creation time, when recorded.
    pub created: Option<Timestamp>,
    /// Last access time, when recorded.
    pub accessed: Option<Timestamp>,
    /// Last modification time, when recorded.
    pub modified: Option<Timestamp>,
    /// Raw Windows attribute word, when recorded. The high 16 bits carry
    /// Unix mode bits when [`attributes::UNIX_EXTENSION`] is set.
    pub attributes: Option<u32>,
    /// CRC-32 of the uncompressed content, when recorded.
    pub crc32: Option<u32>,
    /// Uncompressed size in bytes.
    pub uncompressed_size: u64,
    /// Identifier of the compressed stream (folder) holding this file.
    /// Files sharing a value are stored within the same solid stream.
    pub stream: usize,

    pub(crate) is_empty_stream: bool,
    pub(crate) is_empty_file: bool,
}

impl FileHeader {
    /// Returns `true` if this entry has no associated data stream
    /// (directories and zero-byte files).
    pub fn is_empty_stream(&self) -> bool {
        self.is_empty_stream
    }

    /// Returns `true` if this entry is a zero-byte file (as opposed to a
    /// directory).
    pub fn is_empty_file(&self) -> bool {
        self.is_empty_file
    }

    /// Returns `true` if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        if self
            .attributes
            .is_some_and(|a| a & attributes::DIRECTORY != 0)
        {
            return true;
        }
        self.is_empty_stream && !self.is_empty_file
    }

    /// Returns the Unix permission and type bits embedded in the
    /// attribute word, when present.
    pub fn unix_mode(&self) -> Option<u32> {
        self.attributes
            .filter(|a| a & attributes::UNIX_EXTENSION != 0)
            .map(|a| a >> 16)
    }

    /// Returns `true` if the DOS read-only bit is set.
    pub fn readonly(&self) -> bool {
        self.attributes
            .is_some_and(|a| a & attributes::READONLY != 0)
    }
}

/// The parsed FilesInfo section: one [`FileHeader`] per archive entry,
/// sizes and CRCs not yet assigned (those come from the stream metadata).
#[derive(Debug, Clone, Default)]
pub struct FilesInfo {
    /// All entries in archive order.
    pub files: Vec<FileHeader>,
}

impl FilesInfo {
    /// Parses FilesInfo. The reader is positioned after the tag byte.
    pub(crate) fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let num_files = read_packed_u64(r)?;
        if num_files > MAX_ENTRIES {
            return Err(Error::InvalidFormat(format!("{num_files} files")));
        }
        let num_files = num_files as usize;
        let mut files: Vec<FileHeader> = (0..num_files).map(|_| FileHeader::default()).collect();

        let mut empty_streams = vec![false; num_files];
        let mut empty_files: Vec<bool> = Vec::new();

        loop {
            let id = read_u8(r)?;
            if id == property_id::END {
                break;
            }

            let record_size = read_packed_u64(r)?;
            if record_size > MAX_BLOB {
                return Err(Error::InvalidFormat(format!(
                    "files info record of {record_size} bytes"
                )));
            }
            let record_size = record_size as usize;

            match id {
                property_id::EMPTY_STREAM => {
                    empty_streams = read_bool_vector(r, num_files)?;
                }

                property_id::EMPTY_FILE => {
                    let empties = empty_streams.iter().filter(|&&b| b).count();
                    empty_files = read_bool_vector(r, empties)?;
                }

                property_id::ANTI => {
                    // Anti-items only matter for incremental extraction;
                    // the vector is consumed to keep the stream aligned.
                    let empties = empty_streams.iter().filter(|&&b| b).count();
                    let _ = read_bool_vector(r, empties)?;
                }

                property_id::NAME => {
                    if record_size == 0 {
                        return Err(Error::InvalidFormat("empty names record".into()));
                    }
                    let external = read_u8(r)?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external file names",
                        });
                    }

                    let mut region = std::io::Cursor::new(read_bytes(r, record_size - 1)?);
                    for file in &mut files {
                        file.name = match read_utf16le_string(&mut region) {
                            Ok(name) => name.replace('\\', "/"),
                            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                                return Err(Error::InvalidFormat(format!(
                                    "fewer than {num_files} names in files info"
                                )));
                            }
                            Err(e) => return Err(e),
                        };
                    }
                    if region.position() < region.get_ref().len() as u64 {
                        return Err(Error::InvalidFormat(format!(
                            "more than {num_files} names in files info"
                        )));
                    }
                }

                property_id::CTIME => {
                    parse_times(r, &mut files, |f, t| f.created = Some(t))?;
                }

                property_id::ATIME => {
                    parse_times(r, &mut files, |f, t| f.accessed = Some(t))?;
                }

                property_id::MTIME => {
                    parse_times(r, &mut files, |f, t| f.modified = Some(t))?;
                }

                property_id::WIN_ATTRIBUTES => {
                    let defined = read_all_or_bits(r, files.len())?;
                    let external = read_u8(r)?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external attributes",
                        });
                    }
                    for (file, &has) in files.iter_mut().zip(defined.iter()) {
                        if has {
                            file.attributes = Some(read_u32_le(r)?);
                        }
                    }
                }

                property_id::START_POS => {
                    return Err(Error::UnsupportedFeature {
                        feature: "start position records",
                    });
                }

                // Comments, dummy padding, and anything this crate does
                // not know carry an explicit size for exactly this reason.
                _ => {
                    let _ = read_bytes(r, record_size)?;
                }
            }
        }

        // Fold the empty-stream and empty-file vectors into the headers.
        let mut empty_idx = 0usize;
        for (i, &is_empty) in empty_streams.iter().enumerate() {
            if is_empty {
                files[i].is_empty_stream = true;
                files[i].is_empty_file = empty_files.get(empty_idx).copied().unwrap_or(false);
                empty_idx += 1;
            }
        }

        Ok(Self { files })
    }
}

fn parse_times<R: Read, F>(r: &mut R, files: &mut [FileHeader], mut set: F) -> Result<()>
where
    F: FnMut(&mut FileHeader, Timestamp),
{
    let defined = read_all_or_bits(r, files.len())?;

    let external = read_u8(r)?;
    if external != 0 {
        return Err(Error::UnsupportedFeature {
            feature: "external timestamps",
        });
    }

    for (file, &has) in files.iter_mut().zip(defined.iter()) {
        if has {
            set(file, Timestamp::from_filetime(read_u64_le(r)?));
        }
    }

    Ok(())
}
