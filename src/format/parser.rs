//! Header grammar: the tagged record tree.
//!
//! These parsers are pure functions over an in-memory byte stream; the
//! plumbing that locates, CRC-checks, and (for encoded headers) first
//! decompresses the metadata blob lives in the archive opener.

use std::io::Read;

use super::files::FilesInfo;
use super::property_id;
use super::reader::read_u8;
use super::streams::{PackInfo, StreamsInfo, SubStreamsInfo, UnpackInfo};
use crate::{Error, Result};

/// A fully parsed archive header.
#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Stream metadata, absent in file-less archives.
    pub streams_info: Option<StreamsInfo>,
    /// File metadata, absent in empty archives.
    pub files_info: Option<FilesInfo>,
}

/// Parses a header body. The reader is positioned after the Header tag.
pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut header = Header::default();

    loop {
        let id = read_u8(r)?;
        match id {
            property_id::END => break,

            property_id::ARCHIVE_PROPERTIES => {
                return Err(Error::UnsupportedFeature {
                    feature: "archive properties",
                });
            }

            property_id::ADDITIONAL_STREAMS_INFO => {
                return Err(Error::UnsupportedFeature {
                    feature: "additional streams info",
                });
            }

            property_id::MAIN_STREAMS_INFO => {
                header.streams_info = Some(read_streams_info(r)?);
            }

            property_id::FILES_INFO => {
                header.files_info = Some(FilesInfo::parse(r)?);
            }

            id => {
                return Err(Error::UnexpectedId {
                    id,
                    context: "header",
                });
            }
        }
    }

    Ok(header)
}

/// Parses a StreamsInfo body. The reader is positioned after the
/// MainStreamsInfo or EncodedHeader tag.
pub(crate) fn read_streams_info<R: Read>(r: &mut R) -> Result<StreamsInfo> {
    let mut si = StreamsInfo::default();

    loop {
        let id = read_u8(r)?;
        match id {
            property_id::END => break,

            property_id::PACK_INFO => {
                si.pack_info = Some(PackInfo::parse(r)?);
            }

            property_id::UNPACK_INFO => {
                si.unpack_info = Some(UnpackInfo::parse(r)?);
            }

            property_id::SUBSTREAMS_INFO => {
                let folders = si
                    .unpack_info
                    .as_ref()
                    .ok_or(Error::MissingUnpackInfo)?
                    .folders
                    .as_slice();
                si.substreams_info = Some(SubStreamsInfo::parse(r, folders)?);
            }

            id => {
                return Err(Error::UnexpectedId {
                    id,
                    context: "streams info",
                });
            }
        }
    }

    Ok(si)
}
