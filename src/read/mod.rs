//! Reading 7z archives: [`Archive`], [`File`], and [`FileReader`].
//!
//! Opening an archive parses all metadata up front; file contents are
//! decoded lazily, one folder pipeline at a time, with partially consumed
//! pipelines parked in per-folder pools so that reading a solid folder's
//! files in archive order costs a single decompression pass.

pub(crate) mod folder;
pub(crate) mod pool;
pub(crate) mod source;

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::crypto::Password;
use crate::format::files::FileHeader;
use crate::format::parser::{Header, read_header, read_streams_info};
use crate::format::streams::StreamsInfo;
use crate::format::{SIGNATURE_HEADER_SIZE, header, property_id};
use crate::fs::{self, FileListEntry, Node};
use crate::volume::{FileOpener, MultiVolume, OsOpener};
use crate::{Error, Result};

use folder::folder_reader;
use pool::FolderPool;
use source::{Body, SharedSource};

/// One archive member: its metadata plus its placement inside a folder.
pub(crate) struct FileRecord {
    pub(crate) header: FileHeader,
    pub(crate) folder: usize,
    pub(crate) offset: u64,
}

/// State shared between an [`Archive`], its open [`FileReader`]s, and the
/// folder pools.
pub(crate) struct ArchiveCore<R> {
    pub(crate) body: Body<R>,
    pub(crate) si: StreamsInfo,
    pub(crate) password: Password,
    pub(crate) records: Vec<FileRecord>,
    pools: Vec<Mutex<FolderPool>>,
    pub(crate) file_list: OnceLock<Vec<FileListEntry>>,
}

fn lock_pool(pool: &Mutex<FolderPool>) -> MutexGuard<'_, FolderPool> {
    // A panic while holding the pool lock leaves only droppable state.
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A reader over a 7z archive.
///
/// Multiple [`FileReader`]s from one archive may be open at the same
/// time; access to the underlying byte source is serialized internally.
pub struct Archive<R> {
    core: Arc<ArchiveCore<R>>,
    volumes: Vec<String>,
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive").finish_non_exhaustive()
    }
}

impl<R: Read + Seek + Send + 'static> Archive<R> {
    /// Opens an archive from a seekable source of the given size.
    pub fn new(source: R, size: u64) -> Result<Self> {
        Self::with_password(source, size, Password::empty())
    }

    /// Opens an archive, using `password` as the basis of the decryption
    /// key for encrypted content and encrypted headers.
    pub fn with_password(source: R, size: u64, password: impl Into<Password>) -> Result<Self> {
        Self::init(source, size, password.into(), Vec::new())
    }

    pub(crate) fn init(
        mut source: R,
        size: u64,
        password: Password,
        volumes: Vec<String>,
    ) -> Result<Self> {
        let (signature_offset, _sig, start) = header::locate(&mut source)?;

        let body_start = signature_offset + SIGNATURE_HEADER_SIZE;
        let body_end = body_start
            .checked_add(start.offset)
            .ok_or_else(|| Error::InvalidFormat("metadata offset overflows".into()))?;

        if body_end.checked_add(start.size).is_none_or(|end| end > size) {
            return Err(Error::InvalidFormat("archive is truncated".into()));
        }

        let shared = SharedSource::new(source);
        let body = Body::new(shared.clone(), body_start, body_end);

        // An absent metadata blob is a valid, empty archive.
        if start.size == 0 {
            return Ok(Self {
                core: Arc::new(ArchiveCore {
                    body,
                    si: StreamsInfo::default(),
                    password,
                    records: Vec::new(),
                    pools: Vec::new(),
                    file_list: OnceLock::new(),
                }),
                volumes,
            });
        }

        let mut blob = vec![0u8; start.size as usize];
        let n = shared.read_full_at(body_end, &mut blob)?;
        if (n as u64) < start.size {
            return Err(Error::InvalidFormat("metadata blob is truncated".into()));
        }

        let actual = crc32fast::hash(&blob);
        if actual != start.crc {
            return Err(Error::ChecksumMismatch {
                scope: "header",
                expected: start.crc,
                actual,
            });
        }

        let header = Self::parse_metadata(&blob, &body, &password)?;
        let si = header.streams_info.unwrap_or_default();

        // Assign each non-empty file its folder and the offset of its
        // bytes within that folder's decoded output.
        let mut records = Vec::new();
        let mut files_per_folder = vec![0usize; si.folders()];

        if let Some(files_info) = header.files_info {
            records.reserve(files_info.files.len());

            let mut current_folder = 0usize;
            let mut offset = 0u64;
            let mut stream_index = 0usize;

            for mut fh in files_info.files {
                let mut folder = 0usize;
                let mut file_offset = 0u64;

                if !fh.is_empty_stream && !fh.is_empty_file {
                    let (fld, size, crc) = si.file_folder_and_size(stream_index)?;
                    fh.uncompressed_size = size;
                    fh.crc32 = crc;
                    fh.stream = fld;

                    *files_per_folder
                        .get_mut(fld)
                        .ok_or_else(|| Error::InvalidFormat("folder index out of range".into()))? +=
                        1;

                    if fld != current_folder {
                        offset = 0;
                    }
                    folder = fld;
                    file_offset = offset;
                    offset += size;
                    current_folder = fld;
                    stream_index += 1;
                }

                records.push(FileRecord {
                    header: fh,
                    folder,
                    offset: file_offset,
                });
            }
        }

        let pools = files_per_folder
            .iter()
            .map(|&count| Mutex::new(FolderPool::for_file_count(count)))
            .collect();

        Ok(Self {
            core: Arc::new(ArchiveCore {
                body,
                si,
                password,
                records,
                pools,
                file_list: OnceLock::new(),
            }),
            volumes,
        })
    }

    /// Parses the metadata blob, transparently decoding an encoded header
    /// through its one-folder pipeline first.
    fn parse_metadata(blob: &[u8], body: &Body<R>, password: &Password) -> Result<Header> {
        let mut cursor = Cursor::new(&blob[1..]);

        match blob[0] {
            property_id::HEADER => {
                let header = read_header(&mut cursor)?;
                ensure_exhausted(&cursor)?;
                Ok(header)
            }

            property_id::ENCODED_HEADER => {
                let si = read_streams_info(&mut cursor)?;
                ensure_exhausted(&cursor)?;

                if si.folders() != 1 {
                    return Err(Error::InvalidFormat(
                        "expected only one folder in header stream".into(),
                    ));
                }

                let (mut fr, crc) = folder_reader(&si, body, 0, password)
                    .map_err(|fe| Error::read(fe.encrypted, fe.source))?;

                let mut decoded = Vec::new();
                fr.read_to_end(&mut decoded)
                    .map_err(|e| Error::read(fr.has_encryption(), Error::Io(e)))?;

                if let Some(expected) = crc {
                    let actual = fr.checksum();
                    if actual != expected {
                        return Err(Error::ChecksumMismatch {
                            scope: "encoded header",
                            expected,
                            actual,
                        });
                    }
                }

                if decoded.first() != Some(&property_id::HEADER) {
                    return Err(Error::read(
                        fr.has_encryption(),
                        Error::UnexpectedId {
                            id: decoded.first().copied().unwrap_or(0),
                            context: "encoded header",
                        },
                    ));
                }

                read_header(&mut Cursor::new(&decoded[1..]))
                    .map_err(|e| Error::read(fr.has_encryption(), e))
            }

            id => Err(Error::UnexpectedId {
                id,
                context: "metadata blob",
            }),
        }
    }

    /// The archive's members, in archive order.
    pub fn files(&self) -> impl ExactSizeIterator<Item = File<'_, R>> {
        (0..self.core.records.len()).map(move |index| File {
            core: &self.core,
            index,
        })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.core.records.len()
    }

    /// Returns `true` if the archive has no members.
    pub fn is_empty(&self) -> bool {
        self.core.records.is_empty()
    }

    /// Names of the volume parts this archive was opened from, in order.
    /// Empty unless the archive was opened through [`crate::open_path`].
    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    /// Opens an archive member by path, with filesystem-style semantics:
    /// slash-separated, no leading slash, no `.` or `..` components
    /// (the sole exception being `"."` for the root directory).
    ///
    /// Returns a file reader for files and a listing handle for
    /// directories, including directories that exist only as ancestors of
    /// member paths.
    pub fn open_path(&self, name: &str) -> Result<Node<'_, R>> {
        fs::open_path(&self.core, name)
    }
}

/// A single member of an archive. Obtain the content with
/// [`open`](File::open).
pub struct File<'a, R> {
    core: &'a Arc<ArchiveCore<R>>,
    index: usize,
}

impl<'a, R: Read + Seek + Send + 'static> File<'a, R> {
    /// The member's metadata.
    pub fn header(&self) -> &'a FileHeader {
        &self.core.records[self.index].header
    }

    /// Opens the member's content for reading. Multiple members may be
    /// open concurrently.
    pub fn open(&self) -> Result<FileReader<R>> {
        open_record(self.core, self.index)
    }
}

pub(crate) fn open_record<R: Read + Seek + Send + 'static>(
    core: &Arc<ArchiveCore<R>>,
    index: usize,
) -> Result<FileReader<R>> {
    let record = &core.records[index];

    // Directories and zero-byte files have no stream to decode.
    if record.header.is_empty_stream || record.header.is_empty_file {
        return Ok(FileReader {
            core: Arc::clone(core),
            index,
            rc: None,
            remaining: 0,
        });
    }

    let pooled = lock_pool(&core.pools[record.folder]).get(record.offset);

    let mut rc = match pooled {
        Some(rc) => rc,
        None => {
            let (rc, _crc) = folder_reader(&core.si, &core.body, record.folder, &core.password)
                .map_err(|fe| Error::read(fe.encrypted, fe.source))?;
            rc
        }
    };

    // Roll the pipeline forward to this file's bytes.
    if let Err(e) = rc.seek(SeekFrom::Start(record.offset)) {
        return Err(Error::read(rc.has_encryption(), e));
    }

    Ok(FileReader {
        core: Arc::clone(core),
        index,
        rc: Some(rc),
        remaining: record.header.uncompressed_size,
    })
}

/// Streams one member's uncompressed bytes.
///
/// Dropping the reader returns its folder pipeline to the pool when the
/// pipeline has not reached its end; [`close`](FileReader::close) does
/// the same explicitly. Reading members of a solid folder in archive
/// order, closing each reader before opening the next, therefore decodes
/// the folder exactly once.
pub struct FileReader<R> {
    core: Arc<ArchiveCore<R>>,
    index: usize,
    rc: Option<folder::FolderReader>,
    remaining: u64,
}

impl<R: Read + Seek + Send + 'static> FileReader<R> {
    /// The member's metadata.
    pub fn header(&self) -> &FileHeader {
        &self.core.records[self.index].header
    }

    /// Closes the reader, parking the folder pipeline for reuse.
    pub fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl<R> FileReader<R> {
    fn release(&mut self) {
        if let Some(rc) = self.rc.take() {
            if rc.position() < rc.size() {
                let folder = self.core.records[self.index].folder;
                lock_pool(&self.core.pools[folder]).put(rc.position(), rc);
            }
            // At end of folder the pipeline has nothing left to give and
            // is dropped.
        }
    }
}

impl<R: Read + Seek + Send + 'static> Read for FileReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.remaining == 0 {
            return Ok(0);
        }

        let Some(rc) = self.rc.as_mut() else {
            return Ok(0);
        };

        let max = (self.remaining.min(buf.len() as u64)) as usize;
        match rc.read(&mut buf[..max]) {
            Ok(n) => {
                self.remaining -= n as u64;
                Ok(n)
            }
            Err(e) => Err(io::Error::other(Error::read(
                rc.has_encryption(),
                Error::Io(e),
            ))),
        }
    }
}

impl<R> Drop for FileReader<R> {
    fn drop(&mut self) {
        self.release();
    }
}

fn ensure_exhausted(cursor: &Cursor<&[u8]>) -> Result<()> {
    if cursor.position() < cursor.get_ref().len() as u64 {
        return Err(Error::InvalidFormat(
            "trailing data after header structure".into(),
        ));
    }
    Ok(())
}

/// Opens the 7z archive at `path` on the OS filesystem.
///
/// A path ending in `.001` is treated as the first of a sequence of
/// split volumes, and each sequential volume is opened as part of the
/// archive; [`Archive::volumes`] reports the parts found.
pub fn open_path(path: impl AsRef<std::path::Path>) -> Result<Archive<MultiVolume<std::fs::File>>> {
    open_path_with_password(path, Password::empty())
}

/// Opens the 7z archive at `path` with a password. See [`open_path`].
pub fn open_path_with_password(
    path: impl AsRef<std::path::Path>,
    password: impl Into<Password>,
) -> Result<Archive<MultiVolume<std::fs::File>>> {
    open_path_with_opener(&OsOpener, path, password)
}

/// Opens an archive through a custom [`FileOpener`], the capability used
/// to open volume parts.
pub fn open_path_with_opener<O: FileOpener>(
    opener: &O,
    path: impl AsRef<std::path::Path>,
    password: impl Into<Password>,
) -> Result<Archive<MultiVolume<O::File>>>
where
    O::File: 'static,
{
    let (volume, names) = MultiVolume::open(opener, path.as_ref())?;
    let size = volume.size();
    Archive::init(volume, size, password.into(), names)
}
