//! Split-volume support.
//!
//! A multi-volume archive is a plain 7z byte stream cut into files named
//! `name.001`, `name.002`, and so on. [`MultiVolume`] composes the parts
//! back into one seekable source; the parts are opened through the
//! [`FileOpener`] capability so the discovery loop has no direct
//! filesystem dependency.

mod reader;

pub use reader::MultiVolume;

use std::fs;
use std::io::{self, Read, Seek};
use std::path::Path;

/// Capability for opening volume parts.
///
/// `open` yields a random-access reader plus its size; `is_not_found`
/// classifies the error that ends the discovery loop.
pub trait FileOpener {
    /// The reader type produced for each part.
    type File: Read + Seek + Send;

    /// Opens the file at `path`, returning the reader and its size.
    fn open(&self, path: &Path) -> io::Result<(Self::File, u64)>;

    /// Returns `true` when `error` means the file does not exist, which
    /// terminates volume discovery rather than failing it.
    fn is_not_found(&self, error: &io::Error) -> bool {
        error.kind() == io::ErrorKind::NotFound
    }
}

/// [`FileOpener`] over the OS filesystem.
pub struct OsOpener;

impl FileOpener for OsOpener {
    type File = fs::File;

    fn open(&self, path: &Path) -> io::Result<(Self::File, u64)> {
        let file = fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }
}
