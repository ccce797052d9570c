//! Error types for 7z archive reading.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when reading 7z archives, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`:
//!
//! ```rust,no_run
//! use heptazip::{Archive, Result};
//! use std::fs::File;
//!
//! fn list(path: &str) -> Result<()> {
//!     let file = File::open(path)?;
//!     let size = file.metadata()?.len();
//!     let archive = Archive::new(file, size)?;
//!     for file in archive.files() {
//!         println!("{}", file.header().name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Errors fall into four families: format errors (malformed or unsupported
//! structure), integrity errors (CRC mismatches), operational errors
//! carrying an encryption hint, and usage errors such as backwards seeks.

use std::io;

/// The kind of an invalid seek on a folder pipeline.
///
/// Folder pipelines are forward-only: a seek is implemented by reading and
/// discarding, so the target must lie between the current position and the
/// declared size. `io::SeekFrom` is a closed enum, so an invalid whence is
/// unrepresentable and has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SeekError {
    /// The computed target position is negative.
    Negative,
    /// The target lies before the current position.
    Backwards,
    /// The target lies past the declared uncompressed size.
    PastEof,
}

impl std::fmt::Display for SeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negative => write!(f, "negative seek"),
            Self::Backwards => write!(f, "cannot seek backwards"),
            Self::PastEof => write!(f, "cannot seek beyond EOF"),
        }
    }
}

/// The main error type for 7z archive reading.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error from the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive structure is malformed or not a 7z file at all.
    #[error("not a valid 7-zip file: {0}")]
    InvalidFormat(String),

    /// A CRC-32 did not match at one of the defined scopes (start header,
    /// metadata blob, encoded-header output, folder output).
    #[error("{scope} checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Which structure failed verification.
        scope: &'static str,
        /// The CRC recorded in the archive.
        expected: u32,
        /// The CRC computed over the data.
        actual: u32,
    },

    /// An unknown tag id appeared where the grammar does not allow it.
    #[error("unexpected property id {id:#04x} in {context}")]
    UnexpectedId {
        /// The offending tag byte.
        id: u8,
        /// The structure being parsed when it appeared.
        context: &'static str,
    },

    /// The archive uses a format feature this crate does not implement,
    /// such as external (out-of-stream) metadata.
    #[error("unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// No decompressor is registered for a coder's method id.
    #[error("unsupported compression method: {method_id:#x}")]
    UnsupportedMethod {
        /// The method id, packed little-endian into a u64.
        method_id: u64,
    },

    /// A coder's property blob is malformed for its method.
    #[error("{codec}: invalid properties: {reason}")]
    InvalidProperties {
        /// The codec that rejected its properties.
        codec: &'static str,
        /// What was wrong with them.
        reason: String,
    },

    /// A coder declares more than one output stream.
    #[error("more than one output stream")]
    MultipleOutputStreams,

    /// A coder input is neither a packed stream nor the target of a bind
    /// pair whose producing coder has already run.
    #[error("cannot find bound stream for input {index}")]
    UnboundInput {
        /// The folder-global input stream index.
        index: u64,
    },

    /// A folder does not have exactly one unbound output stream.
    #[error("expecting one unbound output stream")]
    NoUnboundStream,

    /// An encrypted stream was read before a password was supplied.
    #[error("no password set")]
    NoPassword,

    /// The header references substreams or packed data but carries no
    /// unpack info describing any folder.
    #[error("missing unpack info")]
    MissingUnpackInfo,

    /// A read from a folder pipeline failed. `encrypted` is a hint that
    /// decryption participated in the pipeline: with AES-CBC a wrong
    /// password decrypts into garbage rather than failing, so this flag is
    /// the only signal a caller gets to suspect the password.
    #[error("read error: {source}")]
    Read {
        /// Whether an encryption coder is part of the failing pipeline.
        encrypted: bool,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// An invalid seek on a folder pipeline or file reader.
    #[error("seek error: {0}")]
    Seek(SeekError),

    /// Stat on a path that appears more than once in the archive.
    #[error("{path}: duplicate entries in 7-zip file")]
    DuplicateEntry {
        /// The duplicated archive path.
        path: String,
    },

    /// A path-based lookup found no entry.
    #[error("{path}: file does not exist")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },
}

impl Error {
    /// Returns `true` if this error is (or wraps) a failed integrity check.
    pub fn is_checksum(&self) -> bool {
        match self {
            Error::ChecksumMismatch { .. } => true,
            Error::Read { source, .. } => source.is_checksum(),
            _ => false,
        }
    }

    /// Returns the encryption hint if this is a read error.
    ///
    /// `Some(true)` means the failing pipeline contained a decryption
    /// stage, which usually indicates a wrong password.
    pub fn encrypted_hint(&self) -> Option<bool> {
        match self {
            Error::Read { encrypted, .. } => Some(*encrypted),
            _ => None,
        }
    }

    /// Wraps an error produced while reading from a folder pipeline,
    /// attaching the pipeline's encryption hint.
    pub(crate) fn read(encrypted: bool, source: Error) -> Self {
        Error::Read {
            encrypted,
            source: Box::new(source),
        }
    }

    /// Recovers a `heptazip` error smuggled through `io::Error`, as done by
    /// [`Read`](std::io::Read) implementations in this crate.
    pub fn from_io(err: &io::Error) -> Option<&Error> {
        err.get_ref().and_then(|inner| inner.downcast_ref())
    }
}

/// A specialized `Result` type for 7z operations.
pub type Result<T> = std::result::Result<T, Error>;
