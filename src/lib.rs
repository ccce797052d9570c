//! # heptazip
//!
//! A pure-Rust library providing read access to 7z archives: solid
//! streams, compressed and encrypted headers, split volumes, and
//! self-extracting stubs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::io::Read;
//!
//! fn main() -> heptazip::Result<()> {
//!     let archive = heptazip::open_path("archive.7z")?;
//!
//!     for file in archive.files() {
//!         println!("{}: {} bytes", file.header().name, file.header().uncompressed_size);
//!
//!         let mut reader = file.open()?;
//!         let mut contents = Vec::new();
//!         reader.read_to_end(&mut contents)?;
//!         reader.close()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Archives split into volumes open from the first part
//! (`heptazip::open_path("archive.7z.001")`), and in-memory or custom
//! sources open through [`Archive::new`] with any `Read + Seek` value.
//! Encrypted archives take a password via [`open_path_with_password`] or
//! [`Archive::with_password`].
//!
//! ## Solid archives and reading order
//!
//! Files inside one folder (solid block) share a single compressed
//! stream that only decodes forward. The library keeps partially
//! consumed decode pipelines in a per-folder pool, so reading a folder's
//! files in archive order — closing each reader before opening the
//! next — decompresses the folder exactly once. Random order works but
//! pays for re-decoding.
//!
//! ## Filesystem view
//!
//! [`Archive::open_path`] resolves slash-separated member paths,
//! serving files and directory listings (including directories that
//! exist only implicitly as path prefixes):
//!
//! ```rust,no_run
//! # fn main() -> heptazip::Result<()> {
//! let archive = heptazip::open_path("archive.7z")?;
//! if let heptazip::Node::Dir(dir) = archive.open_path("docs")? {
//!     for entry in dir.read_dir()? {
//!         println!("{} (dir: {})", entry.name(), entry.is_dir());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Passwords and error reporting
//!
//! AES-CBC decryption cannot itself detect a wrong password: bad keys
//! decrypt into garbage. A wrong password therefore surfaces as a
//! decoder failure wrapped in [`Error::Read`] with `encrypted == true`
//! (at open time for encrypted headers, at extraction time otherwise),
//! or as silently wrong bytes for stored-uncompressed encrypted files —
//! verify [`FileHeader::crc32`](format::files::FileHeader::crc32) after
//! extraction to catch that case.
//!
//! ## Feature flags
//!
//! Every bundled codec sits behind a feature, all enabled by default:
//! `lzma` (LZMA/LZMA2 plus the Delta and branch filters), `deflate`,
//! `bzip2`, `brotli`, `lz4`, `zstd`, and `aes`. Copy and BCJ2 are always
//! available. Additional method ids can be wired in at runtime with
//! [`register_decompressor`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

/// Default buffer size for read-and-discard and packed-stream buffering
/// (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod codec;
pub mod crypto;
pub mod error;
pub mod format;
pub mod fs;
pub mod read;
pub mod timestamp;
pub mod volume;

pub use codec::{CoderInput, CoderReader, Decompressor, register_decompressor};
pub use crypto::Password;
pub use error::{Error, Result, SeekError};
pub use format::files::FileHeader;
pub use fs::{Dir, DirEntry, Node};
pub use read::{Archive, File, FileReader, open_path, open_path_with_opener, open_path_with_password};
pub use timestamp::Timestamp;
pub use volume::{FileOpener, MultiVolume, OsOpener};
