//! Decoder registry and the coder abstraction.
//!
//! Every compression, filter, and decryption stage a folder can name is
//! reached through a process-wide registry mapping method id bytes to a
//! constructor. Constructors receive the coder's property blob, the
//! declared unpack size for the coder's output, and the already-wired
//! input readers (one for almost everything, four for BCJ2), and return
//! a [`CoderReader`].
//!
//! The registry is an extension point: [`register_decompressor`] installs
//! a constructor for a method id, replacing any bundled one. The bundled
//! set covers the methods produced by the reference 7-Zip tool, gated
//! behind the matching cargo features.

#[cfg(feature = "bzip2")]
pub mod bzip2;
#[cfg(feature = "brotli")]
pub mod brotli;
pub mod bcj2;
mod copy;
#[cfg(feature = "deflate")]
pub mod deflate;
#[cfg(feature = "lzma")]
pub mod filters;
#[cfg(feature = "lz4")]
pub mod lz4;
#[cfg(feature = "lzma")]
pub mod lzma;
#[cfg(feature = "zstd")]
pub mod zstd;

pub use copy::CopyReader;

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, LazyLock, RwLock};

use crate::crypto::Password;
use crate::{Error, Result};

/// An input stream handed to a coder constructor: either a buffered slice
/// of the archive body or another coder's output.
pub type CoderInput = Box<dyn Read + Send>;

/// A constructed decoder stage.
///
/// The only capability beyond [`Read`] is password acceptance: the folder
/// engine probes every freshly built coder with the archive password, and
/// encryption-bearing coders claim it by returning `true`. This keeps the
/// constructor signature uniform across plain and encrypting methods.
pub trait CoderReader: Read + Send {
    /// Offers the archive password to this coder.
    ///
    /// Returns `true` when the coder uses encryption and has accepted the
    /// password (initializing its cipher state). The default
    /// implementation ignores the password and returns `false`.
    fn set_password(&mut self, password: &Password) -> Result<bool> {
        let _ = password;
        Ok(false)
    }
}

impl std::fmt::Debug for dyn CoderReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoderReader").finish_non_exhaustive()
    }
}

/// Constructor signature stored in the registry.
///
/// Arguments are the coder property blob, the declared unpack size of the
/// coder's output stream, and its input readers.
pub type Decompressor =
    Arc<dyn Fn(&[u8], u64, Vec<CoderInput>) -> Result<Box<dyn CoderReader>> + Send + Sync>;

/// Method ids assigned by the 7z format.
pub mod method {
    /// Copy (no compression).
    pub const COPY: &[u8] = &[0x00];
    /// Delta filter.
    pub const DELTA: &[u8] = &[0x03];
    /// LZMA.
    pub const LZMA: &[u8] = &[0x03, 0x01, 0x01];
    /// LZMA2.
    pub const LZMA2: &[u8] = &[0x21];
    /// Deflate.
    pub const DEFLATE: &[u8] = &[0x04, 0x01, 0x08];
    /// BZip2.
    pub const BZIP2: &[u8] = &[0x04, 0x02, 0x02];
    /// BCJ (x86) branch filter.
    pub const BCJ_X86: &[u8] = &[0x03, 0x03, 0x01, 0x03];
    /// BCJ2 (4-stream x86) filter.
    pub const BCJ2: &[u8] = &[0x03, 0x03, 0x01, 0x1B];
    /// PowerPC branch filter.
    pub const BCJ_PPC: &[u8] = &[0x03, 0x03, 0x02, 0x05];
    /// ARM branch filter.
    pub const BCJ_ARM: &[u8] = &[0x03, 0x03, 0x05, 0x01];
    /// SPARC branch filter.
    pub const BCJ_SPARC: &[u8] = &[0x03, 0x03, 0x08, 0x05];
    /// ARM64 branch filter.
    pub const BCJ_ARM64: &[u8] = &[0x0A];
    /// Zstandard (vendor-assigned id).
    pub const ZSTD: &[u8] = &[0x04, 0xF7, 0x11, 0x01];
    /// Brotli (vendor-assigned id).
    pub const BROTLI: &[u8] = &[0x04, 0xF7, 0x11, 0x02];
    /// LZ4 (vendor-assigned id).
    pub const LZ4: &[u8] = &[0x04, 0xF7, 0x11, 0x04];
    /// AES-256-CBC with SHA-256 key derivation.
    pub const AES: &[u8] = &[0x06, 0xF1, 0x07, 0x01];
}

/// Validates that a constructor received exactly one input reader.
pub(crate) fn expect_single(mut inputs: Vec<CoderInput>, codec: &'static str) -> Result<CoderInput> {
    if inputs.len() != 1 {
        return Err(Error::InvalidFormat(format!(
            "{codec}: need exactly one input stream, got {}",
            inputs.len()
        )));
    }
    Ok(inputs.pop().expect("length checked"))
}

static REGISTRY: LazyLock<RwLock<HashMap<Vec<u8>, Decompressor>>> = LazyLock::new(|| {
    let mut m: HashMap<Vec<u8>, Decompressor> = HashMap::new();

    m.insert(
        method::COPY.to_vec(),
        Arc::new(|_props: &[u8], size: u64, inputs: Vec<CoderInput>| {
            let input = expect_single(inputs, "copy")?;
            Ok(Box::new(CopyReader::new(input, size)) as Box<dyn CoderReader>)
        }),
    );

    m.insert(method::BCJ2.to_vec(), Arc::new(bcj2::new_reader));

    #[cfg(feature = "lzma")]
    {
        m.insert(method::LZMA.to_vec(), Arc::new(lzma::new_lzma_reader));
        m.insert(method::LZMA2.to_vec(), Arc::new(lzma::new_lzma2_reader));
        m.insert(method::DELTA.to_vec(), Arc::new(filters::new_delta_reader));
        m.insert(method::BCJ_X86.to_vec(), Arc::new(filters::new_bcj_reader));
        m.insert(method::BCJ_ARM.to_vec(), Arc::new(filters::new_arm_reader));
        m.insert(
            method::BCJ_ARM64.to_vec(),
            Arc::new(filters::new_arm64_reader),
        );
        m.insert(method::BCJ_PPC.to_vec(), Arc::new(filters::new_ppc_reader));
        m.insert(
            method::BCJ_SPARC.to_vec(),
            Arc::new(filters::new_sparc_reader),
        );
    }

    #[cfg(feature = "deflate")]
    m.insert(method::DEFLATE.to_vec(), Arc::new(deflate::new_reader));

    #[cfg(feature = "bzip2")]
    m.insert(method::BZIP2.to_vec(), Arc::new(bzip2::new_reader));

    #[cfg(feature = "brotli")]
    m.insert(method::BROTLI.to_vec(), Arc::new(brotli::new_reader));

    #[cfg(feature = "lz4")]
    m.insert(method::LZ4.to_vec(), Arc::new(lz4::new_reader));

    #[cfg(feature = "zstd")]
    m.insert(method::ZSTD.to_vec(), Arc::new(zstd::new_reader));

    #[cfg(feature = "aes")]
    m.insert(method::AES.to_vec(), Arc::new(crate::crypto::new_reader));

    RwLock::new(m)
});

/// Registers a decompressor for a method id.
///
/// The bundled codecs are installed before the first lookup; registering
/// a method id again replaces the previous constructor, so this doubles
/// as an override point for the bundled implementations.
pub fn register_decompressor(method: &[u8], dcomp: Decompressor) {
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.insert(method.to_vec(), dcomp);
}

/// Looks up the decompressor for a method id.
pub(crate) fn decompressor(method: &[u8]) -> Option<Decompressor> {
    let registry = REGISTRY
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.get(method).cloned()
}
