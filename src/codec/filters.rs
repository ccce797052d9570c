//! Branch-conversion and Delta filters.
//!
//! These are stateful byte rewriters, not compressors; 7z applies them to
//! executable sections so that relative branch targets compress better.
//! The rewriting itself comes from `lzma_rust2`'s filter readers.

use std::io::{self, Read};

use lzma_rust2::filter::bcj::BcjReader;
use lzma_rust2::filter::delta::DeltaReader;

use super::{CoderInput, CoderReader, expect_single};
use crate::{Error, Result};

/// Delta filter decoder.
pub struct DeltaFilterReader {
    inner: DeltaReader<CoderInput>,
}

impl Read for DeltaFilterReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for DeltaFilterReader {}

/// Builds a Delta decoder. The single property byte stores distance - 1.
pub(crate) fn new_delta_reader(
    properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    let input = expect_single(inputs, "delta")?;

    if properties.len() != 1 {
        return Err(Error::InvalidProperties {
            codec: "delta",
            reason: format!("need 1 property byte, got {}", properties.len()),
        });
    }

    let distance = properties[0] as usize + 1;
    Ok(Box::new(DeltaFilterReader {
        inner: DeltaReader::new(input, distance),
    }))
}

/// Branch filter decoder, shared by every architecture.
pub struct BranchFilterReader {
    inner: BcjReader<CoderInput>,
}

impl Read for BranchFilterReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl CoderReader for BranchFilterReader {}

macro_rules! branch_reader {
    ($(#[$doc:meta])* $name:ident, $ctor:ident, $codec:literal) => {
        $(#[$doc])*
        pub(crate) fn $name(
            _properties: &[u8],
            _size: u64,
            inputs: Vec<CoderInput>,
        ) -> Result<Box<dyn CoderReader>> {
            let input = expect_single(inputs, $codec)?;
            Ok(Box::new(BranchFilterReader {
                inner: BcjReader::$ctor(input, 0),
            }))
        }
    };
}

branch_reader!(
    /// Builds the x86 BCJ decoder.
    new_bcj_reader,
    new_x86,
    "bcj"
);
branch_reader!(
    /// Builds the ARM branch decoder.
    new_arm_reader,
    new_arm,
    "bcj-arm"
);
branch_reader!(
    /// Builds the ARM64 branch decoder.
    new_arm64_reader,
    new_arm64,
    "bcj-arm64"
);
branch_reader!(
    /// Builds the PowerPC branch decoder.
    new_ppc_reader,
    new_ppc,
    "bcj-ppc"
);
branch_reader!(
    /// Builds the SPARC branch decoder.
    new_sparc_reader,
    new_sparc,
    "bcj-sparc"
);
