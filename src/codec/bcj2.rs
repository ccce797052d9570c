//! BCJ2: the four-stream x86 CALL/JCC filter.
//!
//! BCJ2 splits filtered x86 code into four streams: the main byte stream,
//! absolute CALL destinations, absolute JMP/JCC destinations, and a
//! range-coded selector stream saying which CALL/JCC opcodes actually had
//! their operands extracted. Decoding walks the main stream, consults the
//! adaptive arithmetic decoder at every candidate opcode, and rewrites
//! chosen destinations back to little-endian relative form.
//!
//! This is the one coder with more than one input, which is why the coder
//! graph models inputs as ports instead of a linear chain.

use std::io::{self, Read};

use super::{CoderInput, CoderReader};
use crate::{Error, Result};

const NUM_MOVE_BITS: u32 = 5;
const NUM_BIT_MODEL_TOTAL_BITS: u32 = 11;
const BIT_MODEL_TOTAL: u32 = 1 << NUM_BIT_MODEL_TOTAL_BITS;
const TOP_VALUE: u32 = 1 << 24;

/// One probability context per E8 prefix byte, plus one for E9 and one
/// for JCC.
const NUM_CONTEXTS: usize = 256 + 2;

/// Decoded bytes are accumulated up to this much before a read is served.
const BUFFER_TARGET: usize = 1 << 16;

/// The BCJ2 decoder.
pub struct Bcj2Reader {
    main: CoderInput,
    call: CoderInput,
    jump: CoderInput,
    rd: CoderInput,

    range: u32,
    code: u32,
    probs: [u16; NUM_CONTEXTS],

    previous: u8,
    written: u32,

    buf: Vec<u8>,
    pos: usize,
    main_eof: bool,
}

impl std::fmt::Debug for Bcj2Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bcj2Reader").finish_non_exhaustive()
    }
}

fn is_jcc(b0: u8, b1: u8) -> bool {
    b0 == 0x0F && (b1 & 0xF0) == 0x80
}

fn is_j(b0: u8, b1: u8) -> bool {
    (b1 & 0xFE) == 0xE8 || is_jcc(b0, b1)
}

fn context_index(b0: u8, b1: u8) -> usize {
    match b1 {
        0xE8 => b0 as usize,
        0xE9 => 256,
        _ => 257,
    }
}

/// Reads one byte; `Ok(None)` at end of stream.
fn read_byte(r: &mut CoderInput) -> io::Result<Option<u8>> {
    let mut b = [0u8; 1];
    loop {
        match r.read(&mut b) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(b[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

impl Bcj2Reader {
    /// Creates a BCJ2 decoder from its four input streams, consuming the
    /// five-byte range-decoder prelude.
    pub fn new(
        main: CoderInput,
        call: CoderInput,
        jump: CoderInput,
        mut rd: CoderInput,
    ) -> Result<Self> {
        let mut prelude = [0u8; 5];
        rd.read_exact(&mut prelude).map_err(Error::Io)?;

        let mut code = 0u32;
        for &b in &prelude {
            code = (code << 8) | b as u32;
        }

        Ok(Self {
            main,
            call,
            jump,
            rd,
            range: 0xFFFF_FFFF,
            code,
            probs: [(BIT_MODEL_TOTAL >> 1) as u16; NUM_CONTEXTS],
            previous: 0,
            written: 0,
            buf: Vec::with_capacity(BUFFER_TARGET),
            pos: 0,
            main_eof: false,
        })
    }

    fn normalize(&mut self) -> io::Result<()> {
        if self.range < TOP_VALUE {
            // The selector stream may end before the main stream; missing
            // normalization bytes decode as zero.
            let b = read_byte(&mut self.rd)?.unwrap_or(0);
            self.code = (self.code << 8) | b as u32;
            self.range <<= 8;
        }
        Ok(())
    }

    fn decode_bit(&mut self, i: usize) -> io::Result<bool> {
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * self.probs[i] as u32;

        let bit = if self.code < bound {
            self.range = bound;
            self.probs[i] += ((BIT_MODEL_TOTAL - self.probs[i] as u32) >> NUM_MOVE_BITS) as u16;
            false
        } else {
            self.range -= bound;
            self.code -= bound;
            self.probs[i] -= self.probs[i] >> NUM_MOVE_BITS;
            true
        };

        self.normalize()?;
        Ok(bit)
    }

    /// Pulls main-stream bytes into the buffer until one branch opcode has
    /// been resolved, the buffer target is reached, or the stream ends.
    fn fill(&mut self) -> io::Result<()> {
        let b = loop {
            let Some(b) = read_byte(&mut self.main)? else {
                self.main_eof = true;
                return Ok(());
            };

            self.written = self.written.wrapping_add(1);
            self.buf.push(b);

            if is_j(self.previous, b) {
                break b;
            }

            self.previous = b;

            if self.buf.len() - self.pos >= BUFFER_TARGET {
                return Ok(());
            }
        };

        let transformed = self.decode_bit(context_index(self.previous, b))?;

        if transformed {
            let src = if b == 0xE8 {
                &mut self.call
            } else {
                &mut self.jump
            };

            let mut be = [0u8; 4];
            if let Err(e) = src.read_exact(&mut be) {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    // Truncated destination stream; serve what decoded.
                    self.main_eof = true;
                    return Ok(());
                }
                return Err(e);
            }

            let dest = u32::from_be_bytes(be)
                .wrapping_sub(self.written.wrapping_add(4));

            self.buf.extend_from_slice(&dest.to_le_bytes());
            self.previous = (dest >> 24) as u8;
            self.written = self.written.wrapping_add(4);
        } else {
            self.previous = b;
        }

        Ok(())
    }
}

impl Read for Bcj2Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;

            if self.main_eof {
                return Ok(0);
            }
            self.fill()?;
        }

        let available = &self.buf[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl CoderReader for Bcj2Reader {}

/// Builds a BCJ2 decoder from exactly four inputs: main, call, jump, and
/// the range-coded selector stream, in folder input-port order.
pub(crate) fn new_reader(
    _properties: &[u8],
    _size: u64,
    inputs: Vec<CoderInput>,
) -> Result<Box<dyn CoderReader>> {
    if inputs.len() != 4 {
        return Err(Error::InvalidFormat(format!(
            "bcj2: need exactly four input streams, got {}",
            inputs.len()
        )));
    }

    let mut inputs = inputs.into_iter();
    let main = inputs.next().expect("length checked");
    let call = inputs.next().expect("length checked");
    let jump = inputs.next().expect("length checked");
    let rd = inputs.next().expect("length checked");

    Ok(Box::new(Bcj2Reader::new(main, call, jump, rd)?))
}
