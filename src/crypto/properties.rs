//! AES coder property parsing.

use crate::{Error, Result};

/// Parsed AES-256 coder properties.
///
/// The first byte packs a salt-presence flag, an IV-presence flag, and
/// the 6-bit cycles exponent; the second byte extends the salt and IV
/// lengths; the remaining bytes are the salt followed by the IV.
#[derive(Debug, Clone)]
pub struct AesProperties {
    /// Key-derivation cost: `2^cycles` SHA-256 iterations, or `0x3F` for
    /// the no-hash raw-key mode.
    pub cycles: u8,
    /// Salt for key derivation (0-16 bytes).
    pub salt: Vec<u8>,
    /// CBC initialization vector, zero-padded to 16 bytes.
    pub iv: [u8; 16],
}

impl AesProperties {
    /// Parses the property blob of an AES coder.
    pub fn parse(properties: &[u8]) -> Result<Self> {
        if properties.len() < 2 {
            return Err(Error::InvalidProperties {
                codec: "aes",
                reason: "need at least 2 property bytes".into(),
            });
        }

        // Streams written by the reference tool always carry at least one
        // of salt or IV; neither flag set marks a different method layout.
        if properties[0] & 0xC0 == 0 {
            return Err(Error::InvalidProperties {
                codec: "aes",
                reason: "unsupported property layout".into(),
            });
        }

        let salt_len = ((properties[0] >> 7) & 1) + (properties[1] >> 4);
        let iv_len = ((properties[0] >> 6) & 1) + (properties[1] & 0x0F);
        let cycles = properties[0] & 0x3F;

        let expected = 2 + salt_len as usize + iv_len as usize;
        if properties.len() != expected {
            return Err(Error::InvalidProperties {
                codec: "aes",
                reason: format!("expected {expected} bytes, got {}", properties.len()),
            });
        }

        let salt = properties[2..2 + salt_len as usize].to_vec();

        let mut iv = [0u8; 16];
        let iv_bytes = &properties[2 + salt_len as usize..];
        iv[..iv_bytes.len().min(16)].copy_from_slice(&iv_bytes[..iv_bytes.len().min(16)]);

        Ok(Self { cycles, salt, iv })
    }
}
