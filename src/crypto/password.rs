//! Password handling.

use zeroize::Zeroizing;

/// A password used as the basis of the AES-256 decryption key.
///
/// The backing storage is zeroed on drop, and the 7z key-derivation
/// function consumes the UTF-16LE encoding exposed by
/// [`as_utf16_le`](Self::as_utf16_le).
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Creates a new password.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// An empty password, used when opening archives without one.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Returns the password as UTF-16LE bytes, the encoding 7z feeds into
    /// key derivation.
    pub fn as_utf16_le(&self) -> Vec<u8> {
        self.inner
            .encode_utf16()
            .flat_map(|c| c.to_le_bytes())
            .collect()
    }

    /// Returns `true` if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the password itself.
        f.debug_struct("Password")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
