//! AES-256 decryption for 7z archives.
//!
//! 7z encrypts with AES-256 in CBC mode; the key is derived from the
//! password by an iterated SHA-256 scheme whose cost is encoded in the
//! coder properties. Derivation is expensive (the reference tool defaults
//! to 2^19 iterations), so derived keys are cached process-wide, keyed by
//! (password, cycles, salt).
//!
//! An AES coder is constructed without a key: the folder engine offers the
//! archive password afterwards through the [`CoderReader`] capability
//! probe, which also tells it the folder contains encryption. Reads before
//! the password is set fail with [`Error::NoPassword`].

mod password;
mod properties;

pub use password::Password;
pub use properties::AesProperties;

#[cfg(feature = "aes")]
pub use decoder::derive_key;
#[cfg(feature = "aes")]
pub(crate) use decoder::new_reader;

#[cfg(feature = "aes")]
mod decoder {
    use std::io::{self, Read};
    use std::num::NonZeroUsize;
    use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

    use aes::Aes256;
    use aes::cipher::generic_array::GenericArray;
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};
    use lru::LruCache;
    use sha2::{Digest, Sha256};

    use super::{AesProperties, Password};
    use crate::codec::{CoderInput, CoderReader, expect_single};
    use crate::{Error, Result};

    type Aes256CbcDec = cbc::Decryptor<Aes256>;

    const BLOCK_SIZE: usize = 16;

    /// The cycles value meaning "no hashing": the key is the raw
    /// salt-plus-password bytes.
    const NO_HASH_CYCLES: u8 = 0x3F;

    /// Iteration cost ceiling. 2^24 is already an order of magnitude past
    /// what the reference tool writes; anything above this is a
    /// denial-of-service attempt, not an archive.
    const MAX_CYCLES: u8 = 30;

    /// Derived keys kept across folders and archives.
    const KEY_CACHE_SIZE: usize = 16;

    #[derive(PartialEq, Eq, Hash)]
    struct CacheKey {
        /// SHA-256 of the UTF-16LE password, so plaintext never sits in
        /// the cache.
        password_hash: [u8; 32],
        cycles: u8,
        salt: Vec<u8>,
    }

    static KEY_CACHE: LazyLock<Mutex<LruCache<CacheKey, [u8; 32]>>> = LazyLock::new(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(KEY_CACHE_SIZE).expect("nonzero capacity"),
        ))
    });

    fn lock_cache() -> MutexGuard<'static, LruCache<CacheKey, [u8; 32]>> {
        KEY_CACHE.lock().unwrap_or_else(|poisoned| {
            // Cached keys are deterministically derivable, so a poisoned
            // cache is safe to keep using.
            log::warn!("AES key cache mutex was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Derives the AES-256 key for a password, salt, and cycles exponent.
    ///
    /// With `cycles == 0x3F` the key is (salt ‖ UTF-16LE password),
    /// truncated or zero-padded to 32 bytes. Otherwise SHA-256 digests
    /// `2^cycles` repetitions of (salt ‖ password ‖ counter), the counter
    /// a little-endian u64 starting at zero. Derived keys are cached
    /// process-wide.
    pub fn derive_key(password: &Password, cycles: u8, salt: &[u8]) -> Result<[u8; 32]> {
        let password_bytes = password.as_utf16_le();

        if cycles == NO_HASH_CYCLES {
            let mut key = [0u8; 32];
            let mut material = salt.to_vec();
            material.extend_from_slice(&password_bytes);
            let n = material.len().min(32);
            key[..n].copy_from_slice(&material[..n]);
            return Ok(key);
        }

        if cycles > MAX_CYCLES {
            return Err(Error::InvalidProperties {
                codec: "aes",
                reason: format!("key derivation cost 2^{cycles} exceeds 2^{MAX_CYCLES}"),
            });
        }

        let cache_key = CacheKey {
            password_hash: Sha256::digest(&password_bytes).into(),
            cycles,
            salt: salt.to_vec(),
        };

        if let Some(key) = lock_cache().get(&cache_key) {
            return Ok(*key);
        }

        let mut sha = Sha256::new();
        for counter in 0..(1u64 << cycles) {
            sha.update(salt);
            sha.update(&password_bytes);
            sha.update(counter.to_le_bytes());
        }
        let key: [u8; 32] = sha.finalize().into();

        lock_cache().put(cache_key, key);

        Ok(key)
    }

    /// The AES-256-CBC decoder stage.
    pub(crate) struct AesReader {
        inner: CoderInput,
        props: AesProperties,
        cipher: Option<Aes256CbcDec>,
        buf: Vec<u8>,
        pos: usize,
        exhausted: bool,
    }

    impl AesReader {
        fn fill(&mut self, want: usize) -> io::Result<()> {
            let cipher = self
                .cipher
                .as_mut()
                .expect("fill is only called after the password is set");

            while self.buf.len() - self.pos < want && !self.exhausted {
                let mut block = [0u8; BLOCK_SIZE];
                let mut filled = 0;
                while filled < BLOCK_SIZE {
                    match self.inner.read(&mut block[filled..]) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }

                // A trailing partial block cannot be decrypted; it is
                // dropped, matching the format's whole-block framing.
                if filled < BLOCK_SIZE {
                    self.exhausted = true;
                    break;
                }

                cipher.decrypt_block_mut(GenericArray::from_mut_slice(&mut block));
                self.buf.extend_from_slice(&block);
            }

            Ok(())
        }
    }

    impl Read for AesReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cipher.is_none() {
                return Err(io::Error::other(Error::NoPassword));
            }

            if buf.is_empty() {
                return Ok(0);
            }

            if self.pos == self.buf.len() {
                self.buf.clear();
                self.pos = 0;
            }
            self.fill(buf.len())?;

            let available = &self.buf[self.pos..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl CoderReader for AesReader {
        fn set_password(&mut self, password: &Password) -> Result<bool> {
            let key = derive_key(password, self.props.cycles, &self.props.salt)?;
            self.cipher = Some(Aes256CbcDec::new(
                GenericArray::from_slice(&key),
                GenericArray::from_slice(&self.props.iv),
            ));
            Ok(true)
        }
    }

    /// Builds an AES decoder. The cipher stays uninitialized until the
    /// folder engine supplies a password.
    pub(crate) fn new_reader(
        properties: &[u8],
        _size: u64,
        inputs: Vec<CoderInput>,
    ) -> Result<Box<dyn CoderReader>> {
        let inner = expect_single(inputs, "aes")?;
        let props = AesProperties::parse(properties)?;

        Ok(Box::new(AesReader {
            inner,
            props,
            cipher: None,
            buf: Vec::new(),
            pos: 0,
            exhausted: false,
        }))
    }

}
