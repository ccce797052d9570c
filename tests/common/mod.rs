//! Shared test utilities for integration tests.
//!
//! The read path is exercised against archives fabricated here byte by
//! byte: store-format (Copy codec) folders, solid multi-file folders,
//! AES-encrypted folders, and encrypted headers. Building archives in
//! code keeps the integration suite independent of binary fixtures.
//!
//! Note: `#![allow(dead_code)]` is required because each integration
//! test file compiles as a separate crate and may only use a subset of
//! these helpers.

#![allow(dead_code)]

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// Property ids used while encoding headers.
const K_END: u8 = 0x00;
const K_HEADER: u8 = 0x01;
const K_MAIN_STREAMS_INFO: u8 = 0x04;
const K_FILES_INFO: u8 = 0x05;
const K_PACK_INFO: u8 = 0x06;
const K_UNPACK_INFO: u8 = 0x07;
const K_SUBSTREAMS_INFO: u8 = 0x08;
const K_SIZE: u8 = 0x09;
const K_CRC: u8 = 0x0A;
const K_FOLDER: u8 = 0x0B;
const K_CODERS_UNPACK_SIZE: u8 = 0x0C;
const K_NUM_UNPACK_STREAM: u8 = 0x0D;
const K_EMPTY_STREAM: u8 = 0x0E;
const K_EMPTY_FILE: u8 = 0x0F;
const K_NAME: u8 = 0x11;
const K_ENCODED_HEADER: u8 = 0x17;

const SIGNATURE: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

const AES_METHOD_ID: [u8; 4] = [0x06, 0xF1, 0x07, 0x01];

/// Writes a 7-zip packed u64.
fn packed(buf: &mut Vec<u8>, value: u64) {
    if value < 0x80 {
        buf.push(value as u8);
        return;
    }

    let mut first = 0u8;
    let mut mask = 0x80u8;
    let mut trailing = 0usize;
    for i in 0..8 {
        if value < (1u64 << (7 - i)) << (8 * i) {
            first |= (value >> (8 * i)) as u8;
            trailing = i;
            break;
        }
        first |= mask;
        mask >>= 1;
        trailing = i + 1;
    }

    buf.push(first);
    buf.extend_from_slice(&value.to_le_bytes()[..trailing]);
}

fn utf16(buf: &mut Vec<u8>, s: &str) {
    for c in s.encode_utf16() {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    buf.extend_from_slice(&[0, 0]);
}

/// A bit vector written MSB first.
fn bit_vector(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bytes
}

/// Parameters of an AES-encrypted folder or header.
#[cfg(feature = "aes")]
#[derive(Clone)]
pub struct Encryption {
    pub password: String,
    pub cycles: u8,
    pub salt: Vec<u8>,
    pub iv: [u8; 16],
}

#[cfg(feature = "aes")]
impl Encryption {
    pub fn with_password(password: &str) -> Self {
        Self {
            password: password.to_string(),
            cycles: 6,
            salt: vec![0x10, 0x20, 0x30, 0x40],
            iv: [0x55; 16],
        }
    }

    fn properties(&self) -> Vec<u8> {
        let mut props = vec![
            0xC0 | self.cycles,
            (((self.salt.len() - 1) as u8) << 4) | 0x0F,
        ];
        props.extend_from_slice(&self.salt);
        props.extend_from_slice(&self.iv);
        props
    }

    /// AES-256-CBC encryption of `plain`, zero-padded to whole blocks.
    fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        use aes::cipher::generic_array::GenericArray;
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};

        let key = heptazip::crypto::derive_key(
            &heptazip::Password::new(self.password.as_str()),
            self.cycles,
            &self.salt,
        )
        .expect("test parameters are valid");

        let mut data = plain.to_vec();
        data.resize(plain.len().div_ceil(16) * 16, 0);

        let mut enc = cbc::Encryptor::<aes::Aes256>::new(
            GenericArray::from_slice(&key),
            GenericArray::from_slice(&self.iv),
        );
        for block in data.chunks_mut(16) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        data
    }
}

/// The single coder of a built folder.
enum CoderDesc {
    Copy,
    /// AES-256 with the given coder properties.
    Aes(Vec<u8>),
}

/// One folder of the archive being built: its files, its (possibly
/// encrypted) packed bytes, and its coder.
struct FolderSpec {
    files: Vec<(String, Vec<u8>)>,
    packed: Vec<u8>,
    coder: CoderDesc,
}

impl FolderSpec {
    fn plain_len(&self) -> u64 {
        self.files.iter().map(|(_, d)| d.len() as u64).sum()
    }
}

fn collect_files(files: &[(&str, &[u8])]) -> (Vec<(String, Vec<u8>)>, Vec<u8>) {
    let owned: Vec<(String, Vec<u8>)> = files
        .iter()
        .map(|(n, d)| (n.to_string(), d.to_vec()))
        .collect();
    let mut plain = Vec::new();
    for (_, data) in &owned {
        plain.extend_from_slice(data);
    }
    (owned, plain)
}

/// Builds archives in the store format (Copy codec, optionally wrapped
/// in AES), with control over the details the tests need to poke at.
#[derive(Default)]
pub struct ArchiveBuilder {
    folders: Vec<FolderSpec>,
    dirs: Vec<String>,
    empty_files: Vec<String>,
    sfx_stub: Vec<u8>,
    trailing_byte: bool,
    #[cfg(feature = "aes")]
    header_encryption: Option<Encryption>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a folder holding the given files. More than one file makes
    /// the folder solid.
    pub fn folder(mut self, files: &[(&str, &[u8])]) -> Self {
        let (files, plain) = collect_files(files);
        self.folders.push(FolderSpec {
            files,
            packed: plain,
            coder: CoderDesc::Copy,
        });
        self
    }

    /// Adds an AES-encrypted folder (stored, not compressed).
    #[cfg(feature = "aes")]
    pub fn encrypted_folder(mut self, files: &[(&str, &[u8])], enc: Encryption) -> Self {
        let (files, plain) = collect_files(files);
        self.folders.push(FolderSpec {
            files,
            packed: enc.encrypt(&plain),
            coder: CoderDesc::Aes(enc.properties()),
        });
        self
    }

    /// Adds a directory entry.
    pub fn dir(mut self, name: &str) -> Self {
        self.dirs.push(name.to_string());
        self
    }

    /// Adds a zero-byte file entry.
    pub fn empty_file(mut self, name: &str) -> Self {
        self.empty_files.push(name.to_string());
        self
    }

    /// Prefixes the archive with a self-extracting stub.
    pub fn sfx_stub(mut self, stub: &[u8]) -> Self {
        self.sfx_stub = stub.to_vec();
        self
    }

    /// Appends a byte to the metadata blob (covered by its CRC), which a
    /// correct parser must reject as trailing data.
    pub fn trailing_byte(mut self) -> Self {
        self.trailing_byte = true;
        self
    }

    /// Encrypts the header (the `-mhe=on` layout): the real header is
    /// stored as an AES folder and the outer blob only describes it.
    #[cfg(feature = "aes")]
    pub fn encrypt_header(mut self, enc: Encryption) -> Self {
        self.header_encryption = Some(enc);
        self
    }

    fn coder_record(out: &mut Vec<u8>, coder: &CoderDesc) {
        match coder {
            CoderDesc::Copy => {
                packed(out, 1); // one coder
                out.push(0x01); // 1-byte id, simple, no properties
                out.push(0x00); // Copy
            }
            CoderDesc::Aes(props) => {
                packed(out, 1);
                out.push(0x24); // 4-byte id, simple, has properties
                out.extend_from_slice(&AES_METHOD_ID);
                packed(out, props.len() as u64);
                out.extend_from_slice(props);
            }
        }
    }

    fn streams_info(&self, pack_pos: u64) -> Vec<u8> {
        let mut out = Vec::new();

        out.push(K_PACK_INFO);
        packed(&mut out, pack_pos);
        packed(&mut out, self.folders.len() as u64);
        out.push(K_SIZE);
        for folder in &self.folders {
            packed(&mut out, folder.packed.len() as u64);
        }
        out.push(K_END);

        out.push(K_UNPACK_INFO);
        out.push(K_FOLDER);
        packed(&mut out, self.folders.len() as u64);
        out.push(0x00); // inline
        for folder in &self.folders {
            Self::coder_record(&mut out, &folder.coder);
        }
        out.push(K_CODERS_UNPACK_SIZE);
        for folder in &self.folders {
            packed(&mut out, folder.plain_len());
        }
        out.push(K_END);

        out.push(K_SUBSTREAMS_INFO);
        out.push(K_NUM_UNPACK_STREAM);
        for folder in &self.folders {
            packed(&mut out, folder.files.len() as u64);
        }
        out.push(K_SIZE);
        for folder in &self.folders {
            for (_, data) in &folder.files[..folder.files.len() - 1] {
                packed(&mut out, data.len() as u64);
            }
        }
        out.push(K_CRC);
        out.push(0x01); // all defined
        for folder in &self.folders {
            for (_, data) in &folder.files {
                out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
            }
        }
        out.push(K_END);

        out.push(K_END); // streams info
        out
    }

    fn files_info(&self) -> Vec<u8> {
        let stream_files: Vec<&(String, Vec<u8>)> =
            self.folders.iter().flat_map(|f| f.files.iter()).collect();
        let total = stream_files.len() + self.dirs.len() + self.empty_files.len();

        let mut out = Vec::new();
        out.push(K_FILES_INFO);
        packed(&mut out, total as u64);

        if !self.dirs.is_empty() || !self.empty_files.is_empty() {
            // Stream files first, then dirs, then empty files.
            let mut empty_stream_bits = vec![false; stream_files.len()];
            empty_stream_bits.extend(vec![true; self.dirs.len() + self.empty_files.len()]);
            let bits = bit_vector(&empty_stream_bits);

            out.push(K_EMPTY_STREAM);
            packed(&mut out, bits.len() as u64);
            out.extend_from_slice(&bits);

            if !self.empty_files.is_empty() {
                let mut empty_file_bits = vec![false; self.dirs.len()];
                empty_file_bits.extend(vec![true; self.empty_files.len()]);
                let bits = bit_vector(&empty_file_bits);

                out.push(K_EMPTY_FILE);
                packed(&mut out, bits.len() as u64);
                out.extend_from_slice(&bits);
            }
        }

        let mut names = vec![0x00u8]; // inline
        for (name, _) in &stream_files {
            utf16(&mut names, name);
        }
        for name in &self.dirs {
            utf16(&mut names, name);
        }
        for name in &self.empty_files {
            utf16(&mut names, name);
        }
        out.push(K_NAME);
        packed(&mut out, names.len() as u64);
        out.extend_from_slice(&names);

        out.push(K_END);
        out
    }

    fn plain_header(&self) -> Vec<u8> {
        let mut blob = vec![K_HEADER];
        if !self.folders.is_empty() {
            blob.push(K_MAIN_STREAMS_INFO);
            blob.extend_from_slice(&self.streams_info(0));
        }
        if !self.folders.is_empty() || !self.dirs.is_empty() || !self.empty_files.is_empty() {
            blob.extend_from_slice(&self.files_info());
        }
        blob.push(K_END);
        blob
    }

    /// Wraps the real header bytes as an AES-encrypted header folder and
    /// returns the outer blob describing it.
    #[cfg(feature = "aes")]
    fn encoded_header(body: &mut Vec<u8>, inner: &[u8], enc: &Encryption) -> Vec<u8> {
        let encrypted = enc.encrypt(inner);
        let header_pos = body.len() as u64;
        let header_crc = crc32fast::hash(inner);
        body.extend_from_slice(&encrypted);

        let props = enc.properties();
        let mut blob = vec![K_ENCODED_HEADER];
        blob.push(K_PACK_INFO);
        packed(&mut blob, header_pos);
        packed(&mut blob, 1);
        blob.push(K_SIZE);
        packed(&mut blob, encrypted.len() as u64);
        blob.push(K_END);

        blob.push(K_UNPACK_INFO);
        blob.push(K_FOLDER);
        packed(&mut blob, 1);
        blob.push(0x00);
        Self::coder_record(&mut blob, &CoderDesc::Aes(props));
        blob.push(K_CODERS_UNPACK_SIZE);
        packed(&mut blob, inner.len() as u64);
        blob.push(K_CRC);
        blob.push(0x01);
        blob.extend_from_slice(&header_crc.to_le_bytes());
        blob.push(K_END);

        blob.push(K_END);
        blob
    }

    /// Produces the archive bytes.
    pub fn build(self) -> Vec<u8> {
        let mut body: Vec<u8> = Vec::new();
        for folder in &self.folders {
            body.extend_from_slice(&folder.packed);
        }

        #[allow(unused_mut)]
        let mut blob = self.plain_header();

        #[cfg(feature = "aes")]
        if let Some(enc) = &self.header_encryption {
            blob = Self::encoded_header(&mut body, &blob, enc);
        }

        if self.trailing_byte {
            blob.push(0xA5);
        }

        let mut archive = self.sfx_stub.clone();
        archive.extend_from_slice(&SIGNATURE);
        archive.push(0x00); // major
        archive.push(0x04); // minor

        let mut start = Vec::new();
        start.extend_from_slice(&(body.len() as u64).to_le_bytes());
        start.extend_from_slice(&(blob.len() as u64).to_le_bytes());
        start.extend_from_slice(&crc32fast::hash(&blob).to_le_bytes());

        archive.extend_from_slice(&crc32fast::hash(&start).to_le_bytes());
        archive.extend_from_slice(&start);
        archive.extend_from_slice(&body);
        archive.extend_from_slice(&blob);
        archive
    }
}

/// A seekable source that counts the bytes read through it, for
/// observing how much of the archive a scenario actually touches.
pub struct CountingSource {
    inner: std::io::Cursor<Vec<u8>>,
    bytes_read: Arc<AtomicU64>,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> (Self, Arc<AtomicU64>) {
        let counter = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner: std::io::Cursor::new(data),
                bytes_read: Arc::clone(&counter),
            },
            counter,
        )
    }
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl Seek for CountingSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Reads a member to the end and returns its bytes.
pub fn extract<R: Read + Seek + Send + 'static>(
    file: &heptazip::File<'_, R>,
) -> heptazip::Result<Vec<u8>> {
    let mut reader = file.open()?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    reader.close()?;
    Ok(out)
}
