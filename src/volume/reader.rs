//! Composition of volume parts into one seekable source.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::FileOpener;
use crate::{Error, Result};

struct Part<F> {
    file: F,
    size: u64,
}

/// One logical byte source over a sequence of volume parts.
///
/// The logical size is the sum of the part sizes; reads cross part
/// boundaries transparently (one part per `read` call, so a boundary
/// read returns short, as `Read` permits).
pub struct MultiVolume<F> {
    parts: Vec<Part<F>>,
    names: Vec<String>,
    position: u64,
    size: u64,
}

impl<F> std::fmt::Debug for MultiVolume<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiVolume").finish_non_exhaustive()
    }
}

impl<F: Read + Seek + Send> MultiVolume<F> {
    /// Opens `path` and, when it ends in `.001`, every sequential part
    /// after it until the opener reports not-found. Returns the composed
    /// source and the part names in order.
    ///
    /// Any error other than not-found on a later part aborts the open;
    /// parts opened so far are released.
    pub(crate) fn open<O>(opener: &O, path: &Path) -> Result<(Self, Vec<String>)>
    where
        O: FileOpener<File = F> + ?Sized,
    {
        let (first, first_size) = opener.open(path).map_err(Error::Io)?;

        let mut parts = vec![Part {
            file: first,
            size: first_size,
        }];
        let mut names = vec![path.display().to_string()];

        let path_str = path.display().to_string();
        if let Some(base) = path_str.strip_suffix(".001") {
            for index in 2u32.. {
                let part_path = format!("{base}.{index:03}");
                match opener.open(Path::new(&part_path)) {
                    Ok((file, size)) => {
                        log::debug!("opened volume part {part_path} ({size} bytes)");
                        parts.push(Part { file, size });
                        names.push(part_path);
                    }
                    Err(e) if opener.is_not_found(&e) => break,
                    Err(e) => return Err(Error::Io(e)),
                }
            }
        }

        let size = parts.iter().map(|p| p.size).sum();
        let volume_names = names.clone();

        Ok((
            Self {
                parts,
                names,
                position: 0,
                size,
            },
            volume_names,
        ))
    }

    /// Total logical size across all parts.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Names of the parts, in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Maps the logical position to (part index, offset within part).
    fn locate(&self, position: u64) -> Option<(usize, u64)> {
        let mut remaining = position;
        for (i, part) in self.parts.iter().enumerate() {
            if remaining < part.size {
                return Some((i, remaining));
            }
            remaining -= part.size;
        }
        None
    }
}

impl<F: Read + Seek + Send> Read for MultiVolume<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        let (index, offset) = self
            .locate(self.position)
            .expect("position is below the total size");

        let part = &mut self.parts[index];
        part.file.seek(SeekFrom::Start(offset))?;

        let max = ((part.size - offset).min(buf.len() as u64)) as usize;
        let n = part.file.read(&mut buf[..max])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<F: Read + Seek + Send> Seek for MultiVolume<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of volume set",
            ));
        }

        // Seeking past the end is allowed; reads there return EOF.
        self.position = target as u64;
        Ok(self.position)
    }
}
