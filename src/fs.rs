//! Filesystem-style view over an archive.
//!
//! Member names are cleaned into valid slash-separated paths, duplicates
//! are flagged, and a directory entry is synthesized for every ancestor
//! of every member, so the archive can be walked like a read-only tree.
//! The index is sorted by (parent directory, base name) and looked up by
//! binary search; a directory's children are one contiguous range.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::format::files::FileHeader;
use crate::read::{ArchiveCore, FileReader, FileRecord, open_record};
use crate::{Error, Result};

/// One entry of the path index.
pub(crate) struct FileListEntry {
    /// Cleaned path, no leading or trailing slash.
    pub(crate) name: String,
    /// Index of the backing member, absent for synthesized directories.
    pub(crate) file: Option<usize>,
    pub(crate) is_dir: bool,
    pub(crate) is_dup: bool,
}

/// Result of a path-based open: a member's content or a directory
/// listing handle.
pub enum Node<'a, R> {
    /// A regular member, opened for reading.
    File(FileReader<R>),
    /// A directory, real or synthesized.
    Dir(Dir<'a, R>),
}

/// A directory handle supporting enumeration.
pub struct Dir<'a, R> {
    core: &'a Arc<ArchiveCore<R>>,
    name: String,
    children: &'a [FileListEntry],
}

impl<'a, R> Dir<'a, R> {
    /// The directory's base name (`"."` for the root).
    pub fn name(&self) -> &str {
        split(&self.name).1
    }

    /// The directory's full path within the archive.
    pub fn path(&self) -> &str {
        &self.name
    }

    /// Enumerates the directory's immediate children in name order.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateEntry`] when a child path appears more than once
    /// in the archive.
    pub fn read_dir(&self) -> Result<Vec<DirEntry<'a>>> {
        self.children
            .iter()
            .map(|entry| {
                if entry.is_dup {
                    return Err(Error::DuplicateEntry {
                        path: entry.name.clone(),
                    });
                }
                Ok(DirEntry {
                    name: split(&entry.name).1,
                    path: entry.name.as_str(),
                    is_dir: entry.is_dir,
                    header: entry.file.map(|i| &self.core.records[i].header),
                })
            })
            .collect()
    }
}

/// One child produced by [`Dir::read_dir`].
pub struct DirEntry<'a> {
    name: &'a str,
    path: &'a str,
    is_dir: bool,
    header: Option<&'a FileHeader>,
}

impl<'a> DirEntry<'a> {
    /// The entry's base name.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The entry's full path within the archive.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Returns `true` for directories, real or synthesized.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// The backing member's metadata; `None` for synthesized directories.
    pub fn header(&self) -> Option<&'a FileHeader> {
        self.header
    }
}

/// Path-based open over the archive's index. See
/// [`Archive::open_path`](crate::Archive::open_path).
pub(crate) fn open_path<'a, R: Read + Seek + Send + 'static>(
    core: &'a Arc<ArchiveCore<R>>,
    name: &str,
) -> Result<Node<'a, R>> {
    let list = core
        .file_list
        .get_or_init(|| build_file_list(&core.records));

    if !valid_path(name) {
        return Err(Error::NotFound { path: name.into() });
    }

    if name == "." {
        return Ok(Node::Dir(Dir {
            core,
            name: ".".into(),
            children: read_dir_range(list, "."),
        }));
    }

    let entry = lookup(list, name).ok_or_else(|| Error::NotFound { path: name.into() })?;

    if entry.is_dir {
        return Ok(Node::Dir(Dir {
            core,
            name: entry.name.clone(),
            children: read_dir_range(list, name),
        }));
    }

    let index = entry
        .file
        .expect("non-directory entries always have a backing member");
    Ok(Node::File(open_record(core, index)?))
}

/// Port of `fs.ValidPath` semantics: unrooted, slash-separated, no empty
/// or dot components; `"."` names the root itself.
fn valid_path(name: &str) -> bool {
    if name == "." {
        return true;
    }
    if name.is_empty() {
        return false;
    }
    name.split('/')
        .all(|elem| !elem.is_empty() && elem != "." && elem != "..")
}

/// Cleans an archive member name into an index path: backslashes become
/// slashes, dot and dot-dot components are resolved, leading slashes and
/// any traversal above the root are stripped. Returns an empty string
/// for names that clean away to nothing.
fn to_valid_name(name: &str) -> String {
    let name = name.replace('\\', "/");

    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }

    parts.join("/")
}

/// Splits a path into (parent directory, base name), where top-level
/// names have parent `"."`.
pub(crate) fn split(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (".", name),
    }
}

/// Builds the sorted path index from the archive's member records.
pub(crate) fn build_file_list(records: &[FileRecord]) -> Vec<FileListEntry> {
    let mut files: HashMap<String, usize> = HashMap::new();
    let mut known_dirs: HashMap<String, usize> = HashMap::new();
    let mut ancestors: BTreeSet<String> = BTreeSet::new();

    let mut list: Vec<FileListEntry> = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let is_dir = record.header.is_dir();

        let name = to_valid_name(&record.header.name);
        if name.is_empty() {
            continue;
        }

        // The first occurrence of a path is served; later occurrences
        // flag it as duplicated, which makes stat fail.
        if let Some(&i) = files.get(&name) {
            list[i].is_dup = true;
            continue;
        }
        if let Some(&i) = known_dirs.get(&name) {
            list[i].is_dup = true;
            continue;
        }

        let (mut dir, _) = split(&name);
        while dir != "." {
            ancestors.insert(dir.to_string());
            dir = split(dir).0;
        }

        let entry_index = list.len();
        list.push(FileListEntry {
            name: name.clone(),
            file: Some(index),
            is_dir,
            is_dup: false,
        });

        if is_dir {
            known_dirs.insert(name, entry_index);
        } else {
            files.insert(name, entry_index);
        }
    }

    for dir in ancestors {
        if known_dirs.contains_key(&dir) {
            continue;
        }
        if let Some(&i) = files.get(&dir) {
            // A file and a directory share the path.
            list[i].is_dup = true;
        } else {
            list.push(FileListEntry {
                name: dir,
                file: None,
                is_dir: true,
                is_dup: false,
            });
        }
    }

    list.sort_by(|a, b| split(&a.name).cmp(&split(&b.name)));
    list
}

/// Binary-search lookup by exact path.
pub(crate) fn lookup<'a>(list: &'a [FileListEntry], name: &str) -> Option<&'a FileListEntry> {
    let target = split(name);
    let i = list.partition_point(|e| split(&e.name) < target);
    list.get(i).filter(|e| e.name == name)
}

/// The contiguous range of entries whose parent is `dir`.
pub(crate) fn read_dir_range<'a>(list: &'a [FileListEntry], dir: &str) -> &'a [FileListEntry] {
    let i = list.partition_point(|e| split(&e.name).0 < dir);
    let j = list.partition_point(|e| split(&e.name).0 <= dir);
    &list[i..j]
}
