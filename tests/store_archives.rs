//! End-to-end behavior against fabricated store-format archives.

mod common;

use std::io::{Cursor, Read};
use std::sync::atomic::Ordering;

use common::{ArchiveBuilder, CountingSource, extract};
#[cfg(feature = "aes")]
use common::Encryption;
use heptazip::{Archive, Error, Node};

fn open(bytes: Vec<u8>) -> Archive<Cursor<Vec<u8>>> {
    let size = bytes.len() as u64;
    Archive::new(Cursor::new(bytes), size).expect("archive should open")
}

#[test]
fn enumerate_and_extract_single_file() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("hello.txt", b"hello, archive")])
        .build();
    let archive = open(bytes);

    assert_eq!(archive.len(), 1);
    let file = archive.files().next().unwrap();
    assert_eq!(file.header().name, "hello.txt");
    assert_eq!(file.header().uncompressed_size, 14);
    assert!(!file.header().is_dir());

    let contents = extract(&file).unwrap();
    assert_eq!(contents, b"hello, archive");
    assert_eq!(
        crc32fast::hash(&contents),
        file.header().crc32.expect("builder records CRCs")
    );
}

#[test]
fn crc_round_trip_across_folders() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("a.bin", &[0xAAu8; 900] as &[u8]), ("b.bin", &[0xBB; 300])])
        .folder(&[("c.bin", &[0xCC; 40])])
        .build();
    let archive = open(bytes);

    for file in archive.files() {
        let contents = extract(&file).unwrap();
        assert_eq!(contents.len() as u64, file.header().uncompressed_size);
        assert_eq!(crc32fast::hash(&contents), file.header().crc32.unwrap());
    }
}

#[test]
fn folder_offsets_are_cumulative() {
    let bytes = ArchiveBuilder::new()
        .folder(&[
            ("one", b"11111" as &[u8]),
            ("two", b"2222222"),
            ("three", b"333"),
        ])
        .build();
    let archive = open(bytes);

    // All three share one stream; offsets follow archive order.
    let files: Vec<_> = archive.files().collect();
    assert!(files.iter().all(|f| f.header().stream == 0));

    assert_eq!(extract(&files[0]).unwrap(), b"11111");
    assert_eq!(extract(&files[1]).unwrap(), b"2222222");
    assert_eq!(extract(&files[2]).unwrap(), b"333");
}

#[test]
fn solid_folder_sequential_extraction_decodes_once() {
    let a = vec![0x41u8; 3000];
    let b = vec![0x42u8; 3000];
    let c = vec![0x43u8; 3000];
    let bytes = ArchiveBuilder::new()
        .folder(&[("a", a.as_slice()), ("b", &b), ("c", &c)])
        .build();

    let (source, counter) = CountingSource::new(bytes.clone());
    let archive = Archive::new(source, bytes.len() as u64).unwrap();

    let after_open = counter.load(Ordering::Relaxed);
    for file in archive.files() {
        let contents = extract(&file).unwrap();
        assert_eq!(crc32fast::hash(&contents), file.header().crc32.unwrap());
    }
    let body_read = counter.load(Ordering::Relaxed) - after_open;

    // One decode pass over the 9000-byte folder: the pool hands each
    // reader the previous reader's pipeline.
    assert!(
        body_read <= 9000,
        "sequential extraction re-read the folder: {body_read} bytes"
    );
}

#[test]
fn solid_folder_reverse_extraction_works_but_re_decodes() {
    let a = vec![0x41u8; 3000];
    let b = vec![0x42u8; 3000];
    let c = vec![0x43u8; 3000];
    let bytes = ArchiveBuilder::new()
        .folder(&[("a", a.as_slice()), ("b", &b), ("c", &c)])
        .build();

    let (source, counter) = CountingSource::new(bytes.clone());
    let archive = Archive::new(source, bytes.len() as u64).unwrap();

    let after_open = counter.load(Ordering::Relaxed);
    let files: Vec<_> = archive.files().collect();
    let extracted: Vec<Vec<u8>> = files.iter().rev().map(|f| extract(f).unwrap()).collect();
    let body_read = counter.load(Ordering::Relaxed) - after_open;

    // Identical bytes...
    assert_eq!(extracted[0], c);
    assert_eq!(extracted[1], b);
    assert_eq!(extracted[2], a);
    // ...but out-of-order reads forfeit pipeline reuse.
    assert!(
        body_read > 9000,
        "reverse extraction unexpectedly reused pipelines: {body_read} bytes"
    );
}

#[test]
fn interleaved_readers_allocate_extra_pipelines() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("a", &[0x41u8; 2000] as &[u8]), ("b", &[0x42; 2000])])
        .build();
    let archive = open(bytes);

    let files: Vec<_> = archive.files().collect();

    // Both readers open simultaneously; each must see its own bytes.
    let mut ra = files[0].open().unwrap();
    let mut rb = files[1].open().unwrap();

    let mut buf_a = Vec::new();
    let mut buf_b = Vec::new();
    rb.read_to_end(&mut buf_b).unwrap();
    ra.read_to_end(&mut buf_a).unwrap();

    assert_eq!(buf_a, vec![0x41u8; 2000]);
    assert_eq!(buf_b, vec![0x42u8; 2000]);
}

#[test]
fn empty_archive_opens() {
    let bytes = ArchiveBuilder::new().build();
    let archive = open(bytes);
    assert!(archive.is_empty());
    assert_eq!(archive.files().len(), 0);
}

#[test]
fn dirs_and_empty_files_yield_zero_byte_readers() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("real.txt", b"content" as &[u8])])
        .dir("sub")
        .empty_file("sub/empty.dat")
        .build();
    let archive = open(bytes);

    let files: Vec<_> = archive.files().collect();
    assert_eq!(archive.len(), 3);

    let dir = files.iter().find(|f| f.header().name == "sub").unwrap();
    assert!(dir.header().is_dir());
    assert!(extract(dir).unwrap().is_empty());

    let empty = files
        .iter()
        .find(|f| f.header().name == "sub/empty.dat")
        .unwrap();
    assert!(!empty.header().is_dir());
    assert!(empty.header().is_empty_file());
    assert!(extract(empty).unwrap().is_empty());
}

#[test]
fn sfx_prefix_within_limit_opens() {
    let stub = vec![0x90u8; 4096]; // NOP sled standing in for an EXE stub
    let bytes = ArchiveBuilder::new()
        .folder(&[("payload.txt", b"after the stub" as &[u8])])
        .sfx_stub(&stub)
        .build();
    let archive = open(bytes);

    let file = archive.files().next().unwrap();
    assert_eq!(extract(&file).unwrap(), b"after the stub");
}

#[test]
fn sfx_prefix_beyond_limit_fails() {
    let stub = vec![0x90u8; (1 << 20) + 64];
    let bytes = ArchiveBuilder::new()
        .folder(&[("x", b"y" as &[u8])])
        .sfx_stub(&stub)
        .build();

    let size = bytes.len() as u64;
    let err = Archive::new(Cursor::new(bytes), size).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[test]
fn header_with_trailing_byte_fails() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("x", b"y" as &[u8])])
        .trailing_byte()
        .build();

    let size = bytes.len() as u64;
    let err = Archive::new(Cursor::new(bytes), size).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[test]
fn corrupted_metadata_blob_fails_checksum() {
    let mut bytes = ArchiveBuilder::new()
        .folder(&[("x", b"payload" as &[u8])])
        .build();

    // Flip a bit in the last byte, which lies inside the metadata blob.
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let size = bytes.len() as u64;
    let err = Archive::new(Cursor::new(bytes), size).unwrap_err();
    assert!(matches!(
        err,
        Error::ChecksumMismatch {
            scope: "header",
            ..
        }
    ));
}

#[test]
fn truncated_archive_fails() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("x", b"payload" as &[u8])])
        .build();

    let truncated = bytes[..bytes.len() - 4].to_vec();
    let size = truncated.len() as u64;
    let err = Archive::new(Cursor::new(truncated), size).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[test]
fn close_is_consuming_and_drop_is_equivalent() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("a", b"aaaa" as &[u8]), ("b", b"bbbb")])
        .build();
    let archive = open(bytes);
    let files: Vec<_> = archive.files().collect();

    // Explicit close.
    let mut reader = files[0].open().unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    reader.close().unwrap();

    // Drop without close must still recycle the pipeline.
    {
        let _reader = files[1].open().unwrap();
    }
    assert_eq!(extract(&files[1]).unwrap(), b"bbbb");
}

// ---------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------

#[cfg(feature = "aes")]
#[test]
fn encrypted_folder_round_trip() {
    let enc = Encryption::with_password("password");
    let bytes = ArchiveBuilder::new()
        .encrypted_folder(&[("secret.txt", b"the secret payload" as &[u8])], enc)
        .build();

    let size = bytes.len() as u64;
    let archive = Archive::with_password(Cursor::new(bytes), size, "password").unwrap();

    let file = archive.files().next().unwrap();
    let contents = extract(&file).unwrap();
    assert_eq!(contents, b"the secret payload");
    assert_eq!(crc32fast::hash(&contents), file.header().crc32.unwrap());
}

#[cfg(feature = "aes")]
#[test]
fn encrypted_folder_wrong_password_yields_garbage() {
    // Stored (uncompressed) encrypted data decrypts to garbage under a
    // wrong password with no decoder error; the CRC is the only tell.
    let enc = Encryption::with_password("password");
    let bytes = ArchiveBuilder::new()
        .encrypted_folder(&[("secret.txt", b"the secret payload" as &[u8])], enc)
        .build();

    let size = bytes.len() as u64;
    let archive = Archive::with_password(Cursor::new(bytes), size, "notpassword").unwrap();

    let file = archive.files().next().unwrap();
    let contents = extract(&file).unwrap();
    assert_eq!(contents.len(), 18);
    assert_ne!(contents, b"the secret payload");
    assert_ne!(crc32fast::hash(&contents), file.header().crc32.unwrap());
}

#[cfg(feature = "aes")]
#[test]
fn encrypted_header_opens_with_password() {
    let enc = Encryption::with_password("password");
    let bytes = ArchiveBuilder::new()
        .folder(&[("visible.txt", b"now you see me" as &[u8])])
        .encrypt_header(enc)
        .build();

    let size = bytes.len() as u64;
    let archive = Archive::with_password(Cursor::new(bytes), size, "password").unwrap();

    let file = archive.files().next().unwrap();
    assert_eq!(file.header().name, "visible.txt");
    assert_eq!(extract(&file).unwrap(), b"now you see me");
}

#[cfg(feature = "aes")]
#[test]
fn encrypted_header_wrong_password_reports_encrypted_read_error() {
    let enc = Encryption::with_password("password");
    let bytes = ArchiveBuilder::new()
        .folder(&[("visible.txt", b"now you see me" as &[u8])])
        .encrypt_header(enc)
        .build();

    let size = bytes.len() as u64;
    let err = Archive::with_password(Cursor::new(bytes), size, "notpassword").unwrap_err();

    // Garbage header bytes surface either as a checksum failure on the
    // decoded folder or as a read error flagged encrypted.
    match err {
        Error::Read { encrypted, .. } => assert!(encrypted),
        Error::ChecksumMismatch { scope, .. } => assert_eq!(scope, "encoded header"),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ---------------------------------------------------------------------
// Filesystem view
// ---------------------------------------------------------------------

#[test]
fn open_path_serves_files_and_dirs() {
    let bytes = ArchiveBuilder::new()
        .folder(&[
            ("docs/readme.md", b"# readme" as &[u8]),
            ("docs/guide.md", b"# guide"),
            ("top.txt", b"top"),
        ])
        .build();
    let archive = open(bytes);

    match archive.open_path("docs/readme.md").unwrap() {
        Node::File(mut reader) => {
            let mut contents = Vec::new();
            reader.read_to_end(&mut contents).unwrap();
            assert_eq!(contents, b"# readme");
        }
        Node::Dir(_) => panic!("expected a file"),
    }

    // "docs" exists only as a path prefix; it lists its two children.
    match archive.open_path("docs").unwrap() {
        Node::Dir(dir) => {
            let entries = dir.read_dir().unwrap();
            let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
            assert_eq!(names, vec!["guide.md", "readme.md"]);
            assert!(entries.iter().all(|e| !e.is_dir()));
        }
        Node::File(_) => panic!("expected a directory"),
    }

    match archive.open_path(".").unwrap() {
        Node::Dir(root) => {
            let names: Vec<String> = root
                .read_dir()
                .unwrap()
                .iter()
                .map(|e| e.name().to_string())
                .collect();
            assert_eq!(names, vec!["docs", "top.txt"]);
        }
        Node::File(_) => panic!("expected the root directory"),
    }
}

#[test]
fn open_path_rejects_invalid_and_missing() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("a.txt", b"a" as &[u8])])
        .build();
    let archive = open(bytes);

    assert!(matches!(
        archive.open_path("missing.txt"),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        archive.open_path("../escape"),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        archive.open_path("/a.txt"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn duplicate_paths_flagged_on_stat() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("dup.txt", b"first" as &[u8]), ("dup.txt", b"second")])
        .build();
    let archive = open(bytes);

    // The first entry's content is served...
    match archive.open_path("dup.txt").unwrap() {
        Node::File(mut reader) => {
            let mut contents = Vec::new();
            reader.read_to_end(&mut contents).unwrap();
            assert_eq!(contents, b"first");
        }
        Node::Dir(_) => panic!("expected a file"),
    }

    // ...but listing the parent fails the stat on the duplicate.
    match archive.open_path(".").unwrap() {
        Node::Dir(root) => {
            assert!(matches!(
                root.read_dir(),
                Err(Error::DuplicateEntry { .. })
            ));
        }
        Node::File(_) => panic!("expected the root directory"),
    }
}

#[test]
fn backslash_names_are_normalized() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("win\\style\\path.txt", b"x" as &[u8])])
        .build();
    let archive = open(bytes);

    assert_eq!(
        archive.files().next().unwrap().header().name,
        "win/style/path.txt"
    );
    assert!(matches!(
        archive.open_path("win/style/path.txt"),
        Ok(Node::File(_))
    ));
}

// ---------------------------------------------------------------------
// Volumes
// ---------------------------------------------------------------------

#[test]
fn split_volumes_reassemble() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(4000).collect();
    let bytes = ArchiveBuilder::new()
        .folder(&[("data.bin", payload.as_slice())])
        .build();

    // Slice the archive into six parts on disk.
    let dir = tempfile::tempdir().unwrap();
    let part_size = bytes.len().div_ceil(6);
    let mut names = Vec::new();
    for (i, chunk) in bytes.chunks(part_size).enumerate() {
        let path = dir.path().join(format!("split.7z.{:03}", i + 1));
        std::fs::write(&path, chunk).unwrap();
        names.push(path.display().to_string());
    }
    assert_eq!(names.len(), 6);

    let archive = heptazip::open_path(dir.path().join("split.7z.001")).unwrap();
    assert_eq!(archive.volumes(), names.as_slice());

    let file = archive.files().next().unwrap();
    assert_eq!(extract(&file).unwrap(), payload);
}

#[test]
fn volume_with_single_part() {
    let bytes = ArchiveBuilder::new()
        .folder(&[("solo.txt", b"solo" as &[u8])])
        .build();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("whole.7z");
    std::fs::write(&path, &bytes).unwrap();

    let archive = heptazip::open_path(&path).unwrap();
    assert_eq!(archive.volumes().len(), 1);
    assert_eq!(extract(&archive.files().next().unwrap()).unwrap(), b"solo");
}
