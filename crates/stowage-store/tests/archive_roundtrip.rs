//! Integration tests for the storage root and archive engine.
//!
//! Covers write-then-read of containers (stored and compressed), object
//! entries, session protocol errors, extraction layout, traversal
//! rejection and streamed extraction with cancellation.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::json;
use stowage_store::{
    extract_stream, CancellationToken, Compression, EntryPayload, Existence, ExtractOptions,
    SessionState, StorageRoot, StoreError,
};
use tempfile::TempDir;

fn create_test_root() -> (StorageRoot, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = StorageRoot::new(temp_dir.path().join("sandbox")).expect("failed to open root");
    (root, temp_dir)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    title: String,
    version: u32,
    chapters: Vec<Chapter>,
    meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Chapter {
    id: u32,
    pages: Vec<String>,
}

fn sample_manifest() -> Manifest {
    Manifest {
        title: "Field guide".to_string(),
        version: 3,
        chapters: vec![
            Chapter {
                id: 1,
                pages: vec!["intro.txt".to_string(), "birds.txt".to_string()],
            },
            Chapter {
                id: 2,
                pages: vec![],
            },
        ],
        meta: BTreeMap::from([("lang".to_string(), "en".to_string())]),
    }
}

#[test]
fn test_hello_and_data_scenario() {
    let (root, _temp_dir) = create_test_root();

    let mut session = root.write_session();
    session.begin("out.zip").unwrap();
    session
        .write_entry("hello.txt", EntryPayload::Bytes(b"hi"), Compression::Stored)
        .unwrap();
    session
        .write_entry(
            "data.json",
            EntryPayload::Object(&json!({"x": 1})),
            Compression::Deflated,
        )
        .unwrap();
    let finalized = session.finalize().unwrap();
    assert_eq!(finalized.entries, 2);

    let mut reader = root.open_archive("out.zip").unwrap();
    assert_eq!(reader.entry_names(), vec!["hello.txt", "data.json"]);

    let hello = reader.entry("hello.txt").unwrap();
    assert_eq!(hello.size, 2);
    assert!(!hello.compressed);
    assert!(reader.entry("data.json").unwrap().compressed);

    assert_eq!(reader.read_entry("hello.txt").unwrap(), b"hi");
    let data: serde_json::Value = reader.read_object("data.json").unwrap();
    assert_eq!(data, json!({"x": 1}));
}

#[test]
fn test_binary_roundtrip_both_compressions() {
    let (root, _temp_dir) = create_test_root();
    // Crosses several 4096-byte chunks and is not a chunk multiple.
    let payload: Vec<u8> = (0..50_001u32).map(|i| (i * 31 % 256) as u8).collect();

    let mut session = root.write_session();
    session.begin("bin.zip").unwrap();
    session
        .write_entry("raw.bin", EntryPayload::Bytes(&payload), Compression::Stored)
        .unwrap();
    session
        .write_entry("packed.bin", EntryPayload::Bytes(&payload), Compression::Deflated)
        .unwrap();
    session
        .write_entry("empty.bin", EntryPayload::Bytes(&[]), Compression::Deflated)
        .unwrap();
    session.finalize().unwrap();

    let mut reader = root.open_archive("bin.zip").unwrap();
    assert_eq!(reader.read_entry("raw.bin").unwrap(), payload);
    assert_eq!(reader.read_entry("packed.bin").unwrap(), payload);
    assert!(reader.read_entry("empty.bin").unwrap().is_empty());

    let raw = reader.entry("raw.bin").unwrap();
    assert_eq!(raw.compressed_size, raw.size);
}

#[test]
fn test_nested_object_roundtrip() {
    let (root, _temp_dir) = create_test_root();
    let manifest = sample_manifest();

    let mut session = root.write_session();
    session.begin("book.zip").unwrap();
    session
        .write_object("manifest.json", &manifest, Compression::Deflated)
        .unwrap();
    session.finalize().unwrap();

    let mut reader = root.open_archive("book.zip").unwrap();
    let loaded: Manifest = reader.read_object("manifest.json").unwrap();
    assert_eq!(loaded, manifest);

    // Valid JSON of the wrong shape.
    let err = reader.read_object::<Vec<u32>>("manifest.json").unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
}

#[test]
fn test_standalone_object_file_roundtrip() {
    let (root, _temp_dir) = create_test_root();
    let manifest = sample_manifest();

    root.save_object("state/manifest.json", &manifest).unwrap();
    assert!(root.is_file("state/manifest.json").unwrap());

    let loaded: Manifest = root.load_object("state/manifest.json").unwrap();
    assert_eq!(loaded, manifest);
}

#[test]
fn test_session_protocol_errors() {
    let (root, _temp_dir) = create_test_root();
    let mut session = root.write_session();

    session.begin("p.zip").unwrap();
    session.finalize().unwrap();

    let err = session
        .write_entry("late.txt", EntryPayload::Bytes(b"x"), Compression::Stored)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidSessionState { .. }));

    let err = session.finalize().unwrap_err();
    assert!(matches!(err, StoreError::InvalidSessionState { .. }));

    // The same instance may start again.
    session.begin("p2.zip").unwrap();
    assert_eq!(session.state(), SessionState::Open);
    let mut other = root.write_session();
    let err = other.begin("p3.zip").unwrap_err();
    assert!(matches!(err, StoreError::InvalidSessionState { .. }));
    session.finalize().unwrap();
}

#[test]
fn test_extract_recreates_folders() {
    let (root, _temp_dir) = create_test_root();

    let mut session = root.write_session();
    session.begin("bundles/content.zip").unwrap();
    session
        .write_entry("a/b/c.txt", EntryPayload::Bytes(b"deep"), Compression::Deflated)
        .unwrap();
    session
        .write_entry("d.txt", EntryPayload::Bytes(b"top"), Compression::Stored)
        .unwrap();
    session.finalize().unwrap();

    assert_eq!(
        root.list_archives("bundles").unwrap(),
        vec!["content.zip".to_string()]
    );

    let summary = root.extract_archive("bundles/content.zip", "X").unwrap();
    assert_eq!(summary.files, 2);
    assert_eq!(summary.bytes, 7);

    assert_eq!(root.exists("X/a").unwrap(), Existence::Folder);
    assert_eq!(root.exists("X/a/b").unwrap(), Existence::Folder);
    assert_eq!(root.exists("X/a/b/c.txt").unwrap(), Existence::File);
    assert_eq!(root.exists("X/d.txt").unwrap(), Existence::File);

    let mut text = String::new();
    root.open_file("X/a/b/c.txt")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "deep");
}

#[test]
fn test_extract_rejects_traversal_entry() {
    let (root, temp_dir) = create_test_root();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("../../escape.txt", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(b"out").unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut file = root.create_file("hostile.zip").unwrap();
    file.write_all(&bytes).unwrap();
    drop(file);

    let err = root.extract_archive("hostile.zip", "X").unwrap_err();
    assert!(matches!(err, StoreError::InvalidPath { .. }));
    assert!(!temp_dir.path().join("escape.txt").exists());
    assert!(!temp_dir.path().join("sandbox").join("escape.txt").exists());
}

#[test]
fn test_streamed_extraction_and_cancellation() {
    let (root, _temp_dir) = create_test_root();

    let mut session = root.write_session();
    session.begin("s.zip").unwrap();
    for i in 0..5 {
        session
            .write_entry(
                &format!("part-{}.txt", i),
                EntryPayload::Bytes(format!("part {}", i).as_bytes()),
                Compression::Deflated,
            )
            .unwrap();
    }
    session.finalize().unwrap();

    let summary = extract_stream(
        root.open_file("s.zip").unwrap(),
        &root,
        "streamed",
        &ExtractOptions::default(),
    )
    .unwrap();
    assert_eq!(summary.files, 5);
    assert_eq!(root.list_files("streamed", &Default::default()).unwrap().len(), 5);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = extract_stream(
        root.open_file("s.zip").unwrap(),
        &root,
        "cancelled",
        &ExtractOptions::default().with_cancel(cancel),
    )
    .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(root.exists("cancelled").unwrap(), Existence::None);
}

#[test]
fn test_paths_outside_root_rejected_everywhere() {
    let (root, _temp_dir) = create_test_root();

    assert!(matches!(
        root.create_file("../outside.txt").unwrap_err(),
        StoreError::InvalidPath { .. }
    ));
    assert!(matches!(
        root.open_archive("/etc/passwd").unwrap_err(),
        StoreError::InvalidPath { .. }
    ));
    let mut session = root.write_session();
    assert!(matches!(
        session.begin("../out.zip").unwrap_err(),
        StoreError::InvalidPath { .. }
    ));
    assert_eq!(session.state(), SessionState::Closed);
}
