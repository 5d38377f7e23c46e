use std::collections::BTreeMap;

use mdex_cache::{CacheError, FORMAT_VERSION, decode, encode};
use mdex_mdict::MdictFile;
use mdex_mdict::testing::MdxBuilder;
use mdex_types::{
    BlockMeta, ByteRange, DictionaryKind, DictionarySnapshot, EncryptionParams, HeaderMeta,
    KeyTermEntry, SectionLayout, SnapshotMeta,
};

fn handmade_snapshot() -> DictionarySnapshot {
    let mut attributes = BTreeMap::new();
    attributes.insert("Title".to_string(), "Handmade".to_string());
    attributes.insert("Encrypted".to_string(), "1".to_string());

    DictionarySnapshot {
        meta: SnapshotMeta {
            kind: DictionaryKind::Mdd,
            format_version: 2,
            header: HeaderMeta {
                engine_version: "2.0".into(),
                title: "Handmade".into(),
                description: Some("with <html> & quotes \"".into()),
                stylesheet: None,
                encoding: "UTF-16LE".into(),
                attributes,
            },
            encryption: EncryptionParams {
                encrypt_record_blocks: true,
                encrypt_key_index: false,
                master_key: Some([7u8; 16]),
            },
            sections: SectionLayout {
                header: ByteRange::new(0, 100),
                key_info: ByteRange::new(100, 144),
                key_index: ByteRange::new(144, 200),
                key_blocks: ByteRange::new(200, 300),
                record_info: ByteRange::new(300, 332),
                record_index: ByteRange::new(332, 348),
                record_blocks: ByteRange::new(348, 9000),
            },
            key_blocks: vec![BlockMeta {
                compressed_size: 100,
                decompressed_size: 180,
                file_offset: 200,
                decompressed_offset: 0,
            }],
            record_blocks: vec![BlockMeta {
                compressed_size: 8652,
                decompressed_size: u64::MAX / 2,
                file_offset: 348,
                decompressed_offset: 0,
            }],
            // Deliberately inconsistent with the term list
            num_entries: 99,
            total_record_size: u64::MAX / 2,
        },
        terms: vec![
            KeyTermEntry {
                text: "\\b.png".into(),
                record_start: 0,
                record_end: 10,
                block_index: 0,
            },
            KeyTermEntry {
                text: "\\a.png".into(),
                record_start: 10,
                record_end: u64::MAX / 2,
                block_index: 0,
            },
        ],
    }
}

#[test]
fn test_handmade_snapshot_round_trips() {
    let snapshot = handmade_snapshot();
    let bytes = encode(&snapshot).unwrap();
    assert_eq!(&bytes[0..4], b"MDXC");
    assert_eq!(decode(&bytes).unwrap(), snapshot);
}

#[test]
fn test_parsed_dictionary_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fruit.mdx");
    MdxBuilder::new()
        .entry("apple", "a pome")
        .entry("application", "applying")
        .entry("banana", "yellow")
        .entries_per_block(2)
        .write_to(&path)
        .unwrap();

    let dict = MdictFile::open(&path, DictionaryKind::Mdx, None).unwrap();
    let restored = decode(&encode(dict.snapshot()).unwrap()).unwrap();
    assert_eq!(&restored, dict.snapshot());

    let attached = MdictFile::attach(restored, &path).unwrap();
    assert_eq!(
        attached.lookup_all("banana").unwrap()[0].definition.as_deref(),
        Some("yellow")
    );
}

#[test]
fn test_every_flipped_byte_is_rejected() {
    let bytes = encode(&handmade_snapshot()).unwrap();
    for i in 0..bytes.len() {
        let mut corrupt = bytes.clone();
        corrupt[i] ^= 0x5a;
        let err = decode(&corrupt).unwrap_err();
        assert!(err.is_corrupt(), "byte {i}: {err}");
    }
}

#[test]
fn test_truncation_is_rejected() {
    let bytes = encode(&handmade_snapshot()).unwrap();
    for len in [0, 3, 9, bytes.len() / 2, bytes.len() - 1] {
        assert!(decode(&bytes[..len]).is_err(), "length {len}");
    }
}

#[test]
fn test_future_version_is_rejected() {
    let mut bytes = encode(&handmade_snapshot()).unwrap();
    bytes[4..6].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
    assert!(matches!(
        decode(&bytes),
        Err(CacheError::UnsupportedVersion(v)) if v == FORMAT_VERSION + 1
    ));
}
