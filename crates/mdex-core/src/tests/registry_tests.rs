use std::fs;
use std::sync::Arc;
use std::thread;

use mdex_mdict::testing::MdxBuilder;
use mdex_types::DictionaryKind;

use crate::{MdexError, Registry, Storage};

fn registry_with_fruit() -> (tempfile::TempDir, Registry) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());
    storage.ensure_layout().unwrap();

    let record = storage.record("fruit", DictionaryKind::Mdx);
    MdxBuilder::new()
        .entry("apple", "a pome")
        .entry("banana", "yellow")
        .write_to(&record.source_path)
        .unwrap();

    (dir, Registry::new(storage, None))
}

#[test]
fn test_get_returns_the_loaded_instance() {
    let (_dir, registry) = registry_with_fruit();

    let first = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    let second = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.loaded_count(), 1);
}

#[test]
fn test_concurrent_gets_share_one_handle() {
    let (_dir, registry) = registry_with_fruit();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.get("fruit", DictionaryKind::Mdx).unwrap())
        })
        .collect();
    let dicts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(dicts.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn test_get_prefers_cache_and_survives_corruption() {
    let (_dir, registry) = registry_with_fruit();
    let record = registry.storage().record("fruit", DictionaryKind::Mdx);

    let parsed = registry.parse_fresh("fruit", DictionaryKind::Mdx).unwrap();
    let expected = parsed.lookup_all("apple").unwrap();
    registry
        .storage()
        .write_cache(&record, &mdex_cache::encode(parsed.snapshot()).unwrap())
        .unwrap();
    registry.close("fruit");
    assert!(!parsed.is_open());

    let cached = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    assert_eq!(cached.lookup_all("apple").unwrap(), expected);
    registry.close("fruit");

    let mut bytes = fs::read(&record.cache_path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xff;
    fs::write(&record.cache_path, &bytes).unwrap();

    let reparsed = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    assert_eq!(reparsed.lookup_all("apple").unwrap(), expected);
}

#[test]
fn test_cache_of_wrong_kind_is_ignored() {
    let (_dir, registry) = registry_with_fruit();
    let storage = registry.storage();
    let mdx = storage.record("fruit", DictionaryKind::Mdx);

    let mut snapshot = registry
        .parse_fresh("fruit", DictionaryKind::Mdx)
        .unwrap()
        .snapshot()
        .clone();
    snapshot.meta.kind = DictionaryKind::Mdd;
    storage
        .write_cache(&mdx, &mdex_cache::encode(&snapshot).unwrap())
        .unwrap();
    registry.close("fruit");

    let dict = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    assert_eq!(dict.kind(), DictionaryKind::Mdx);
}

#[test]
fn test_close_is_idempotent() {
    let (_dir, registry) = registry_with_fruit();
    registry.close("fruit");

    let dict = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    registry.close("fruit");
    registry.close("fruit");
    assert!(!dict.is_open());
    assert!(!registry.is_loaded("fruit", DictionaryKind::Mdx));
}

#[test]
fn test_remove_twice_leaves_nothing() {
    let (_dir, registry) = registry_with_fruit();
    let record = registry.storage().record("fruit", DictionaryKind::Mdx);
    registry.get("fruit", DictionaryKind::Mdx).unwrap();
    registry.storage().write_cache(&record, b"stale").unwrap();

    registry.remove("fruit").unwrap();
    assert!(!record.source_path.exists());
    assert!(!record.cache_path.exists());
    registry.remove("fruit").unwrap();
    assert_eq!(registry.loaded_count(), 0);
}

#[test]
fn test_missing_source_is_io_error() {
    let (_dir, registry) = registry_with_fruit();
    assert!(matches!(
        registry.get("absent", DictionaryKind::Mdx),
        Err(MdexError::Io(_))
    ));
    assert!(!registry.is_loaded("absent", DictionaryKind::Mdx));
}

#[test]
fn test_invalid_id_is_rejected() {
    let (_dir, registry) = registry_with_fruit();
    assert!(matches!(
        registry.get("../fruit", DictionaryKind::Mdx),
        Err(MdexError::InvalidId(_))
    ));
}

#[test]
fn test_shutdown_closes_everything() {
    let (_dir, registry) = registry_with_fruit();
    let dict = registry.get("fruit", DictionaryKind::Mdx).unwrap();
    registry.shutdown();
    assert!(!dict.is_open());
    assert_eq!(registry.loaded_count(), 0);
}
