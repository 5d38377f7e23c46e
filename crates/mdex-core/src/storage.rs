use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mdex_types::{DictionaryKind, DictionaryRecord};
use tracing::debug;

use crate::error::MdexError;

const DICTIONARY_DIR: &str = "dictionaries";
const CACHE_DIR: &str = "cache";
const TRIE_FILE: &str = "terms.trie";

/// Managed layout: `dictionaries/<id>.<ext>`, `cache/<id>.<ext>.dat` and
/// `terms.trie` under one root
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dictionaries_dir(&self) -> PathBuf {
        self.root.join(DICTIONARY_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn trie_path(&self) -> PathBuf {
        self.root.join(TRIE_FILE)
    }

    pub fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.dictionaries_dir())?;
        fs::create_dir_all(self.cache_dir())
    }

    pub fn record(&self, id: &str, kind: DictionaryKind) -> DictionaryRecord {
        DictionaryRecord {
            id: id.to_string(),
            source_path: self
                .dictionaries_dir()
                .join(format!("{id}.{}", kind.extension())),
            cache_path: self
                .cache_dir()
                .join(format!("{id}.{}.dat", kind.extension())),
            kind,
        }
    }

    /// The managed copy for `id`, preferring the primary index
    pub fn find(&self, id: &str) -> Option<DictionaryRecord> {
        DictionaryKind::ALL
            .into_iter()
            .map(|kind| self.record(id, kind))
            .find(|record| record.source_path.is_file())
    }

    /// Every managed source copy, sorted by id then kind
    pub fn list(&self) -> Result<Vec<DictionaryRecord>, MdexError> {
        let entries = match fs::read_dir(self.dictionaries_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(kind) = DictionaryKind::from_path(&path) else {
                continue;
            };
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_id(id).is_ok() && path.is_file() {
                records.push(self.record(id, kind));
            }
        }
        records.sort_by(|a, b| {
            a.id
                .cmp(&b.id)
                .then_with(|| a.kind.extension().cmp(b.kind.extension()))
        });
        Ok(records)
    }

    /// Copy `source` into managed storage under `id`
    pub fn import(&self, id: &str, source: &Path) -> Result<DictionaryRecord, MdexError> {
        validate_id(id)?;
        let kind = DictionaryKind::from_path(source).ok_or_else(|| {
            MdexError::UnsupportedFormat(format!("{} is not an .mdx or .mdd file", source.display()))
        })?;
        self.ensure_layout()?;

        let record = self.record(id, kind);
        let mut input = File::open(source)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(self.dictionaries_dir())?;
        io::copy(&mut input, &mut temp_file)?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&record.source_path)
            .map_err(|e| MdexError::Io(e.error))?;

        debug!(id, from = %source.display(), to = %record.source_path.display(), "imported source");
        Ok(record)
    }

    /// Copy the current source and cache of `record` aside so a failed
    /// re-registration can put them back
    pub fn backup(&self, record: &DictionaryRecord) -> io::Result<Backup> {
        Ok(Backup {
            record: record.clone(),
            source: copy_aside(&record.source_path, &self.dictionaries_dir())?,
            cache: copy_aside(&record.cache_path, &self.cache_dir())?,
        })
    }

    pub fn read_cache(&self, record: &DictionaryRecord) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&record.cache_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write_cache(&self, record: &DictionaryRecord, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(self.cache_dir())?;
        let mut temp_file = tempfile::NamedTempFile::new_in(self.cache_dir())?;
        temp_file.write_all(bytes)?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&record.cache_path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn remove_cache(&self, record: &DictionaryRecord) -> io::Result<()> {
        remove_if_exists(&record.cache_path)
    }

    /// Delete the source copy and cache artifact. Missing files are fine.
    pub fn remove_files(&self, record: &DictionaryRecord) -> io::Result<()> {
        remove_if_exists(&record.source_path)?;
        remove_if_exists(&record.cache_path)
    }
}

/// Files of one record as they were before a registration attempt.
/// Dropping it discards the copies.
#[derive(Debug)]
pub struct Backup {
    record: DictionaryRecord,
    source: Option<tempfile::NamedTempFile>,
    cache: Option<tempfile::NamedTempFile>,
}

impl Backup {
    /// Whether the record had a source copy when the backup was taken
    pub fn existed(&self) -> bool {
        self.source.is_some()
    }

    /// Put every backed-up file back. Files that did not exist are removed.
    pub fn restore(self) -> io::Result<()> {
        restore_file(self.source, &self.record.source_path)?;
        restore_file(self.cache, &self.record.cache_path)?;
        debug!(id = %self.record.id, kind = %self.record.kind, "restored previous files");
        Ok(())
    }
}

fn copy_aside(path: &Path, dir: &Path) -> io::Result<Option<tempfile::NamedTempFile>> {
    let mut input = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    fs::create_dir_all(dir)?;
    let mut temp_file = tempfile::Builder::new()
        .prefix(".backup-")
        .tempfile_in(dir)?;
    io::copy(&mut input, &mut temp_file)?;
    temp_file.as_file().sync_all()?;
    Ok(Some(temp_file))
}

fn restore_file(saved: Option<tempfile::NamedTempFile>, path: &Path) -> io::Result<()> {
    match saved {
        Some(temp_file) => {
            temp_file.persist(path).map_err(|e| e.error)?;
            Ok(())
        }
        None => remove_if_exists(path),
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Ids become file names, so they must be a single plain path component
pub fn validate_id(id: &str) -> Result<(), MdexError> {
    let invalid = id.trim().is_empty()
        || id != id.trim()
        || id == "."
        || id == ".."
        || id.chars().any(|c| matches!(c, '/' | '\\' | '\0' | ':') || c.is_control());
    if invalid {
        return Err(MdexError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        for id in ["oxford", "Oxford 9th", "jp.daijirin", "日本語"] {
            assert!(validate_id(id).is_ok(), "{id}");
        }
        for id in ["", " ", "..", "a/b", "a\\b", " padded", "c:", "tab\t"] {
            assert!(
                matches!(validate_id(id), Err(MdexError::InvalidId(_))),
                "{id:?}"
            );
        }
    }

    #[test]
    fn test_layout_paths() {
        let storage = Storage::new("/data");
        let record = storage.record("oxford", DictionaryKind::Mdd);
        assert_eq!(
            record.source_path,
            PathBuf::from("/data/dictionaries/oxford.mdd")
        );
        assert_eq!(
            record.cache_path,
            PathBuf::from("/data/cache/oxford.mdd.dat")
        );
        assert_eq!(storage.trie_path(), PathBuf::from("/data/terms.trie"));
    }

    #[test]
    fn test_import_list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("root"));
        assert!(storage.list().unwrap().is_empty());

        let source = dir.path().join("Fruit.MDX");
        fs::write(&source, b"payload").unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, b"x").unwrap();

        let record = storage.import("fruit", &source).unwrap();
        assert_eq!(fs::read(&record.source_path).unwrap(), b"payload");
        assert!(matches!(
            storage.import("notes", &notes),
            Err(MdexError::UnsupportedFormat(_))
        ));
        storage.import("b-side", &source).unwrap();

        let ids: Vec<_> = storage.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["b-side", "fruit"]);
        assert_eq!(storage.find("fruit"), Some(record.clone()));

        storage.write_cache(&record, b"cache").unwrap();
        storage.remove_files(&record).unwrap();
        storage.remove_files(&record).unwrap();
        assert!(!record.source_path.exists());
        assert!(!record.cache_path.exists());
        assert_eq!(storage.find("fruit"), None);
    }

    #[test]
    fn test_backup_restores_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("root"));
        let source = dir.path().join("fruit.mdx");
        fs::write(&source, b"good").unwrap();
        let record = storage.import("fruit", &source).unwrap();
        storage.write_cache(&record, b"good cache").unwrap();

        let backup = storage.backup(&record).unwrap();
        assert!(backup.existed());
        fs::write(&source, b"broken").unwrap();
        storage.import("fruit", &source).unwrap();
        storage.remove_cache(&record).unwrap();

        backup.restore().unwrap();
        assert_eq!(fs::read(&record.source_path).unwrap(), b"good");
        assert_eq!(fs::read(&record.cache_path).unwrap(), b"good cache");
        let ids: Vec<_> = storage.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["fruit"]);
    }

    #[test]
    fn test_backup_of_new_record_restores_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("root"));
        let record = storage.record("fresh", DictionaryKind::Mdx);

        let backup = storage.backup(&record).unwrap();
        assert!(!backup.existed());
        let source = dir.path().join("fresh.mdx");
        fs::write(&source, b"new").unwrap();
        storage.import("fresh", &source).unwrap();
        storage.write_cache(&record, b"cache").unwrap();

        backup.restore().unwrap();
        assert!(!record.source_path.exists());
        assert!(!record.cache_path.exists());
    }
}
