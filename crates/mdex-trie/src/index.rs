use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec;
use crate::error::TrieError;
use crate::trie::Trie;

/// The process-wide trie bound to its persistence file.
///
/// The file is a derived artifact: a missing or unreadable file yields an
/// empty trie instead of an error.
#[derive(Debug)]
pub struct TrieIndex {
    path: PathBuf,
    trie: Trie,
}

impl TrieIndex {
    pub fn init(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let trie = load(&path);
        info!(path = %path.display(), terms = trie.len(), "trie index ready");
        Self { path, trie }
    }

    /// Re-read the persisted file, picking up terms another process saved
    pub fn reload(&mut self) {
        self.trie = load(&self.path);
        debug!(terms = self.trie.len(), "trie index reloaded");
    }

    /// Drop the in-memory structure. `reload` brings it back.
    pub fn shutdown(&mut self) {
        self.trie = Trie::new();
        debug!(path = %self.path.display(), "trie index shut down");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    pub fn insert(&mut self, term: &str) -> bool {
        self.trie.insert(term)
    }

    /// Insert every term, returning how many were new
    pub fn insert_all<I, S>(&mut self, terms: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        terms
            .into_iter()
            .filter(|term| self.trie.insert(term.as_ref()))
            .count()
    }

    pub fn search_prefix(&self, query: &str, limit: i64) -> Vec<String> {
        self.trie.search_prefix(query, limit)
    }

    pub fn save(&self) -> Result<(), TrieError> {
        save(&self.trie, &self.path)
    }

    /// Empty the trie in memory and on disk
    pub fn clear(&mut self) -> Result<(), TrieError> {
        self.trie = Trie::new();
        self.save()
    }
}

/// Read a trie file, treating absence and corruption as an empty trie
pub fn load(path: &Path) -> Trie {
    match try_load(path) {
        Ok(Some(trie)) => trie,
        Ok(None) => Trie::new(),
        Err(e) => {
            warn!(path = %path.display(), "discarding unreadable trie file: {e}");
            Trie::new()
        }
    }
}

/// Strict variant of [`load`]. `Ok(None)` when the file does not exist.
pub fn try_load(path: &Path) -> Result<Option<Trie>, TrieError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    codec::decode(&bytes).map(Some)
}

/// Persist through a temporary file in the same directory, then rename
pub fn save(trie: &Trie, path: &Path) -> Result<(), TrieError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(&codec::encode(trie))?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path)?;

    debug!(path = %path.display(), terms = trie.len(), "trie saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_init_restores_terms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("terms.trie");

        let mut index = TrieIndex::init(&path);
        assert!(index.is_empty());
        assert_eq!(index.insert_all(["apple", "application", "apple"]), 2);
        index.save().unwrap();

        let restored = TrieIndex::init(&path);
        assert_eq!(restored.search_prefix("app", -1), ["apple", "application"]);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.trie");
        fs::write(&path, b"garbage").unwrap();

        assert!(TrieIndex::init(&path).is_empty());
        assert!(try_load(&path).is_err());
    }

    #[test]
    fn test_reload_sees_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.trie");
        let mut reader = TrieIndex::init(&path);

        let mut writer = TrieIndex::init(&path);
        writer.insert("banana");
        writer.save().unwrap();

        assert!(reader.search_prefix("b", -1).is_empty());
        reader.reload();
        assert_eq!(reader.search_prefix("b", -1), ["banana"]);

        reader.shutdown();
        assert!(reader.is_empty());
        reader.reload();
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_clear_truncates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.trie");
        let mut index = TrieIndex::init(&path);
        index.insert("apple");
        index.save().unwrap();

        index.clear().unwrap();
        assert!(TrieIndex::init(&path).is_empty());
    }
}
