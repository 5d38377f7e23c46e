use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mdex_mdict::{MdictFile, Passcode};
use mdex_types::{DictionaryKind, DictionaryRecord};
use tracing::{debug, info, warn};

use crate::error::MdexError;
use crate::storage::{Storage, validate_id};

type LoadedMap = HashMap<(String, DictionaryKind), Arc<MdictFile>>;

/// In-process set of loaded dictionaries, at most one per `(id, kind)`.
///
/// Loading happens while the map lock is held, so two concurrent `get`s for
/// the same dictionary never open the source file twice.
#[derive(Debug)]
pub struct Registry {
    storage: Storage,
    passcode: Option<Passcode>,
    loaded: Mutex<LoadedMap>,
}

impl Registry {
    pub fn new(storage: Storage, passcode: Option<Passcode>) -> Self {
        Self {
            storage,
            passcode,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The loaded instance, else the cache artifact, else a fresh parse
    pub fn get(&self, id: &str, kind: DictionaryKind) -> Result<Arc<MdictFile>, MdexError> {
        validate_id(id)?;
        let mut loaded = self.lock();
        if let Some(dict) = loaded.get(&(id.to_string(), kind)) {
            return Ok(Arc::clone(dict));
        }

        let record = self.storage.record(id, kind);
        let dict = Arc::new(self.load(&record)?);
        loaded.insert((id.to_string(), kind), Arc::clone(&dict));
        Ok(dict)
    }

    /// Parse the source copy, ignoring any cache artifact, and make the
    /// result the loaded instance
    pub fn parse_fresh(
        &self,
        id: &str,
        kind: DictionaryKind,
    ) -> Result<Arc<MdictFile>, MdexError> {
        validate_id(id)?;
        let mut loaded = self.lock();
        let record = self.storage.record(id, kind);
        let dict = Arc::new(self.parse(&record)?);
        if let Some(previous) = loaded.insert((id.to_string(), kind), Arc::clone(&dict)) {
            previous.close();
        }
        Ok(dict)
    }

    /// Release every loaded instance of `id`. A no-op when none is loaded.
    pub fn close(&self, id: &str) {
        let mut loaded = self.lock();
        for kind in DictionaryKind::ALL {
            if let Some(dict) = loaded.remove(&(id.to_string(), kind)) {
                dict.close();
                debug!(id, %kind, "unloaded dictionary");
            }
        }
    }

    /// Close `id` and delete its source copies and cache artifacts.
    /// Succeeds when nothing existed.
    pub fn remove(&self, id: &str) -> Result<(), MdexError> {
        validate_id(id)?;
        self.close(id);
        for kind in DictionaryKind::ALL {
            self.storage.remove_files(&self.storage.record(id, kind))?;
        }
        info!(id, "removed dictionary");
        Ok(())
    }

    pub fn is_loaded(&self, id: &str, kind: DictionaryKind) -> bool {
        self.lock().contains_key(&(id.to_string(), kind))
    }

    pub fn loaded_count(&self) -> usize {
        self.lock().len()
    }

    pub fn shutdown(&self) {
        let mut loaded = self.lock();
        for dict in loaded.values() {
            dict.close();
        }
        let count = loaded.len();
        loaded.clear();
        debug!(count, "registry shut down");
    }

    fn lock(&self) -> MutexGuard<'_, LoadedMap> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, record: &DictionaryRecord) -> Result<MdictFile, MdexError> {
        let Some(bytes) = self.storage.read_cache(record)? else {
            return self.parse(record);
        };

        let restored = mdex_cache::decode(&bytes)
            .map_err(MdexError::from)
            .and_then(|snapshot| {
                if snapshot.meta.kind != record.kind {
                    return Err(MdexError::CorruptCache(format!(
                        "artifact holds a {} snapshot",
                        snapshot.meta.kind
                    )));
                }
                Ok(snapshot)
            });

        match restored {
            Ok(snapshot) => {
                debug!(id = %record.id, "restored from cache");
                Ok(MdictFile::attach(snapshot, &record.source_path)?)
            }
            Err(e) => {
                warn!(id = %record.id, "cache artifact unusable, parsing source: {e}");
                self.parse(record)
            }
        }
    }

    fn parse(&self, record: &DictionaryRecord) -> Result<MdictFile, MdexError> {
        Ok(MdictFile::open(
            &record.source_path,
            record.kind,
            self.passcode.as_ref(),
        )?)
    }
}
