use std::path::Path;
use std::sync::Arc;

use mdex_config::Config;
use mdex_core::{Backup, MdexError, Registry, Storage, validate_id};
use mdex_trie::{Trie, TrieIndex};
use mdex_types::{DictionaryKind, DictionaryRecord, LookupHit, WorkerPayload, WorkerTask};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::blocking;
use crate::worker::{WorkerCommand, WorkerLauncher};

/// Outcome of one successful indexing task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    /// Key terms in the dictionary
    pub terms: u64,
    /// Terms that were new to the trie
    pub inserted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub indexed: Vec<DictionaryRecord>,
    /// `(id, reason)` for each dictionary that failed to reindex
    pub failed: Vec<(String, String)>,
}

/// Coordinator for registered dictionaries.
///
/// Prefix search runs in process against the trie. Indexing and full-term
/// lookups each run in their own worker process.
#[derive(Debug)]
pub struct Library {
    config: Config,
    storage: Storage,
    registry: Registry,
    trie: Arc<RwLock<TrieIndex>>,
    launcher: WorkerLauncher,
    /// Serializes writers of the persisted trie file
    indexing: Mutex<()>,
    cancel: CancellationToken,
}

impl Library {
    pub async fn init(config: Config) -> Result<Self, MdexError> {
        let storage = Storage::new(&config.storage.data_dir);
        storage.ensure_layout()?;

        let trie_path = storage.trie_path();
        let trie = blocking(move || Ok(TrieIndex::init(trie_path))).await?;

        let command = match &config.worker.exe {
            Some(exe) => WorkerCommand::new(exe).arg("worker"),
            None => WorkerCommand::current_exe()?,
        };
        let cancel = CancellationToken::new();
        let mut launcher = WorkerLauncher::new(
            command,
            config.worker.timeout(),
            config.worker.channel_capacity,
            cancel.child_token(),
        )
        .env("MDEX_DATA_DIR", storage.root());
        if let Some(passcode) = &config.passcode {
            launcher = launcher.env("MDEX_PASSCODE", passcode);
        }

        let registry = Registry::new(storage.clone(), crate::passcode(&config));
        info!(root = %storage.root().display(), terms = trie.len(), "library ready");

        Ok(Self {
            config,
            storage,
            registry,
            trie: Arc::new(RwLock::new(trie)),
            launcher,
            indexing: Mutex::new(()),
            cancel,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Cancel running workers and release every held resource
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.shutdown();
        self.trie.write().await.shutdown();
        info!("library shut down");
    }

    /// Copy `source` into managed storage under `id` and index it.
    ///
    /// A failed indexing run puts back the previous copy and cache of `id`,
    /// or removes the new copy when `id` was not registered before.
    pub async fn register_dictionary(
        &self,
        id: &str,
        source: impl AsRef<Path>,
    ) -> Result<IndexReport, MdexError> {
        validate_id(id)?;
        let source = source.as_ref().to_path_buf();
        let kind = DictionaryKind::from_path(&source).ok_or_else(|| {
            MdexError::UnsupportedFormat(format!(
                "{} is not an .mdx or .mdd file",
                source.display()
            ))
        })?;

        let _indexing = self.indexing.lock().await;
        self.registry.close(id);

        let record = self.storage.record(id, kind);
        let storage = self.storage.clone();
        let previous = record.clone();
        let backup = blocking(move || Ok(storage.backup(&previous)?)).await?;

        let storage = self.storage.clone();
        let owned_id = id.to_string();
        if let Err(e) = blocking(move || storage.import(&owned_id, &source)).await {
            self.restore(id, backup);
            return Err(e);
        }
        if let Err(e) = self.storage.remove_cache(&record) {
            self.restore(id, backup);
            return Err(e.into());
        }

        info!(id, %kind, "indexing dictionary");
        let outcome = self
            .launcher
            .run(WorkerTask::Index {
                id: id.to_string(),
                kind,
            })
            .await;
        // The worker may have persisted terms even when it failed afterwards
        self.reload_trie().await?;

        let report = outcome.and_then(|payload| match payload {
            WorkerPayload::Indexed { terms, inserted } => Ok(IndexReport { terms, inserted }),
            other => Err(MdexError::WorkerFailure(format!(
                "unexpected payload from index worker: {other:?}"
            ))),
        });
        match &report {
            Ok(_) => drop(backup),
            Err(e) => {
                warn!(id, %kind, "registration failed, rolling back: {e}");
                self.restore(id, backup);
            }
        }
        report
    }

    /// Put back whatever `id` had before the failed attempt; a new id is
    /// removed again
    fn restore(&self, id: &str, backup: Backup) {
        let existed = backup.existed();
        match backup.restore() {
            Ok(()) if existed => info!(id, "previous registration restored"),
            Ok(()) => {}
            Err(e) => warn!(id, "rollback failed: {e}"),
        }
    }

    /// Delete the managed copies and caches of `id`. Its terms stay in the
    /// trie until [`Library::rebuild_index`] runs.
    pub async fn unregister_dictionary(&self, id: &str) -> Result<(), MdexError> {
        self.registry.remove(id)
    }

    pub async fn lookup(&self, id: &str, term: &str) -> Result<Vec<LookupHit>, MdexError> {
        validate_id(id)?;
        if self.storage.find(id).is_none() {
            return Err(MdexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("dictionary {id} is not registered"),
            )));
        }

        let payload = self
            .launcher
            .run(WorkerTask::Search {
                id: id.to_string(),
                term: term.to_string(),
            })
            .await?;
        match payload {
            WorkerPayload::Lookup { hits } => Ok(hits),
            other => Err(MdexError::WorkerFailure(format!(
                "unexpected payload from search worker: {other:?}"
            ))),
        }
    }

    /// Terms starting with `prefix` in lexicographic order. A negative
    /// `limit` means unlimited.
    pub async fn autocomplete(&self, prefix: &str, limit: i64) -> Vec<String> {
        self.trie.read().await.search_prefix(prefix, limit)
    }

    pub fn list_dictionaries(&self) -> Result<Vec<DictionaryRecord>, MdexError> {
        self.storage.list()
    }

    /// Reset the trie and reindex every managed dictionary.
    ///
    /// Individual failures are collected; the remaining dictionaries are
    /// still indexed.
    pub async fn rebuild_index(&self) -> Result<RebuildReport, MdexError> {
        let _indexing = self.indexing.lock().await;
        let records = self.storage.list()?;

        let trie_path = self.storage.trie_path();
        blocking(move || Ok(mdex_trie::save(&Trie::new(), &trie_path)?)).await?;
        self.registry.shutdown();

        let mut report = RebuildReport::default();
        for record in records {
            let task = WorkerTask::Index {
                id: record.id.clone(),
                kind: record.kind,
            };
            match self.launcher.run(task).await {
                Ok(_) => report.indexed.push(record),
                Err(e) => {
                    warn!(id = %record.id, kind = %record.kind, "reindex failed: {e}");
                    report.failed.push((record.id, e.to_string()));
                }
            }
        }

        self.reload_trie().await?;
        info!(
            indexed = report.indexed.len(),
            failed = report.failed.len(),
            "index rebuilt"
        );
        Ok(report)
    }

    async fn reload_trie(&self) -> Result<(), MdexError> {
        let path = self.storage.trie_path();
        let fresh = blocking(move || Ok(TrieIndex::init(path))).await?;
        *self.trie.write().await = fresh;
        Ok(())
    }
}
