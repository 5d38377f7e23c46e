use std::sync::Arc;

use mdex_config::Config;
use mdex_core::{MdexError, Registry, Storage};
use mdex_trie::TrieIndex;
use mdex_types::{DictionaryKind, LookupHit, WorkerPayload, WorkerResult, WorkerTask};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::blocking;

/// Writes one JSON result per line, flushing after each
pub struct ResultWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> ResultWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, result: &WorkerResult) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(result).map_err(std::io::Error::other)?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        self.inner.flush().await
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[derive(Debug, Clone)]
pub struct WorkerContext {
    storage: Storage,
    registry: Arc<Registry>,
}

impl WorkerContext {
    pub fn new(storage: Storage, registry: Registry) -> Self {
        Self {
            storage,
            registry: Arc::new(registry),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let storage = Storage::new(&config.storage.data_dir);
        let registry = Registry::new(storage.clone(), crate::passcode(config));
        Self::new(storage, registry)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Serve a single task over stdin and stdout
pub async fn run_stdio(config: &Config) -> Result<(), MdexError> {
    let context = WorkerContext::from_config(config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| MdexError::WorkerFailure("no task received".into()))?;
    let task: WorkerTask = serde_json::from_str(&line)
        .map_err(|e| MdexError::WorkerFailure(format!("malformed task: {e}")))?;

    let mut out = ResultWriter::new(tokio::io::stdout());
    run_task(&context, task, &mut out).await
}

/// Execute `task` and report its outcome.
///
/// Task failures are reported as an `error` result; only a broken output
/// stream is returned as an error.
pub async fn run_task<W: AsyncWrite + Unpin>(
    context: &WorkerContext,
    task: WorkerTask,
    out: &mut ResultWriter<W>,
) -> Result<(), MdexError> {
    info!(task = task.name(), id = task.id(), "task received");

    match task {
        WorkerTask::Index { id, kind } => match index(context, &id, kind).await {
            Ok(payload) => {
                out.send(&WorkerResult::Done { payload }).await?;
                context.registry.close(&id);
                out.send(&WorkerResult::Closed).await?;
            }
            Err(e) => {
                context.registry.close(&id);
                out.send(&WorkerResult::Error {
                    message: e.to_string(),
                })
                .await?;
            }
        },
        WorkerTask::Search { id, term } => match search(context, &id, &term).await {
            Ok(hits) => {
                debug!(id, term, hits = hits.len(), "lookup finished");
                out.send(&WorkerResult::Done {
                    payload: WorkerPayload::Lookup { hits },
                })
                .await?;
                context.registry.close(&id);
            }
            Err(e) => {
                context.registry.close(&id);
                out.send(&WorkerResult::Error {
                    message: e.to_string(),
                })
                .await?;
            }
        },
    }
    Ok(())
}

/// Parse the managed copy, then write the cache artifact and merge the
/// terms into the persisted trie concurrently
async fn index(
    context: &WorkerContext,
    id: &str,
    kind: DictionaryKind,
) -> Result<WorkerPayload, MdexError> {
    let registry = Arc::clone(&context.registry);
    let owned_id = id.to_string();
    let dict = blocking(move || registry.parse_fresh(&owned_id, kind)).await?;
    let terms = dict.key_terms().len() as u64;

    let trie_dict = Arc::clone(&dict);
    let trie_path = context.storage.trie_path();
    let insert_terms = blocking(move || {
        let mut trie = TrieIndex::init(trie_path);
        let inserted = trie.insert_all(trie_dict.key_terms().iter().map(|t| t.text.as_str()));
        trie.save()?;
        Ok(inserted as u64)
    });

    let storage = context.storage.clone();
    let record = storage.record(id, kind);
    let write_cache = blocking(move || {
        let bytes = mdex_cache::encode(dict.snapshot())?;
        storage.write_cache(&record, &bytes)?;
        Ok(bytes.len())
    });

    let (inserted, cache_len) = tokio::try_join!(insert_terms, write_cache)?;
    info!(id, %kind, terms, inserted, cache_len, "indexed dictionary");
    Ok(WorkerPayload::Indexed { terms, inserted })
}

async fn search(
    context: &WorkerContext,
    id: &str,
    term: &str,
) -> Result<Vec<LookupHit>, MdexError> {
    let record = context.storage.find(id).ok_or_else(|| {
        MdexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("dictionary {id} is not registered"),
        ))
    })?;

    let registry = Arc::clone(&context.registry);
    let (id, term) = (id.to_string(), term.to_string());
    blocking(move || {
        let dict = registry.get(&id, record.kind)?;
        Ok(dict.lookup_all(&term)?)
    })
    .await
}
