use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use encoding_rs::Encoding;
use mdex_types::{
    ByteRange, DictionaryKind, DictionarySnapshot, EncryptionParams, KeyTermEntry, LookupHit,
    SectionLayout, SnapshotMeta,
};
use tracing::{debug, info};

use crate::block;
use crate::crypto::Passcode;
use crate::error::{MdictError, Result};
use crate::flavor::{LINK_PREFIX, Record, RecordFlavor};
use crate::header;
use crate::index;
use crate::models;

/// Redirect chains longer than this return the raw link text
pub const MAX_REDIRECTS: usize = 5;

/// An opened dictionary: its snapshot plus the source file handle
#[derive(Debug)]
pub struct MdictFile {
    path: PathBuf,
    snapshot: DictionarySnapshot,
    flavor: RecordFlavor,
    encoding: &'static Encoding,
    file: Mutex<Option<File>>,
}

impl MdictFile {
    /// Parse a dictionary from its source file.
    pub fn open(
        path: impl AsRef<Path>,
        kind: DictionaryKind,
        passcode: Option<&Passcode>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let header = header::parse(&mut reader)?;
        let flavor = RecordFlavor::for_kind(kind);
        let encoding = flavor.key_encoding(header.encoding);
        let master_key = if header.flags.encrypt_record_blocks {
            passcode.map(Passcode::master_key)
        } else {
            None
        };

        let key_info_start = header.len;
        let (key_info, key_info_len) =
            index::read_key_info(&mut reader, &header, master_key.as_ref())?;
        let key_index_start = key_info_start + key_info_len;
        let key_blocks_start =
            models::checked_sum(key_index_start, key_info.index_len, "key index end")?;
        let key_blocks_end =
            models::checked_sum(key_blocks_start, key_info.blocks_len, "key blocks end")?;

        let key_blocks =
            index::read_key_index(&mut reader, &key_info, &header, encoding, key_blocks_start)?;
        let raw_terms = index::read_key_terms(
            &mut reader,
            &key_blocks,
            &header,
            encoding,
            master_key.as_ref(),
        )?;
        if raw_terms.len() as u64 != key_info.num_entries {
            return Err(MdictError::CountMismatch {
                item: "decoded key terms",
                expected: key_info.num_entries,
                found: raw_terms.len() as u64,
            });
        }

        reader.seek(SeekFrom::Start(key_blocks_end))?;
        let records = index::read_records(&mut reader, &header)?;
        if records.num_entries != key_info.num_entries {
            return Err(MdictError::CountMismatch {
                item: "record entries",
                expected: key_info.num_entries,
                found: records.num_entries,
            });
        }

        let terms = link_terms(raw_terms, records.total_size);
        let mut header_meta = header.meta;
        header_meta.encoding = encoding.name().to_string();

        let snapshot = DictionarySnapshot {
            meta: SnapshotMeta {
                kind,
                format_version: header.version.major(),
                header: header_meta,
                encryption: EncryptionParams {
                    encrypt_record_blocks: header.flags.encrypt_record_blocks,
                    encrypt_key_index: header.flags.encrypt_key_index,
                    master_key,
                },
                sections: SectionLayout {
                    header: ByteRange::new(0, header.len),
                    key_info: ByteRange::new(key_info_start, key_index_start),
                    key_index: ByteRange::new(key_index_start, key_blocks_start),
                    key_blocks: ByteRange::new(key_blocks_start, key_blocks_end),
                    record_info: records.info_range,
                    record_index: records.index_range,
                    record_blocks: records.blocks_range,
                },
                key_blocks,
                record_blocks: records.blocks,
                num_entries: key_info.num_entries,
                total_record_size: records.total_size,
            },
            terms,
        };

        info!(
            path = %path.display(),
            %kind,
            title = %snapshot.meta.header.title,
            terms = snapshot.terms.len(),
            "opened dictionary"
        );

        Ok(Self {
            path,
            snapshot,
            flavor,
            encoding,
            file: Mutex::new(Some(reader.into_inner())),
        })
    }

    /// Reopen the source file behind a snapshot restored from cache
    pub fn attach(snapshot: DictionarySnapshot, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let label = &snapshot.meta.header.encoding;
        let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
            MdictError::InvalidFormat(format!("snapshot has unknown encoding {label:?}"))
        })?;
        let file = File::open(&path)?;

        debug!(path = %path.display(), terms = snapshot.terms.len(), "attached snapshot");
        Ok(Self {
            path,
            flavor: RecordFlavor::for_kind(snapshot.meta.kind),
            snapshot,
            encoding,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DictionaryKind {
        self.snapshot.meta.kind
    }

    pub fn snapshot(&self) -> &DictionarySnapshot {
        &self.snapshot
    }

    /// Key terms in native order
    pub fn key_terms(&self) -> &[KeyTermEntry] {
        &self.snapshot.terms
    }

    pub fn is_open(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the file handle. Later record reads fail with [`MdictError::Closed`].
    pub fn close(&self) {
        let handle = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if handle.is_some() {
            debug!(path = %self.path.display(), "closed dictionary");
        }
    }

    /// Every entry whose text equals `term`, in key order.
    /// Resource dictionaries report a hit without a definition.
    pub fn lookup_all(&self, term: &str) -> Result<Vec<LookupHit>> {
        let mut hits = Vec::new();
        for entry in self.snapshot.terms.iter().filter(|entry| entry.text == term) {
            let definition = match self.flavor {
                RecordFlavor::Text => Some(self.resolve_text(entry, 0)?),
                RecordFlavor::Binary => None,
            };
            hits.push(LookupHit {
                term: entry.text.clone(),
                definition,
            });
        }
        Ok(hits)
    }

    /// Decompressed bytes of one entry's record
    pub fn read_record(&self, entry: &KeyTermEntry) -> Result<Vec<u8>> {
        let (_, meta) = self
            .snapshot
            .record_block_for(entry.record_start)
            .ok_or_else(|| {
                MdictError::InvalidFormat(format!(
                    "record offset {} is outside every record block",
                    entry.record_start
                ))
            })?;

        let raw = {
            let mut guard = self.file.lock().map_err(|_| MdictError::LockPoisoned)?;
            let file = guard.as_mut().ok_or(MdictError::Closed)?;
            index::read_block(file, meta)?
        };
        let data = block::decode(
            &raw,
            meta.decompressed_size,
            self.snapshot.meta.encryption.master_key.as_ref(),
            "record block",
        )?;

        let block_end = meta.decompressed_offset.saturating_add(meta.decompressed_size);
        let start = (entry.record_start - meta.decompressed_offset) as usize;
        let end = entry
            .record_end
            .min(block_end)
            .saturating_sub(meta.decompressed_offset) as usize;
        if end < start {
            return Err(MdictError::InvalidFormat(format!(
                "record for {:?} ends before it starts",
                entry.text
            )));
        }
        Ok(data[start..end].to_vec())
    }

    fn find(&self, term: &str) -> Option<&KeyTermEntry> {
        self.snapshot.terms.iter().find(|entry| entry.text == term)
    }

    fn resolve_text(&self, entry: &KeyTermEntry, depth: usize) -> Result<String> {
        let bytes = self.read_record(entry)?;
        match self.flavor.process(&bytes, self.encoding) {
            Record::Text(text) => Ok(text),
            Record::Binary(_) => Ok(String::new()),
            Record::Redirect(target) => {
                let next = self.find(&target).filter(|next| !std::ptr::eq(*next, entry));
                match next {
                    Some(next) if depth < MAX_REDIRECTS => self.resolve_text(next, depth + 1),
                    _ => Ok(format!("{LINK_PREFIX}{target}")),
                }
            }
        }
    }
}

/// Turn `(record id, text, block)` triples into entries whose record range
/// ends where the next entry's begins
fn link_terms(raw: Vec<(u64, String, u32)>, total_record_size: u64) -> Vec<KeyTermEntry> {
    let ends: Vec<u64> = raw
        .iter()
        .skip(1)
        .map(|(start, _, _)| *start)
        .chain(std::iter::once(total_record_size))
        .collect();

    raw.into_iter()
        .zip(ends)
        .map(|((record_start, text, block_index), record_end)| KeyTermEntry {
            text,
            record_start,
            record_end,
            block_index,
        })
        .collect()
}
