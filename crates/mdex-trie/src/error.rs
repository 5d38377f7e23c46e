use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("trie file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a trie file")]
    BadMagic,

    #[error("unsupported trie format version {0}")]
    UnsupportedVersion(u16),

    #[error("trie checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("malformed trie: {0}")]
    Malformed(String),
}

impl From<tempfile::PersistError> for TrieError {
    fn from(err: tempfile::PersistError) -> Self {
        TrieError::Io(err.error)
    }
}
