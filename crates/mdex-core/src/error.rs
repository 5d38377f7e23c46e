use mdex_cache::CacheError;
use mdex_mdict::MdictError;
use mdex_trie::TrieError;
use thiserror::Error;

/// Every failure is scoped to one dictionary or one request
#[derive(Debug, Error)]
pub enum MdexError {
    #[error("unsupported dictionary format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Recovered by re-parsing the source; only surfaced by strict reads
    #[error("corrupt cache artifact: {0}")]
    CorruptCache(String),

    #[error("worker failed: {0}")]
    WorkerFailure(String),

    #[error("malformed dictionary: {0}")]
    Parse(String),

    #[error("invalid dictionary id {0:?}")]
    InvalidId(String),
}

impl From<MdictError> for MdexError {
    fn from(err: MdictError) -> Self {
        match err {
            MdictError::Io(e) => MdexError::Io(e),
            MdictError::UnsupportedVersion(version) => {
                MdexError::UnsupportedFormat(format!("MDict engine version {version}"))
            }
            MdictError::Closed => MdexError::Io(std::io::Error::other(MdictError::Closed)),
            other => MdexError::Parse(other.to_string()),
        }
    }
}

impl From<CacheError> for MdexError {
    fn from(err: CacheError) -> Self {
        if err.is_corrupt() {
            MdexError::CorruptCache(err.to_string())
        } else {
            MdexError::Parse(err.to_string())
        }
    }
}

impl From<TrieError> for MdexError {
    fn from(err: TrieError) -> Self {
        match err {
            TrieError::Io(e) => MdexError::Io(e),
            other => MdexError::Parse(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_errors_map_onto_the_taxonomy() {
        assert!(matches!(
            MdexError::from(MdictError::UnsupportedVersion("3.0".into())),
            MdexError::UnsupportedFormat(_)
        ));
        assert!(matches!(
            MdexError::from(MdictError::Closed),
            MdexError::Io(_)
        ));
        assert!(matches!(
            MdexError::from(MdictError::Truncated("key index")),
            MdexError::Parse(_)
        ));
    }

    #[test]
    fn test_cache_errors_map_onto_corrupt_cache() {
        assert!(matches!(
            MdexError::from(CacheError::BadMagic),
            MdexError::CorruptCache(_)
        ));
        assert!(matches!(
            MdexError::from(CacheError::TooLarge("term count")),
            MdexError::Parse(_)
        ));
    }
}
