use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not a cache artifact")]
    BadMagic,

    #[error("unsupported cache format version {0}")]
    UnsupportedVersion(u16),

    #[error("cache checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("truncated cache data in {0}")]
    Truncated(&'static str),

    #[error("malformed term columns: {0}")]
    Terms(String),

    #[error("malformed envelope: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("{0} does not fit the cache format")]
    TooLarge(&'static str),
}

impl CacheError {
    /// Whether the input bytes were at fault, as opposed to the snapshot being encoded
    pub fn is_corrupt(&self) -> bool {
        !matches!(self, CacheError::Encode(_) | CacheError::TooLarge(_))
    }
}
