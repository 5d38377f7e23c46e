use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdictError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported MDict engine version {0}, only 1.x and 2.x are readable")]
    UnsupportedVersion(String),

    #[error("checksum mismatch in {context}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        context: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("count mismatch for {item}: expected {expected}, found {found}")]
    CountMismatch {
        item: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("size mismatch for {context}: expected {expected} bytes, found {found}")]
    SizeMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("truncated data while reading {0}")]
    Truncated(&'static str),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("dictionary is encrypted and no passcode was provided")]
    PasscodeRequired,

    #[error("invalid passcode: {0}")]
    InvalidPasscode(String),

    #[error("dictionary is closed")]
    Closed,

    #[error("file handle lock was poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, MdictError>;
