pub mod snapshot;
pub mod types;
pub mod worker;

pub use snapshot::{
    BlockMeta, ByteRange, DictionarySnapshot, EncryptionParams, HeaderMeta, SectionLayout,
    SnapshotMeta,
};
pub use types::{DictionaryKind, DictionaryRecord, KeyTermEntry, LookupHit};
pub use worker::{WorkerPayload, WorkerResult, WorkerTask};
