pub mod envelope;
pub mod error;
pub mod terms;

use mdex_types::DictionarySnapshot;
use tracing::debug;

pub use envelope::{FORMAT_VERSION, MAGIC};
pub use error::CacheError;
pub use terms::{TermColumns, TermRef};

pub fn encode(snapshot: &DictionarySnapshot) -> Result<Vec<u8>, CacheError> {
    let terms = terms::encode_terms(&snapshot.terms)?;
    let bytes = envelope::write(&snapshot.meta, &terms)?;
    debug!(
        terms = snapshot.terms.len(),
        term_bytes = terms.len(),
        total_bytes = bytes.len(),
        "encoded snapshot"
    );
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<DictionarySnapshot, CacheError> {
    let envelope = envelope::read(bytes)?;
    let terms = TermColumns::parse(&envelope.terms)?.to_entries();
    Ok(DictionarySnapshot {
        meta: envelope.meta,
        terms,
    })
}
