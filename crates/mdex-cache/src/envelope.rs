use byteorder::{ByteOrder, LittleEndian};
use mdex_types::SnapshotMeta;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Cache files open with this magic, a little-endian format version and
/// an Adler-32 of the bincode body that follows
pub const MAGIC: &[u8; 4] = b"MDXC";
pub const FORMAT_VERSION: u16 = 1;
const PREAMBLE_LEN: usize = 10;
/// Upper bound on any single allocation while decoding
const DECODE_LIMIT: usize = 1 << 31;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    meta: &'a SnapshotMeta,
    terms: &'a [u8],
}

#[derive(Deserialize)]
pub struct Envelope {
    pub meta: SnapshotMeta,
    /// Opaque columnar term blob
    pub terms: Vec<u8>,
}

pub fn write(meta: &SnapshotMeta, terms: &[u8]) -> Result<Vec<u8>, CacheError> {
    let body = bincode::serde::encode_to_vec(
        EnvelopeRef { meta, terms },
        bincode::config::standard(),
    )?;

    let mut out = Vec::with_capacity(PREAMBLE_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&adler2::adler32_slice(&body).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn read(bytes: &[u8]) -> Result<Envelope, CacheError> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(CacheError::Truncated("preamble"));
    }
    if &bytes[0..4] != MAGIC {
        return Err(CacheError::BadMagic);
    }
    let version = LittleEndian::read_u16(&bytes[4..6]);
    if version != FORMAT_VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }
    let expected = LittleEndian::read_u32(&bytes[6..10]);
    let body = &bytes[PREAMBLE_LEN..];
    let actual = adler2::adler32_slice(body);
    if expected != actual {
        return Err(CacheError::ChecksumMismatch { expected, actual });
    }

    let config = bincode::config::standard().with_limit::<DECODE_LIMIT>();
    let (envelope, read): (Envelope, usize) = bincode::serde::decode_from_slice(body, config)?;
    if read != body.len() {
        return Err(CacheError::Truncated("trailing bytes after envelope"));
    }
    Ok(envelope)
}
