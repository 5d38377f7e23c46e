use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::compression;
use crate::crypto;
use crate::error::{MdictError, Result};
use crate::models::{Compression, Encryption};

pub const BLOCK_HEADER_LEN: usize = 8;

struct Frame<'a> {
    compression: Compression,
    encryption: Encryption,
    checksum: u32,
    checksum_bytes: &'a [u8],
    payload: &'a [u8],
}

fn split(raw: &[u8]) -> Result<Frame<'_>> {
    if raw.len() < BLOCK_HEADER_LEN {
        return Err(MdictError::Truncated("block header"));
    }
    let info = LittleEndian::read_u32(&raw[0..4]);
    Ok(Frame {
        compression: Compression::try_from(info & 0x0f)?,
        encryption: Encryption::try_from((info >> 4) & 0x0f)?,
        checksum: BigEndian::read_u32(&raw[4..8]),
        checksum_bytes: &raw[4..8],
        payload: &raw[8..],
    })
}

fn finish(frame: &Frame<'_>, payload: &[u8], expected: u64, context: &'static str) -> Result<Vec<u8>> {
    let data = compression::decompress(payload, frame.compression, expected)?;
    let actual = adler2::adler32_slice(&data);
    if actual != frame.checksum {
        return Err(MdictError::ChecksumMismatch {
            context,
            expected: frame.checksum,
            actual,
        });
    }
    Ok(data)
}

/// Decode a key or record block.
///
/// Encrypted payloads use the master key when one was derived, otherwise
/// RIPEMD-128 of the block's own checksum bytes.
pub fn decode(
    raw: &[u8],
    expected: u64,
    master_key: Option<&[u8; 16]>,
    context: &'static str,
) -> Result<Vec<u8>> {
    let frame = split(raw)?;
    if frame.encryption == Encryption::None {
        return finish(&frame, frame.payload, expected, context);
    }

    let key = match master_key {
        Some(key) => *key,
        None => crypto::ripemd128(&[frame.checksum_bytes]),
    };
    let mut payload = frame.payload.to_vec();
    crypto::decrypt_in_place(&mut payload, frame.encryption, &key);
    finish(&frame, &payload, expected, context)
}

/// Decode the v2 key index, whose encryption is announced by the header flag
/// rather than the info word.
pub fn decode_key_index(raw: &[u8], expected: u64, encrypted: bool) -> Result<Vec<u8>> {
    let frame = split(raw)?;
    if !encrypted {
        return finish(&frame, frame.payload, expected, "key index");
    }

    let key = crypto::key_index_key(frame.checksum_bytes);
    let mut payload = frame.payload.to_vec();
    crypto::fast_decrypt(&mut payload, &key);
    finish(&frame, &payload, expected, "key index")
}

/// Frame `data` into a block. Only used to write fixtures.
#[cfg(any(test, feature = "testing"))]
pub fn encode(data: &[u8], compression: Compression) -> std::io::Result<Vec<u8>> {
    let payload = compression::compress(data, compression)?;
    let mut raw = Vec::with_capacity(BLOCK_HEADER_LEN + payload.len());
    raw.extend_from_slice(&compression.code().to_le_bytes());
    raw.extend_from_slice(&adler2::adler32_slice(data).to_be_bytes());
    raw.extend_from_slice(&payload);
    Ok(raw)
}
