use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::Encoding;
use mdex_types::{BlockMeta, ByteRange, KeyTermEntry};
use tracing::{debug, info, trace};

use crate::block;
use crate::crypto;
use crate::error::{MdictError, Result};
use crate::header::Header;
use crate::models::{self, FormatVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub num_blocks: u64,
    pub num_entries: u64,
    /// v2 only
    pub index_decompressed_len: Option<u64>,
    pub index_len: u64,
    pub blocks_len: u64,
}

pub struct RecordSection {
    pub num_entries: u64,
    pub blocks: Vec<BlockMeta>,
    pub info_range: ByteRange,
    pub index_range: ByteRange,
    pub blocks_range: ByteRange,
    pub total_size: u64,
}

/// Key block info.
///
/// v2: five u64 counts/sizes followed by a BE adler32; Salsa20-encrypted
/// with the master key when record encryption is on. v1: four u32.
pub fn read_key_info<R: Read>(
    reader: &mut R,
    header: &Header,
    master_key: Option<&[u8; 16]>,
) -> Result<(KeyInfo, u64)> {
    let version = header.version;
    let field_count = match version {
        FormatVersion::V1 => 4,
        FormatVersion::V2 => 5,
    };
    let mut raw = vec![0u8; field_count * version.number_width()];
    reader.read_exact(&mut raw)?;
    let mut consumed = raw.len() as u64;

    if version == FormatVersion::V2 {
        if header.flags.encrypt_record_blocks {
            let key = master_key.ok_or(MdictError::PasscodeRequired)?;
            debug!("decrypting key block info");
            crypto::salsa_decrypt(&mut raw, key);
        }
        let expected = reader.read_u32::<BigEndian>()?;
        consumed += 4;
        let actual = adler2::adler32_slice(&raw);
        if expected != actual {
            return Err(MdictError::ChecksumMismatch {
                context: "key block info",
                expected,
                actual,
            });
        }
    }

    let width = version.number_width();
    let mut fields = raw.as_slice();
    let num_blocks = models::read_number(&mut fields, width, "key block info")?;
    let num_entries = models::read_number(&mut fields, width, "key block info")?;
    let index_decompressed_len = match version {
        FormatVersion::V1 => None,
        FormatVersion::V2 => Some(models::read_number(&mut fields, width, "key block info")?),
    };
    let index_len = models::read_number(&mut fields, width, "key block info")?;
    let blocks_len = models::read_number(&mut fields, width, "key block info")?;

    info!(
        blocks = num_blocks,
        entries = num_entries,
        index_bytes = index_len,
        data_bytes = blocks_len,
        "key block info"
    );

    Ok((
        KeyInfo {
            num_blocks,
            num_entries,
            index_decompressed_len,
            index_len,
            blocks_len,
        },
        consumed,
    ))
}

/// Read the key index and the block table it describes.
/// `blocks_start` is where the first key block begins in the file.
pub fn read_key_index<R: Read>(
    reader: &mut R,
    info: &KeyInfo,
    header: &Header,
    encoding: &'static Encoding,
    blocks_start: u64,
) -> Result<Vec<BlockMeta>> {
    let raw = models::read_exact_len(reader, info.index_len, "key index")?;

    let index = match info.index_decompressed_len {
        Some(len) => block::decode_key_index(&raw, len, header.flags.encrypt_key_index)?,
        None => raw,
    };

    let version = header.version;
    let width = version.number_width();
    let unit = models::unit_width(encoding);
    let mut cursor = index.as_slice();
    let mut blocks = Vec::with_capacity(info.num_blocks.min(1 << 16) as usize);
    let mut total_entries = 0u64;
    let mut file_offset = blocks_start;
    let mut decompressed_offset = 0u64;

    while !cursor.is_empty() {
        let entries = models::read_number(&mut cursor, width, "key index")?;
        total_entries = models::checked_sum(total_entries, entries, "key entry count")?;
        skip_index_text(&mut cursor, version, unit)?;
        skip_index_text(&mut cursor, version, unit)?;
        let compressed_size = models::read_number(&mut cursor, width, "key index")?;
        let decompressed_size = models::read_number(&mut cursor, width, "key index")?;

        blocks.push(BlockMeta {
            compressed_size,
            decompressed_size,
            file_offset,
            decompressed_offset,
        });
        file_offset = models::checked_sum(file_offset, compressed_size, "key block offset")?;
        decompressed_offset =
            models::checked_sum(decompressed_offset, decompressed_size, "key block size")?;
    }

    check_count("key blocks", info.num_blocks, blocks.len() as u64)?;
    check_count("key entries", info.num_entries, total_entries)?;
    check_count("key block bytes", info.blocks_len, file_offset - blocks_start)?;
    Ok(blocks)
}

fn skip_index_text(cursor: &mut &[u8], version: FormatVersion, unit: usize) -> Result<()> {
    let units = models::read_number(cursor, version.small_number_width(), "key index text")?;
    let len = (to_usize(units)? + version.index_text_terminator()) * unit;
    models::take(cursor, len, "key index text")?;
    Ok(())
}

/// Decode every key block into `(record id, text, key block index)` triples
pub fn read_key_terms<R: Read + Seek>(
    reader: &mut R,
    blocks: &[BlockMeta],
    header: &Header,
    encoding: &'static Encoding,
    master_key: Option<&[u8; 16]>,
) -> Result<Vec<(u64, String, u32)>> {
    let width = header.version.number_width();
    let mut terms = Vec::new();

    for (index, meta) in blocks.iter().enumerate() {
        let raw = read_block(reader, meta)?;
        let data = block::decode(&raw, meta.decompressed_size, master_key, "key block")?;
        let block_index = u32::try_from(index)
            .map_err(|_| MdictError::InvalidFormat("too many key blocks".into()))?;

        let mut cursor = data.as_slice();
        while !cursor.is_empty() {
            let id = models::read_number(&mut cursor, width, "key block entry")?;
            let text = models::read_terminated_text(&mut cursor, encoding)?;
            terms.push((id, text, block_index));
        }
        trace!(block = index, total = terms.len(), "decoded key block");
    }

    Ok(terms)
}

/// Record block info followed by the record index of `(compressed, decompressed)` pairs
pub fn read_records<R: Read + Seek>(reader: &mut R, header: &Header) -> Result<RecordSection> {
    let width = header.version.number_width();
    let info_start = reader.stream_position()?;

    let mut raw_info = vec![0u8; 4 * width];
    reader.read_exact(&mut raw_info)?;
    let mut fields = raw_info.as_slice();
    let num_blocks = models::read_number(&mut fields, width, "record block info")?;
    let num_entries = models::read_number(&mut fields, width, "record block info")?;
    let index_len = models::read_number(&mut fields, width, "record block info")?;
    let blocks_len = models::read_number(&mut fields, width, "record block info")?;

    info!(
        blocks = num_blocks,
        entries = num_entries,
        index_bytes = index_len,
        data_bytes = blocks_len,
        "record block info"
    );

    let index_start = reader.stream_position()?;
    let index = models::read_exact_len(reader, index_len, "record index")?;
    let blocks_start = models::checked_sum(index_start, index_len, "record index end")?;
    let blocks_end = models::checked_sum(blocks_start, blocks_len, "record blocks end")?;

    let mut cursor = index.as_slice();
    let mut blocks = Vec::with_capacity(num_blocks.min(1 << 16) as usize);
    let mut file_offset = blocks_start;
    let mut decompressed_offset = 0u64;
    while !cursor.is_empty() {
        let compressed_size = models::read_number(&mut cursor, width, "record index")?;
        let decompressed_size = models::read_number(&mut cursor, width, "record index")?;
        blocks.push(BlockMeta {
            compressed_size,
            decompressed_size,
            file_offset,
            decompressed_offset,
        });
        file_offset = models::checked_sum(file_offset, compressed_size, "record block offset")?;
        decompressed_offset =
            models::checked_sum(decompressed_offset, decompressed_size, "record block size")?;
    }

    check_count("record blocks", num_blocks, blocks.len() as u64)?;
    check_count("record block bytes", blocks_len, file_offset - blocks_start)?;

    Ok(RecordSection {
        num_entries,
        blocks,
        info_range: ByteRange::new(info_start, index_start),
        index_range: ByteRange::new(index_start, blocks_start),
        blocks_range: ByteRange::new(blocks_start, blocks_end),
        total_size: decompressed_offset,
    })
}

/// Read one block's raw bytes, header included
pub fn read_block<R: Read + Seek>(reader: &mut R, meta: &BlockMeta) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(meta.file_offset))?;
    models::read_exact_len(reader, meta.compressed_size, "block")
}

fn check_count(item: &'static str, expected: u64, found: u64) -> Result<()> {
    if expected != found {
        return Err(MdictError::CountMismatch {
            item,
            expected,
            found,
        });
    }
    Ok(())
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| MdictError::InvalidFormat(format!("size {value} does not fit in memory")))
}
