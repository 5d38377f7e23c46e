use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DictionaryKind, KeyTermEntry};

/// Half-open byte range `[start, end)` inside the source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Boundaries of every structural section of the source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLayout {
    pub header: ByteRange,
    pub key_info: ByteRange,
    pub key_index: ByteRange,
    pub key_blocks: ByteRange,
    pub record_info: ByteRange,
    pub record_index: ByteRange,
    pub record_blocks: ByteRange,
}

/// User-visible header metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMeta {
    pub engine_version: String,
    pub title: String,
    pub description: Option<String>,
    pub stylesheet: Option<String>,
    /// WHATWG label of the text encoding actually used for keys and records
    pub encoding: String,
    /// Every raw attribute of the header element
    pub attributes: BTreeMap<String, String>,
}

/// Encryption settings plus the derived master key, if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParams {
    pub encrypt_record_blocks: bool,
    pub encrypt_key_index: bool,
    pub master_key: Option<[u8; 16]>,
}

/// Location of one compressed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Stored size including the 8-byte block header
    pub compressed_size: u64,
    pub decompressed_size: u64,
    /// Absolute offset of the block in the source file
    pub file_offset: u64,
    /// Offset of this block in the concatenated decompressed stream
    pub decompressed_offset: u64,
}

/// Everything in a snapshot except the key term list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub kind: DictionaryKind,
    /// Major format version (1 or 2)
    pub format_version: u8,
    pub header: HeaderMeta,
    pub encryption: EncryptionParams,
    pub sections: SectionLayout,
    pub key_blocks: Vec<BlockMeta>,
    pub record_blocks: Vec<BlockMeta>,
    pub num_entries: u64,
    pub total_record_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionarySnapshot {
    pub meta: SnapshotMeta,
    /// Key terms in the dictionary's native collation order
    pub terms: Vec<KeyTermEntry>,
}

impl DictionarySnapshot {
    pub fn kind(&self) -> DictionaryKind {
        self.meta.kind
    }

    /// Record block containing the given decompressed-stream offset
    pub fn record_block_for(&self, offset: u64) -> Option<(usize, &BlockMeta)> {
        let blocks = &self.meta.record_blocks;
        let index = blocks
            .partition_point(|block| block.decompressed_offset <= offset)
            .checked_sub(1)?;
        let block = &blocks[index];
        if offset < block.decompressed_offset + block.decompressed_size {
            Some((index, block))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(decompressed_offset: u64, decompressed_size: u64) -> BlockMeta {
        BlockMeta {
            compressed_size: decompressed_size + 8,
            decompressed_size,
            file_offset: 1000 + decompressed_offset,
            decompressed_offset,
        }
    }

    fn snapshot_with_blocks(blocks: Vec<BlockMeta>) -> DictionarySnapshot {
        DictionarySnapshot {
            meta: SnapshotMeta {
                kind: DictionaryKind::Mdx,
                format_version: 2,
                header: HeaderMeta::default(),
                encryption: EncryptionParams::default(),
                sections: SectionLayout::default(),
                key_blocks: Vec::new(),
                record_blocks: blocks,
                num_entries: 0,
                total_record_size: 0,
            },
            terms: Vec::new(),
        }
    }

    #[test]
    fn test_record_block_lookup_uses_block_boundaries() {
        let snapshot = snapshot_with_blocks(vec![block(0, 10), block(10, 5), block(15, 20)]);

        assert_eq!(snapshot.record_block_for(0).map(|(i, _)| i), Some(0));
        assert_eq!(snapshot.record_block_for(9).map(|(i, _)| i), Some(0));
        assert_eq!(snapshot.record_block_for(10).map(|(i, _)| i), Some(1));
        assert_eq!(snapshot.record_block_for(34).map(|(i, _)| i), Some(2));
        assert!(snapshot.record_block_for(35).is_none());
    }

    #[test]
    fn test_record_block_lookup_on_empty_table() {
        let snapshot = snapshot_with_blocks(Vec::new());
        assert!(snapshot.record_block_for(0).is_none());
    }

    #[test]
    fn test_byte_range_len_saturates() {
        assert_eq!(ByteRange::new(4, 10).len(), 6);
        assert!(ByteRange::new(10, 4).is_empty());
    }
}
