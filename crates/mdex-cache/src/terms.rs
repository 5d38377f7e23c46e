//! Columnar key term blob.
//!
//! ```text
//! "TERM" | u32 n | n x u64 start | n x u64 end | n x u32 block
//!        | (n+1) x u32 text offset | UTF-8 text
//! ```
//! All integers are little-endian. Term `i` is `text[offset[i]..offset[i+1]]`.

use byteorder::{ByteOrder, LittleEndian};
use mdex_types::KeyTermEntry;

use crate::error::CacheError;

pub const TERMS_MAGIC: &[u8; 4] = b"TERM";

pub fn encode_terms(terms: &[KeyTermEntry]) -> Result<Vec<u8>, CacheError> {
    let count = u32::try_from(terms.len()).map_err(|_| CacheError::TooLarge("term count"))?;
    let text_len: usize = terms.iter().map(|term| term.text.len()).sum();
    u32::try_from(text_len).map_err(|_| CacheError::TooLarge("term text"))?;

    let n = terms.len();
    let mut out = Vec::with_capacity(8 + n * 24 + 4 + text_len);
    out.extend_from_slice(TERMS_MAGIC);
    out.extend_from_slice(&count.to_le_bytes());
    for term in terms {
        out.extend_from_slice(&term.record_start.to_le_bytes());
    }
    for term in terms {
        out.extend_from_slice(&term.record_end.to_le_bytes());
    }
    for term in terms {
        out.extend_from_slice(&term.block_index.to_le_bytes());
    }
    let mut offset = 0u32;
    out.extend_from_slice(&offset.to_le_bytes());
    for term in terms {
        // Bounded by the text_len check above
        offset += term.text.len() as u32;
        out.extend_from_slice(&offset.to_le_bytes());
    }
    for term in terms {
        out.extend_from_slice(term.text.as_bytes());
    }
    Ok(out)
}

/// One row of [`TermColumns`], borrowing its text from the blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermRef<'a> {
    pub text: &'a str,
    pub record_start: u64,
    pub record_end: u64,
    pub block_index: u32,
}

impl TermRef<'_> {
    pub fn to_entry(&self) -> KeyTermEntry {
        KeyTermEntry {
            text: self.text.to_string(),
            record_start: self.record_start,
            record_end: self.record_end,
            block_index: self.block_index,
        }
    }
}

/// Validated, zero-copy view over a term blob
#[derive(Debug, Clone, Copy)]
pub struct TermColumns<'a> {
    len: usize,
    starts: &'a [u8],
    ends: &'a [u8],
    blocks: &'a [u8],
    offsets: &'a [u8],
    text: &'a str,
}

impl<'a> TermColumns<'a> {
    pub fn parse(blob: &'a [u8]) -> Result<Self, CacheError> {
        let mut rest = blob;
        if take(&mut rest, 4, "term magic")? != TERMS_MAGIC {
            return Err(CacheError::Terms("bad magic".into()));
        }
        let len = LittleEndian::read_u32(take(&mut rest, 4, "term count")?) as usize;

        let starts = take(&mut rest, column_len(len, 8)?, "record starts")?;
        let ends = take(&mut rest, column_len(len, 8)?, "record ends")?;
        let blocks = take(&mut rest, column_len(len, 4)?, "block indices")?;
        let offsets = take(&mut rest, column_len(len + 1, 4)?, "text offsets")?;
        let text = std::str::from_utf8(rest)
            .map_err(|e| CacheError::Terms(format!("text is not UTF-8: {e}")))?;

        let mut previous = 0usize;
        for (i, chunk) in offsets.chunks_exact(4).enumerate() {
            let offset = LittleEndian::read_u32(chunk) as usize;
            let valid = if i == 0 {
                offset == 0
            } else {
                offset >= previous && text.is_char_boundary(offset)
            };
            if !valid {
                return Err(CacheError::Terms(format!("invalid text offset at row {i}")));
            }
            previous = offset;
        }
        if previous != text.len() {
            return Err(CacheError::Terms(format!(
                "text is {} bytes but offsets end at {previous}",
                text.len()
            )));
        }

        Ok(Self {
            len,
            starts,
            ends,
            blocks,
            offsets,
            text,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Row `i`. Panics when `i >= len()`, like slice indexing.
    pub fn get(&self, i: usize) -> TermRef<'a> {
        assert!(i < self.len, "term index {i} out of range");
        let from = LittleEndian::read_u32(&self.offsets[i * 4..]) as usize;
        let to = LittleEndian::read_u32(&self.offsets[(i + 1) * 4..]) as usize;
        TermRef {
            text: &self.text[from..to],
            record_start: LittleEndian::read_u64(&self.starts[i * 8..]),
            record_end: LittleEndian::read_u64(&self.ends[i * 8..]),
            block_index: LittleEndian::read_u32(&self.blocks[i * 4..]),
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = TermRef<'a>> + 'a {
        let view = *self;
        (0..self.len).map(move |i| view.get(i))
    }

    pub fn to_entries(&self) -> Vec<KeyTermEntry> {
        self.iter().map(|term| term.to_entry()).collect()
    }
}

fn column_len(rows: usize, width: usize) -> Result<usize, CacheError> {
    rows.checked_mul(width)
        .ok_or(CacheError::Truncated("term columns"))
}

fn take<'a>(rest: &mut &'a [u8], len: usize, what: &'static str) -> Result<&'a [u8], CacheError> {
    if rest.len() < len {
        return Err(CacheError::Truncated(what));
    }
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, start: u64, end: u64, block: u32) -> KeyTermEntry {
        KeyTermEntry {
            text: text.into(),
            record_start: start,
            record_end: end,
            block_index: block,
        }
    }

    #[test]
    fn test_view_borrows_text_in_order() {
        let terms = vec![
            entry("apple", 0, 12, 0),
            entry("", 12, 12, 0),
            entry("日本語", 12, 40, 1),
        ];
        let blob = encode_terms(&terms).unwrap();
        let view = TermColumns::parse(&blob).unwrap();

        assert_eq!(view.len(), 3);
        let texts: Vec<&str> = view.iter().map(|t| t.text).collect();
        assert_eq!(texts, ["apple", "", "日本語"]);
        assert_eq!(view.get(2).block_index, 1);
        assert_eq!(view.to_entries(), terms);
    }

    #[test]
    fn test_empty_list() {
        let blob = encode_terms(&[]).unwrap();
        let view = TermColumns::parse(&blob).unwrap();
        assert!(view.is_empty());
        assert!(view.to_entries().is_empty());
    }

    #[test]
    fn test_offsets_inside_a_character_are_rejected() {
        let mut blob = encode_terms(&[entry("é", 0, 1, 0), entry("x", 1, 2, 0)]).unwrap();
        // Offsets start after magic, count and 2 x (8 + 8 + 4) bytes of columns
        let second_offset = 8 + 2 * 20 + 4;
        blob[second_offset..second_offset + 4].copy_from_slice(&1u32.to_le_bytes());

        assert!(matches!(
            TermColumns::parse(&blob),
            Err(CacheError::Terms(_))
        ));
    }

    #[test]
    fn test_huge_count_is_truncation_not_panic() {
        let mut blob = TERMS_MAGIC.to_vec();
        blob.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            TermColumns::parse(&blob),
            Err(CacheError::Truncated(_))
        ));
    }
}
