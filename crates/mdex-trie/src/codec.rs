//! On-disk trie layout.
//!
//! ```text
//! "MDXT" | u16 version | u32 adler32(body) | body
//! body = u32 node count, then per node:
//!        u8 terminal | u32 child count | child count x (u32 char, u32 node)
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::error::TrieError;
use crate::trie::{Node, Trie};

pub const MAGIC: &[u8; 4] = b"MDXT";
pub const FORMAT_VERSION: u16 = 1;
const PREAMBLE_LEN: usize = 10;

pub fn encode(trie: &Trie) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + trie.nodes.len() * 13);
    body.extend_from_slice(&(trie.nodes.len() as u32).to_le_bytes());
    for node in &trie.nodes {
        body.push(u8::from(node.terminal));
        body.extend_from_slice(&(node.children.len() as u32).to_le_bytes());
        for (ch, child) in &node.children {
            body.extend_from_slice(&u32::from(*ch).to_le_bytes());
            body.extend_from_slice(&child.to_le_bytes());
        }
    }

    let mut out = Vec::with_capacity(PREAMBLE_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&adler2::adler32_slice(&body).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

pub fn decode(bytes: &[u8]) -> Result<Trie, TrieError> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(TrieError::Malformed("file too short".into()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(TrieError::BadMagic);
    }
    let version = LittleEndian::read_u16(&bytes[4..6]);
    if version != FORMAT_VERSION {
        return Err(TrieError::UnsupportedVersion(version));
    }
    let expected = LittleEndian::read_u32(&bytes[6..10]);
    let mut body = &bytes[PREAMBLE_LEN..];
    let actual = adler2::adler32_slice(body);
    if expected != actual {
        return Err(TrieError::ChecksumMismatch { expected, actual });
    }

    let count = read_u32(&mut body)? as usize;
    if count == 0 {
        return Err(TrieError::Malformed("missing root node".into()));
    }
    // Each node takes at least five bytes
    if count > body.len() / 5 {
        return Err(TrieError::Malformed(format!("node count {count} exceeds file size")));
    }

    let mut nodes = Vec::with_capacity(count);
    let mut len = 0usize;
    for index in 0..count {
        let terminal = match take(&mut body, 1)?[0] {
            0 => false,
            1 => true,
            other => return Err(TrieError::Malformed(format!("terminal flag {other}"))),
        };
        len += usize::from(terminal);

        let child_count = read_u32(&mut body)? as usize;
        if child_count > body.len() / 8 {
            return Err(TrieError::Malformed(format!("node {index} overruns the file")));
        }
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let raw = read_u32(&mut body)?;
            let ch = char::from_u32(raw)
                .ok_or_else(|| TrieError::Malformed(format!("invalid char {raw:#x}")))?;
            let child = read_u32(&mut body)?;
            // Children are allocated after their parent, which also rules out cycles
            if (child as usize) <= index || (child as usize) >= count {
                return Err(TrieError::Malformed(format!(
                    "node {index} points at node {child}"
                )));
            }
            if children.last().is_some_and(|(prev, _)| *prev >= ch) {
                return Err(TrieError::Malformed(format!("node {index} children unsorted")));
            }
            children.push((ch, child));
        }
        nodes.push(Node { terminal, children });
    }
    if !body.is_empty() {
        return Err(TrieError::Malformed("trailing bytes".into()));
    }

    Ok(Trie { nodes, len })
}

fn take<'a>(body: &mut &'a [u8], len: usize) -> Result<&'a [u8], TrieError> {
    if body.len() < len {
        return Err(TrieError::Malformed("unexpected end of file".into()));
    }
    let (head, tail) = body.split_at(len);
    *body = tail;
    Ok(head)
}

fn read_u32(body: &mut &[u8]) -> Result<u32, TrieError> {
    take(body, 4).map(LittleEndian::read_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_trie_answers_like_the_source_trie() {
        let trie: Trie = ["apple", "application", "banana", "日本"].into_iter().collect();
        let restored = decode(&encode(&trie)).unwrap();

        assert_eq!(restored, trie);
        assert_eq!(restored.search_prefix("app", -1), ["apple", "application"]);
    }

    #[test]
    fn test_empty_trie_has_a_root() {
        let restored = decode(&encode(&Trie::new())).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_damaged_bytes_are_rejected() {
        let bytes = encode(&["apple", "apply"].into_iter().collect());
        for i in 0..bytes.len() {
            let mut corrupt = bytes.clone();
            corrupt[i] ^= 0x21;
            assert!(decode(&corrupt).is_err(), "byte {i}");
        }
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_cycles_are_rejected_even_with_valid_checksum() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.push(0);
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&u32::from('a').to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&adler2::adler32_slice(&body).to_le_bytes());
        bytes.extend_from_slice(&body);

        assert!(matches!(decode(&bytes), Err(TrieError::Malformed(_))));
    }
}
