use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

use crate::error::{MdictError, Result};

/// Major layout revision of an MDict file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V1,
    V2,
}

impl FormatVersion {
    pub fn from_major(major: u8) -> Option<Self> {
        match major {
            1 => Some(FormatVersion::V1),
            2 => Some(FormatVersion::V2),
            _ => None,
        }
    }

    pub fn major(self) -> u8 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    /// Width of counts, sizes and record ids
    pub fn number_width(self) -> usize {
        match self {
            FormatVersion::V1 => 4,
            FormatVersion::V2 => 8,
        }
    }

    /// Width of the text length prefix in the key index
    pub fn small_number_width(self) -> usize {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    /// Terminator units after each first/last key in the key index
    pub fn index_text_terminator(self) -> usize {
        match self {
            FormatVersion::V1 => 0,
            FormatVersion::V2 => 1,
        }
    }
}

/// Block compression, the low nibble of a block's info word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzo,
    Zlib,
}

impl Compression {
    pub fn code(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Lzo => 1,
            Compression::Zlib => 2,
        }
    }
}

impl TryFrom<u32> for Compression {
    type Error = MdictError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lzo),
            2 => Ok(Compression::Zlib),
            other => Err(MdictError::InvalidFormat(format!(
                "unknown compression type {other}"
            ))),
        }
    }
}

/// Block encryption, the second nibble of a block's info word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    Fast,
    Salsa20,
}

impl TryFrom<u32> for Encryption {
    type Error = MdictError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Encryption::None),
            1 => Ok(Encryption::Fast),
            2 => Ok(Encryption::Salsa20),
            other => Err(MdictError::InvalidFormat(format!(
                "unknown encryption type {other}"
            ))),
        }
    }
}

/// Header `Encrypted` attribute
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionFlags {
    pub encrypt_record_blocks: bool,
    pub encrypt_key_index: bool,
}

impl EncryptionFlags {
    pub fn from_attribute(raw: &str) -> Self {
        let bits = match raw.trim() {
            "" => 0,
            value if value.eq_ignore_ascii_case("yes") => 1,
            value if value.eq_ignore_ascii_case("no") => 0,
            value => value.parse::<u8>().unwrap_or(0),
        };
        Self {
            encrypt_record_blocks: bits & 0x01 != 0,
            encrypt_key_index: bits & 0x02 != 0,
        }
    }
}

/// Bytes per code unit for NUL scanning and length prefixes
pub fn unit_width(encoding: &'static Encoding) -> usize {
    if encoding == UTF_16LE || encoding == UTF_16BE {
        2
    } else {
        1
    }
}

pub fn read_number(reader: &mut &[u8], width: usize, what: &'static str) -> Result<u64> {
    let value = match width {
        8 => reader.read_u64::<BigEndian>(),
        4 => reader.read_u32::<BigEndian>().map(u64::from),
        2 => reader.read_u16::<BigEndian>().map(u64::from),
        1 => reader.read_u8().map(u64::from),
        other => {
            return Err(MdictError::InvalidFormat(format!(
                "invalid number width {other}"
            )));
        }
    };
    value.map_err(|_| MdictError::Truncated(what))
}

pub fn take<'a>(reader: &mut &'a [u8], len: usize, what: &'static str) -> Result<&'a [u8]> {
    if reader.len() < len {
        return Err(MdictError::Truncated(what));
    }
    let (head, tail) = reader.split_at(len);
    *reader = tail;
    Ok(head)
}

/// Largest buffer reserved up front for a length read from the file
const PREALLOC_LIMIT: u64 = 1 << 20;

/// `a + b` for offsets and sizes that come from the file
pub fn checked_sum(a: u64, b: u64, what: &'static str) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| MdictError::InvalidFormat(format!("{what} overflows")))
}

/// Read exactly `len` bytes. The buffer grows with the data actually read,
/// so a bogus length fails as truncation instead of a huge allocation.
pub fn read_exact_len<R: Read>(reader: &mut R, len: u64, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT) as usize);
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(MdictError::Truncated(what));
    }
    Ok(buf)
}

/// Read a NUL-terminated string and advance past the terminator
pub fn read_terminated_text(
    reader: &mut &[u8],
    encoding: &'static Encoding,
) -> Result<String> {
    let width = unit_width(encoding);
    let end = if width == 2 {
        reader
            .chunks_exact(2)
            .position(|unit| unit == [0, 0])
            .map(|unit| unit * 2)
    } else {
        reader.iter().position(|&byte| byte == 0)
    }
    .ok_or_else(|| MdictError::InvalidFormat("missing NUL terminator in key text".into()))?;

    let (text, _, _) = encoding.decode_without_bom_handling(&reader[..end]);
    *reader = &reader[end + width..];
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use encoding_rs::UTF_8;

    use super::*;

    #[test]
    fn test_checked_sum_reports_overflow() {
        assert_eq!(checked_sum(3, 4, "offset").unwrap(), 7);
        assert!(matches!(
            checked_sum(u64::MAX, 1, "record block offset"),
            Err(MdictError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_exact_len_rejects_lengths_past_the_data() {
        let mut input: &[u8] = b"abcdef";
        assert_eq!(read_exact_len(&mut input, 4, "data").unwrap(), b"abcd");
        assert_eq!(input, b"ef");

        let mut input: &[u8] = b"abc";
        assert!(matches!(
            read_exact_len(&mut input, u64::MAX, "index"),
            Err(MdictError::Truncated("index"))
        ));
    }

    #[test]
    fn test_encryption_flags_accept_words_and_bits() {
        assert_eq!(EncryptionFlags::from_attribute("No"), EncryptionFlags::default());
        assert!(EncryptionFlags::from_attribute("Yes").encrypt_record_blocks);
        let both = EncryptionFlags::from_attribute("3");
        assert!(both.encrypt_record_blocks && both.encrypt_key_index);
        assert!(EncryptionFlags::from_attribute("2").encrypt_key_index);
    }

    #[test]
    fn test_terminated_text_advances_reader() {
        let data = b"apple\0rest";
        let mut reader = &data[..];
        assert_eq!(read_terminated_text(&mut reader, UTF_8).unwrap(), "apple");
        assert_eq!(reader, b"rest");
    }

    #[test]
    fn test_terminated_utf16_text_scans_whole_units() {
        // "a" followed by U+0100, whose low byte is zero
        let data = [0x61, 0x00, 0x00, 0x01, 0x00, 0x00, 0xff];
        let mut reader = &data[..];
        assert_eq!(
            read_terminated_text(&mut reader, UTF_16LE).unwrap(),
            "a\u{100}"
        );
        assert_eq!(reader, [0xff]);
    }

    #[test]
    fn test_short_numbers_are_truncation_errors() {
        let mut reader = &[0u8, 1][..];
        assert!(matches!(
            read_number(&mut reader, 4, "count"),
            Err(MdictError::Truncated("count"))
        ));
    }
}
