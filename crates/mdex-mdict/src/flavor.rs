use encoding_rs::{Encoding, UTF_16LE};
use mdex_types::DictionaryKind;

pub const LINK_PREFIX: &str = "@@@LINK=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Text(String),
    Binary(Vec<u8>),
    /// Points at another key in the same dictionary
    Redirect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFlavor {
    Text,
    Binary,
}

impl RecordFlavor {
    pub fn for_kind(kind: DictionaryKind) -> Self {
        match kind {
            DictionaryKind::Mdx => RecordFlavor::Text,
            DictionaryKind::Mdd => RecordFlavor::Binary,
        }
    }

    /// Encoding of key text. Resource files ignore the declared encoding.
    pub fn key_encoding(self, declared: &'static Encoding) -> &'static Encoding {
        match self {
            RecordFlavor::Text => declared,
            RecordFlavor::Binary => UTF_16LE,
        }
    }

    pub fn process(self, bytes: &[u8], encoding: &'static Encoding) -> Record {
        match self {
            RecordFlavor::Text => {
                let (text, _) = encoding.decode_without_bom_handling(bytes);
                let text = text.trim_end_matches('\0');
                match text.strip_prefix(LINK_PREFIX) {
                    Some(target) => Record::Redirect(target.trim().to_string()),
                    None => Record::Text(text.to_string()),
                }
            }
            RecordFlavor::Binary => {
                let prefix: Vec<u8> = LINK_PREFIX
                    .encode_utf16()
                    .flat_map(u16::to_le_bytes)
                    .collect();
                match bytes.strip_prefix(prefix.as_slice()) {
                    Some(target) => {
                        let (target, _) = UTF_16LE.decode_without_bom_handling(target);
                        Record::Redirect(target.trim_end_matches('\0').trim().to_string())
                    }
                    None => Record::Binary(bytes.to_vec()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use encoding_rs::UTF_8;

    use super::*;

    #[test]
    fn test_text_records_are_nul_trimmed() {
        assert_eq!(
            RecordFlavor::Text.process(b"<b>fruit</b>\0", UTF_8),
            Record::Text("<b>fruit</b>".into())
        );
    }

    #[test]
    fn test_text_redirects_are_detected() {
        assert_eq!(
            RecordFlavor::Text.process(b"@@@LINK=apple\r\n\0", UTF_8),
            Record::Redirect("apple".into())
        );
    }

    #[test]
    fn test_binary_redirects_use_utf16() {
        let raw: Vec<u8> = "@@@LINK=\\img.png"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        assert_eq!(
            RecordFlavor::Binary.process(&raw, UTF_8),
            Record::Redirect("\\img.png".into())
        );
        assert_eq!(
            RecordFlavor::Binary.process(&[0x89, b'P', b'N', b'G'], UTF_8),
            Record::Binary(vec![0x89, b'P', b'N', b'G'])
        );
    }

    #[test]
    fn test_resource_keys_are_always_utf16() {
        assert_eq!(RecordFlavor::Binary.key_encoding(UTF_8), UTF_16LE);
        assert_eq!(RecordFlavor::Text.key_encoding(UTF_8), UTF_8);
    }
}
