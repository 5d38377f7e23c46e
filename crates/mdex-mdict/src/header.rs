use std::collections::BTreeMap;
use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_8, UTF_16LE};
use mdex_types::HeaderMeta;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

use crate::error::{MdictError, Result};
use crate::models::{self, EncryptionFlags, FormatVersion};

#[derive(Debug)]
pub struct Header {
    pub version: FormatVersion,
    pub flags: EncryptionFlags,
    /// Encoding declared by the header, before any per-kind override
    pub encoding: &'static Encoding,
    pub meta: HeaderMeta,
    /// Bytes consumed, including the length prefix and checksum
    pub len: u64,
}

/// Read the big-endian length prefix, the UTF-16LE XML header and its
/// Adler-32 checksum
pub fn parse<R: Read>(reader: &mut R) -> Result<Header> {
    let xml_len = reader.read_u32::<BigEndian>()?;
    let xml_bytes = models::read_exact_len(reader, u64::from(xml_len), "header")?;

    let expected = reader.read_u32::<LittleEndian>()?;
    let actual = adler2::adler32_slice(&xml_bytes);
    if expected != actual {
        return Err(MdictError::ChecksumMismatch {
            context: "header",
            expected,
            actual,
        });
    }

    let (decoded, _) = UTF_16LE.decode_without_bom_handling(&xml_bytes);
    let sanitized: String = decoded
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    let attributes = parse_attributes(&sanitized)?;

    let engine_version = attributes
        .get("GeneratedByEngineVersion")
        .cloned()
        .unwrap_or_else(|| "1.0".to_string());
    let version = parse_version(&engine_version)?;

    let encoding = resolve_encoding(attributes.get("Encoding").map(String::as_str));
    let flags = attributes
        .get("Encrypted")
        .map(|raw| EncryptionFlags::from_attribute(raw))
        .unwrap_or_default();

    let meta = HeaderMeta {
        engine_version,
        title: attributes
            .get("Title")
            .cloned()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        description: attributes.get("Description").cloned(),
        stylesheet: attributes
            .get("StyleSheet")
            .cloned()
            .filter(|sheet| !sheet.is_empty()),
        encoding: encoding.name().to_string(),
        attributes,
    };

    debug!(
        version = version.major(),
        title = %meta.title,
        encoding = encoding.name(),
        ?flags,
        "parsed header"
    );

    Ok(Header {
        version,
        flags,
        encoding,
        meta,
        len: 8 + u64::from(xml_len),
    })
}

fn parse_version(raw: &str) -> Result<FormatVersion> {
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| MdictError::InvalidFormat(format!("invalid engine version {raw:?}")))?;
    if value >= 3.0 {
        return Err(MdictError::UnsupportedVersion(raw.to_string()));
    }
    Ok(if value >= 2.0 {
        FormatVersion::V2
    } else {
        FormatVersion::V1
    })
}

/// Map the header's encoding label. GBK and GB2312 are read as GB18030,
/// unknown or empty labels fall back to UTF-8.
pub fn resolve_encoding(label: Option<&str>) -> &'static Encoding {
    let label = label.map(str::trim).unwrap_or_default();
    if label.is_empty() {
        return UTF_8;
    }
    let label = if label.eq_ignore_ascii_case("GBK") || label.eq_ignore_ascii_case("GB2312") {
        "GB18030"
    } else {
        label
    };
    Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
        warn!(label, "unknown header encoding, falling back to UTF-8");
        UTF_8
    })
}

fn parse_attributes(xml: &str) -> Result<BTreeMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                let mut attributes = element.attributes();
                attributes.with_checks(false);

                let mut parsed = BTreeMap::new();
                for attribute in attributes {
                    let attribute = attribute.map_err(|e| {
                        MdictError::InvalidFormat(format!("header attribute: {e}"))
                    })?;
                    let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                    // Unknown HTML entities are kept verbatim
                    let value = match attribute.unescape_value() {
                        Ok(value) => value.into_owned(),
                        Err(_) => String::from_utf8_lossy(&attribute.value).into_owned(),
                    };
                    parsed.insert(key, value);
                }
                return Ok(parsed);
            }
            Ok(Event::Eof) => {
                return Err(MdictError::InvalidFormat(
                    "header contains no XML element".into(),
                ));
            }
            Err(e) => return Err(MdictError::InvalidFormat(format!("header XML: {e}"))),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(xml: &str) -> Vec<u8> {
        let mut body: Vec<u8> = xml.encode_utf16().flat_map(u16::to_le_bytes).collect();
        body.extend_from_slice(&[0, 0]);
        let mut raw = (body.len() as u32).to_be_bytes().to_vec();
        raw.extend_from_slice(&body);
        raw.extend_from_slice(&adler2::adler32_slice(&body).to_le_bytes());
        raw
    }

    #[test]
    fn test_reads_attributes_and_version() {
        let raw = framed(
            r#"<Dictionary GeneratedByEngineVersion="2.0" Encrypted="2" Encoding="GBK" Title="Fruit &amp; Veg" Description="&nbsp;odd"/>"#,
        );
        let header = parse(&mut raw.as_slice()).unwrap();

        assert_eq!(header.version, FormatVersion::V2);
        assert!(header.flags.encrypt_key_index);
        assert!(!header.flags.encrypt_record_blocks);
        assert_eq!(header.encoding, encoding_rs::GB18030);
        assert_eq!(header.meta.title, "Fruit & Veg");
        assert_eq!(header.meta.description.as_deref(), Some("&nbsp;odd"));
        assert_eq!(header.len, raw.len() as u64);
    }

    #[test]
    fn test_version_three_is_unsupported() {
        let raw = framed(r#"<Dictionary GeneratedByEngineVersion="3.0" Title="x"/>"#);
        assert!(matches!(
            parse(&mut raw.as_slice()),
            Err(MdictError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_checksum_is_verified() {
        let mut raw = framed(r#"<Dictionary GeneratedByEngineVersion="1.2"/>"#);
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(matches!(
            parse(&mut raw.as_slice()),
            Err(MdictError::ChecksumMismatch { context: "header", .. })
        ));
    }

    #[test]
    fn test_empty_encoding_defaults_to_utf8() {
        assert_eq!(resolve_encoding(Some("")), UTF_8);
        assert_eq!(resolve_encoding(None), UTF_8);
        assert_eq!(resolve_encoding(Some("UTF-16")), UTF_16LE);
    }
}
