use std::fs;
use std::io;
use std::path::Path;

use mdex_types::DictionaryKind;

use crate::block;
use crate::crypto;
use crate::models::{Compression, FormatVersion};

pub struct MdxBuilder {
    kind: DictionaryKind,
    version: FormatVersion,
    engine_version: Option<String>,
    title: String,
    description: String,
    compression: Compression,
    encrypt_key_index: bool,
    entries_per_block: usize,
    entries: Vec<(String, Vec<u8>)>,
}

impl Default for MdxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MdxBuilder {
    pub fn new() -> Self {
        Self {
            kind: DictionaryKind::Mdx,
            version: FormatVersion::V2,
            engine_version: None,
            title: "Fixture".to_string(),
            description: String::new(),
            compression: Compression::Zlib,
            encrypt_key_index: false,
            entries_per_block: 64,
            entries: Vec::new(),
        }
    }

    /// Resource (`.mdd`) layout: UTF-16LE keys and binary records
    pub fn mdd() -> Self {
        Self {
            kind: DictionaryKind::Mdd,
            ..Self::new()
        }
    }

    pub fn v1(mut self) -> Self {
        self.version = FormatVersion::V1;
        self
    }

    /// Override the `GeneratedByEngineVersion` attribute
    pub fn engine_version(mut self, version: &str) -> Self {
        self.engine_version = Some(version.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.compression = Compression::None;
        self
    }

    pub fn encrypt_key_index(mut self) -> Self {
        self.encrypt_key_index = true;
        self
    }

    pub fn entries_per_block(mut self, count: usize) -> Self {
        self.entries_per_block = count.max(1);
        self
    }

    /// Text entry. Records get the NUL terminator real dictionaries carry.
    pub fn entry(mut self, term: &str, definition: &str) -> Self {
        let mut record = definition.as_bytes().to_vec();
        record.push(0);
        self.entries.push((term.to_string(), record));
        self
    }

    pub fn link(self, term: &str, target: &str) -> Self {
        let definition = format!("@@@LINK={target}\r\n");
        self.entry(term, &definition)
    }

    pub fn resource(mut self, name: &str, bytes: &[u8]) -> Self {
        self.entries.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.build()?)
    }

    pub fn build(&self) -> io::Result<Vec<u8>> {
        let width = self.version.number_width();
        let utf16_keys = self.kind == DictionaryKind::Mdd;

        let mut out = self.header();

        // Record ids are offsets into the concatenated record stream
        let mut ids = Vec::with_capacity(self.entries.len());
        let mut offset = 0u64;
        for (_, record) in &self.entries {
            ids.push(offset);
            offset += record.len() as u64;
        }

        let chunks: Vec<_> = self
            .entries
            .iter()
            .zip(&ids)
            .collect::<Vec<_>>()
            .chunks(self.entries_per_block)
            .map(<[_]>::to_vec)
            .collect();

        let mut key_index = Vec::new();
        let mut key_blocks = Vec::new();
        let mut record_index = Vec::new();
        let mut record_blocks = Vec::new();

        for chunk in &chunks {
            let mut keys = Vec::new();
            let mut records = Vec::new();
            for ((term, record), id) in chunk {
                push_number(&mut keys, **id, width);
                keys.extend(encode_text(term, utf16_keys));
                keys.extend(terminator(utf16_keys));
                records.extend_from_slice(record);
            }

            let key_block = block::encode(&keys, self.compression)?;
            let record_block = block::encode(&records, self.compression)?;

            push_number(&mut key_index, chunk.len() as u64, width);
            for (term, _) in [chunk[0].0, chunk[chunk.len() - 1].0] {
                self.push_index_text(&mut key_index, term, utf16_keys);
            }
            push_number(&mut key_index, key_block.len() as u64, width);
            push_number(&mut key_index, keys.len() as u64, width);

            push_number(&mut record_index, record_block.len() as u64, width);
            push_number(&mut record_index, records.len() as u64, width);

            key_blocks.extend(key_block);
            record_blocks.extend(record_block);
        }

        let entries = self.entries.len() as u64;
        match self.version {
            FormatVersion::V1 => {
                let mut info = Vec::new();
                push_number(&mut info, chunks.len() as u64, width);
                push_number(&mut info, entries, width);
                push_number(&mut info, key_index.len() as u64, width);
                push_number(&mut info, key_blocks.len() as u64, width);
                out.extend(info);
                out.extend(key_index);
            }
            FormatVersion::V2 => {
                let mut index_block = block::encode(&key_index, self.compression)?;
                if self.encrypt_key_index {
                    let key = crypto::key_index_key(&index_block[4..8]);
                    crypto::fast_encrypt(&mut index_block[8..], &key);
                }

                let mut info = Vec::new();
                push_number(&mut info, chunks.len() as u64, width);
                push_number(&mut info, entries, width);
                push_number(&mut info, key_index.len() as u64, width);
                push_number(&mut info, index_block.len() as u64, width);
                push_number(&mut info, key_blocks.len() as u64, width);
                let checksum = adler2::adler32_slice(&info);
                out.extend(info);
                out.extend(checksum.to_be_bytes());
                out.extend(index_block);
            }
        }
        out.extend(key_blocks);

        push_number(&mut out, chunks.len() as u64, width);
        push_number(&mut out, entries, width);
        push_number(&mut out, record_index.len() as u64, width);
        push_number(&mut out, record_blocks.len() as u64, width);
        out.extend(record_index);
        out.extend(record_blocks);

        Ok(out)
    }

    fn header(&self) -> Vec<u8> {
        let engine = self.engine_version.clone().unwrap_or_else(|| {
            match self.version {
                FormatVersion::V1 => "1.2",
                FormatVersion::V2 => "2.0",
            }
            .to_string()
        });
        let encoding = match self.kind {
            DictionaryKind::Mdx => "UTF-8",
            DictionaryKind::Mdd => "",
        };
        let encrypted = if self.encrypt_key_index { "2" } else { "0" };
        let xml = format!(
            r#"<Dictionary GeneratedByEngineVersion="{engine}" RequiredEngineVersion="{engine}" Encrypted="{encrypted}" Encoding="{encoding}" Format="Html" Title="{}" Description="{}" StyleSheet=""/>"#,
            escape(&self.title),
            escape(&self.description),
        );

        let mut body = encode_text(&xml, true);
        body.extend_from_slice(&[0, 0]);
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        let checksum = adler2::adler32_slice(&body);
        out.extend(body);
        out.extend(checksum.to_le_bytes());
        out
    }

    fn push_index_text(&self, out: &mut Vec<u8>, text: &str, utf16: bool) {
        let encoded = encode_text(text, utf16);
        let units = if utf16 { encoded.len() / 2 } else { encoded.len() };
        push_number(out, units as u64, self.version.small_number_width());
        out.extend(encoded);
        if self.version.index_text_terminator() > 0 {
            out.extend(terminator(utf16));
        }
    }
}

fn push_number(out: &mut Vec<u8>, value: u64, width: usize) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[8 - width..]);
}

fn encode_text(text: &str, utf16: bool) -> Vec<u8> {
    if utf16 {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    } else {
        text.as_bytes().to_vec()
    }
}

fn terminator(utf16: bool) -> &'static [u8] {
    if utf16 { &[0, 0] } else { &[0] }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
