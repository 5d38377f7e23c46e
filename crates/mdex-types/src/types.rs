use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Supported dictionary file types.
///
/// `Mdx` is the primary index (term -> definition text), `Mdd` is the
/// attachment blob that ships images, audio and stylesheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryKind {
    Mdx,
    Mdd,
}

impl DictionaryKind {
    pub const ALL: [DictionaryKind; 2] = [DictionaryKind::Mdx, DictionaryKind::Mdd];

    /// File extension without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            DictionaryKind::Mdx => "mdx",
            DictionaryKind::Mdd => "mdd",
        }
    }

    /// Map a bare extension (case-insensitive, with or without dot) to a kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(ext))
    }

    /// Map a file path to a kind using its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for DictionaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One registered dictionary file inside managed storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryRecord {
    pub id: String,
    pub source_path: PathBuf,
    pub cache_path: PathBuf,
    pub kind: DictionaryKind,
}

/// A key term as found in a dictionary's key index.
///
/// The offsets address the concatenated, decompressed record stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTermEntry {
    pub text: String,
    pub record_start: u64,
    pub record_end: u64,
    pub block_index: u32,
}

/// A single full-term lookup result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupHit {
    pub term: String,
    pub definition: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path_is_case_insensitive() {
        assert_eq!(
            DictionaryKind::from_path(Path::new("/tmp/Oxford.MDX")),
            Some(DictionaryKind::Mdx)
        );
        assert_eq!(
            DictionaryKind::from_path(Path::new("res.mdd")),
            Some(DictionaryKind::Mdd)
        );
        assert_eq!(DictionaryKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(DictionaryKind::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn test_kind_from_extension_accepts_leading_dot() {
        assert_eq!(DictionaryKind::from_extension(".mdx"), Some(DictionaryKind::Mdx));
        assert_eq!(DictionaryKind::from_extension("mdd"), Some(DictionaryKind::Mdd));
        assert_eq!(DictionaryKind::from_extension(""), None);
    }
}
