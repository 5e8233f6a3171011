//! Metadata embedded in kernel module binaries
//!
//! Every `.ko` file carries a `.modinfo` ELF section holding NUL separated
//! `key=value` strings (`description=...`, `license=...`, ...). Signed modules
//! additionally carry `sig_id`/`signer` keys, or a trailing marker appended by
//! `sign-file` after the build.
use crate::error::InventoryError;
use crate::kernel::{ModuleMetadata, SignatureState};
use std::collections::BTreeMap;
use std::path::Path;
#[cfg(test)]
use std::{collections::HashMap, path::PathBuf};

pub mod elf;

pub use elf::ElfMetadataReader;

/// Marker appended to a module by `scripts/sign-file`.
pub const SIGNATURE_MARKER: &[u8] = b"~Module signature appended~\n";

/// Keys that only appear in the modinfo of signed modules.
const SIGNATURE_KEYS: [&str; 3] = ["sig_id", "signer", "sig_key"];

/// Best-effort metadata read from a module binary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryMetadata {
    pub metadata: ModuleMetadata,
    pub signed: SignatureState,
}

impl BinaryMetadata {
    pub fn description(&self) -> &str {
        &self.metadata.description
    }
}

/// Reads metadata out of a module file on disk.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<BinaryMetadata, InventoryError>;
}

/// Parse the contents of a `.modinfo` section. The first occurrence of a key wins.
pub fn parse_modinfo_section(section: &[u8]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for entry in section.split(|&b| b == 0) {
        if entry.is_empty() {
            continue;
        }
        let entry = String::from_utf8_lossy(entry);
        if let Some((key, value)) = entry.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            fields
                .entry(key.to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }
    fields
}

/// Classify signing from the parsed modinfo fields and the raw file bytes.
pub fn signature_state(fields: &BTreeMap<String, String>, image: &[u8]) -> SignatureState {
    if SIGNATURE_KEYS.iter().any(|key| fields.contains_key(*key)) || image.ends_with(SIGNATURE_MARKER) {
        SignatureState::Signed
    } else {
        SignatureState::Unsigned
    }
}

/// Serves canned metadata keyed by path.
#[cfg(test)]
#[derive(Default)]
pub struct FixtureMetadataReader {
    entries: HashMap<PathBuf, BinaryMetadata>,
}

#[cfg(test)]
impl FixtureMetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, path: impl Into<PathBuf>, description: &str) -> Self {
        let metadata = BinaryMetadata {
            metadata: ModuleMetadata {
                description: description.to_string(),
                ..Default::default()
            },
            signed: SignatureState::Unsigned,
        };
        self.entries.insert(path.into(), metadata);
        self
    }

    pub fn with_metadata(mut self, path: impl Into<PathBuf>, metadata: BinaryMetadata) -> Self {
        self.entries.insert(path.into(), metadata);
        self
    }
}

#[cfg(test)]
impl MetadataReader for FixtureMetadataReader {
    fn read(&self, path: &Path) -> Result<BinaryMetadata, InventoryError> {
        self.entries.get(path).cloned().ok_or_else(|| {
            InventoryError::enrichment("module binary", format!("no fixture for {}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modinfo_section() {
        let section = b"license=GPL\0description=Intel HDA driver\0author=Takashi Iwai\0\0alias=pci:v*\0license=dual\0";
        let fields = parse_modinfo_section(section);

        assert_eq!(fields.get("license").map(String::as_str), Some("GPL"));
        assert_eq!(
            fields.get("description").map(String::as_str),
            Some("Intel HDA driver")
        );
        assert_eq!(fields.get("author").map(String::as_str), Some("Takashi Iwai"));
        assert_eq!(fields.get("alias").map(String::as_str), Some("pci:v*"));
    }

    #[test]
    fn test_parse_modinfo_ignores_entries_without_key() {
        let fields = parse_modinfo_section(b"garbage\0=orphan\0version=1.2\0");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("version").map(String::as_str), Some("1.2"));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let fields = parse_modinfo_section(b"parm=mode:a=b (int)\0");
        assert_eq!(fields.get("parm").map(String::as_str), Some("mode:a=b (int)"));
    }

    #[test]
    fn test_signature_state() {
        let mut fields = BTreeMap::new();
        assert_eq!(signature_state(&fields, b"\x7fELF..."), SignatureState::Unsigned);

        let mut image = b"\x7fELF...".to_vec();
        image.extend_from_slice(SIGNATURE_MARKER);
        assert_eq!(signature_state(&fields, &image), SignatureState::Signed);

        fields.insert("signer".to_string(), "Build time autogenerated kernel key".to_string());
        assert_eq!(signature_state(&fields, b"\x7fELF"), SignatureState::Signed);
    }

    #[test]
    fn test_fixture_reader() {
        let reader = FixtureMetadataReader::new().with_description("/m/d.ko", "dummy");
        assert_eq!(reader.read(Path::new("/m/d.ko")).unwrap().description(), "dummy");
        assert!(reader.read(Path::new("/m/e.ko")).is_err());
    }
}
