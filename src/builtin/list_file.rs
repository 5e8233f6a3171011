//! `modules.builtin`: one module path per line
use crate::builtin::{BuiltinEvidence, EvidenceSource};
use crate::error::InventoryError;
use crate::kernel::module_name_from_path;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct BuiltinListFile {
    path: PathBuf,
}

impl BuiltinListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BuiltinListFile { path: path.into() }
    }
}

/// Names from the contents of `modules.builtin`, e.g.
/// `kernel/fs/ext4/ext4.ko` -> `ext4`.
pub fn parse_builtin_list(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(module_name_from_path)
        .collect()
}

impl BuiltinEvidence for BuiltinListFile {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::BuiltinList
    }

    fn builtin_names(&mut self) -> Result<BTreeSet<String>, InventoryError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let names = parse_builtin_list(&content);
                debug!("{} lists {} builtin modules", self.path.display(), names.len());
                Ok(names)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{} not found", self.path.display());
                Ok(BTreeSet::new())
            }
            Err(e) => Err(InventoryError::enrichment(
                self.source().label(),
                format!("{}: {}", self.path.display(), e),
            )),
        }
    }
}
