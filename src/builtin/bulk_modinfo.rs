//! `modules.builtin.modinfo`: NUL-separated `module.field=value` entries
use crate::builtin::{BuiltinEvidence, EvidenceSource};
use crate::error::InventoryError;
use crate::kernel::{module_key, ModuleMetadata};
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const ENTRY_PATTERN: &str = r"(?:^|\x00)([A-Za-z0-9_\-]+)\.([A-Za-z0-9_]+)=([^\x00]*)";

pub type FieldMap = BTreeMap<String, String>;

/// Parse the packed file into `module key -> field -> value`. The first value
/// of a repeated field wins.
pub fn parse_bulk_modinfo(content: &str) -> Result<HashMap<String, FieldMap>, InventoryError> {
    let pattern = Regex::new(ENTRY_PATTERN)?;
    let mut modules: HashMap<String, FieldMap> = HashMap::new();
    for caps in pattern.captures_iter(content) {
        modules
            .entry(module_key(&caps[1]))
            .or_default()
            .entry(caps[2].to_string())
            .or_insert_with(|| caps[3].to_string());
    }
    Ok(modules)
}

pub struct BulkModinfoFile {
    path: PathBuf,
    modules: Option<HashMap<String, FieldMap>>,
}

impl BulkModinfoFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BulkModinfoFile {
            path: path.into(),
            modules: None,
        }
    }

    fn load(&mut self) -> Result<&HashMap<String, FieldMap>, InventoryError> {
        if self.modules.is_none() {
            let modules = match fs::read(&self.path) {
                Ok(bytes) => parse_bulk_modinfo(&String::from_utf8_lossy(&bytes))?,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} not found", self.path.display());
                    HashMap::new()
                }
                Err(e) => {
                    return Err(InventoryError::enrichment(
                        self.source().label(),
                        format!("{}: {}", self.path.display(), e),
                    ))
                }
            };
            debug!("{} describes {} modules", self.path.display(), modules.len());
            self.modules = Some(modules);
        }
        Ok(&*self.modules.get_or_insert_with(HashMap::new))
    }
}

impl BuiltinEvidence for BulkModinfoFile {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::BulkModinfo
    }

    fn metadata(&mut self, name: &str) -> Result<Option<ModuleMetadata>, InventoryError> {
        Ok(self
            .load()?
            .get(&module_key(name))
            .map(ModuleMetadata::from_fields))
    }
}
