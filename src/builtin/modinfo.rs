//! Builtin evidence from the `modinfo` tool
use crate::builtin::{BuiltinEvidence, EvidenceSource};
use crate::command::CommandRunner;
use crate::error::InventoryError;
use crate::kernel::{module_key, module_name_from_path, strip_module_extension, ModuleMetadata};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One `key: value` block of modinfo output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModinfoRecord {
    pub fields: BTreeMap<String, String>,
}

impl ModinfoRecord {
    pub fn filename(&self) -> &str {
        self.fields.get("filename").map(String::as_str).unwrap_or("")
    }

    /// The `name` field, or the base name of `filename` without extension.
    pub fn name(&self) -> Option<String> {
        match self.fields.get("name") {
            Some(name) if !name.is_empty() => Some(name.clone()),
            _ => module_name_from_path(self.filename()),
        }
    }

    /// Builtin records report a sentinel such as `(builtin)` instead of a
    /// file location.
    pub fn is_builtin(&self) -> bool {
        let filename = self.filename();
        !filename.is_empty()
            && !filename.contains('/')
            && strip_module_extension(filename).is_none()
    }
}

/// Group modinfo output into records. A record ends when its `filename` or
/// `name` key appears a second time; repeated keys otherwise keep the first
/// value.
///
/// Builtin blocks lead with `name:` directly followed by `filename:`, so a
/// `name` line immediately before a record-ending `filename` moves to the new
/// record. This keeps a builtin intact after a block that has no `name` line.
pub fn parse_modinfo_output(output: &str) -> Vec<ModinfoRecord> {
    let mut records = Vec::new();
    let mut current = ModinfoRecord::default();
    let mut name_was_last = false;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }

        let starts_record = matches!(key, "filename" | "name") && current.fields.contains_key(key);
        if starts_record {
            let carried = if key == "filename" && name_was_last {
                current.fields.remove("name")
            } else {
                None
            };
            records.push(std::mem::take(&mut current));
            if let Some(name) = carried {
                current.fields.insert("name".to_string(), name);
            }
        }
        current
            .fields
            .entry(key.to_string())
            .or_insert_with(|| value.trim().to_string());
        name_was_last = key == "name";
    }

    if !current.fields.is_empty() {
        records.push(current);
    }
    records
}

pub struct ModinfoTool {
    runner: Arc<dyn CommandRunner>,
    program: String,
    builtin: Option<HashMap<String, ModinfoRecord>>,
}

impl ModinfoTool {
    pub fn new(runner: Arc<dyn CommandRunner>, program: &str) -> Self {
        ModinfoTool {
            runner,
            program: program.to_string(),
            builtin: None,
        }
    }

    fn builtin_records(&mut self) -> Result<&HashMap<String, ModinfoRecord>, InventoryError> {
        if self.builtin.is_none() {
            let output = self.runner.run_checked(&self.program, &["-a"])?;
            let mut records = HashMap::new();
            for record in parse_modinfo_output(&output.stdout_text()) {
                if !record.is_builtin() {
                    continue;
                }
                if let Some(name) = record.name() {
                    records.entry(module_key(&name)).or_insert(record);
                }
            }
            debug!("modinfo reported {} builtin modules", records.len());
            self.builtin = Some(records);
        }
        Ok(&*self.builtin.get_or_insert_with(HashMap::new))
    }
}

impl BuiltinEvidence for ModinfoTool {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::ModinfoTool
    }

    fn builtin_names(&mut self) -> Result<BTreeSet<String>, InventoryError> {
        Ok(self
            .builtin_records()?
            .values()
            .filter_map(ModinfoRecord::name)
            .collect())
    }

    fn metadata(&mut self, name: &str) -> Result<Option<ModuleMetadata>, InventoryError> {
        Ok(self
            .builtin_records()?
            .get(&module_key(name))
            .map(|record| ModuleMetadata::from_fields(&record.fields)))
    }
}
