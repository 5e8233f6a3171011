//! Last-resort metadata from `MODULE_DESCRIPTION`/`MODULE_LICENSE` in kernel sources
use crate::builtin::{BuiltinEvidence, EvidenceSource};
use crate::error::InventoryError;
use crate::kernel::ModuleMetadata;
use log::{debug, info};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const DESCRIPTION_PATTERN: &str = r#"MODULE_DESCRIPTION\s*\(\s*"((?:[^"\\]|\\.)*)""#;
const LICENSE_PATTERN: &str = r#"MODULE_LICENSE\s*\(\s*"((?:[^"\\]|\\.)*)""#;

/// A `.c` file below one of the source roots.
#[derive(Debug, Clone)]
struct SourceFile {
    file_name: String,
    path: PathBuf,
}

pub struct SourceTreeHeuristic {
    roots: Vec<PathBuf>,
    index: Option<Vec<SourceFile>>,
    description: Regex,
    license: Regex,
}

impl SourceTreeHeuristic {
    pub fn new(roots: Vec<PathBuf>) -> Result<Self, InventoryError> {
        Ok(SourceTreeHeuristic {
            roots,
            index: None,
            description: Regex::new(DESCRIPTION_PATTERN)?,
            license: Regex::new(LICENSE_PATTERN)?,
        })
    }

    fn index(&mut self) -> &[SourceFile] {
        if self.index.is_none() {
            let mut seen_roots = HashSet::new();
            let mut files = Vec::new();
            for root in &self.roots {
                if !root.is_dir() {
                    continue;
                }
                let canonical = fs::canonicalize(root).unwrap_or_else(|_| root.clone());
                if seen_roots.insert(canonical.clone()) {
                    collect_c_files(&canonical, &mut files);
                }
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
            info!("Indexed {} kernel source files", files.len());
            self.index = Some(files);
        }
        self.index.get_or_insert_with(Vec::new)
    }

    /// Description and license from the first matching files.
    pub fn extract(&self, source: &str) -> ModuleMetadata {
        let first = |pattern: &Regex| {
            pattern
                .captures(source)
                .map(|caps| unescape(&caps[1]))
                .unwrap_or_default()
        };
        ModuleMetadata {
            description: first(&self.description),
            license: first(&self.license),
            ..ModuleMetadata::default()
        }
    }
}

fn unescape(literal: &str) -> String {
    literal.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Walk `dir` for `.c` files without following symlinked subdirectories.
fn collect_c_files(dir: &Path, files: &mut Vec<SourceFile>) {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "c") {
                files.push(SourceFile {
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    path,
                });
            }
        }
    }
}

impl BuiltinEvidence for SourceTreeHeuristic {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::SourceTree
    }

    fn metadata(&mut self, name: &str) -> Result<Option<ModuleMetadata>, InventoryError> {
        let variants = [name.to_string(), name.replace('-', "_"), name.replace('_', "-")];
        let candidates: Vec<PathBuf> = self
            .index()
            .iter()
            .filter(|f| variants.iter().any(|v| f.file_name.contains(v.as_str())))
            .map(|f| f.path.clone())
            .collect();

        let mut merged = ModuleMetadata::default();
        for path in candidates {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            let found = self.extract(&String::from_utf8_lossy(&bytes));
            if merged.description.is_empty() {
                merged.description = found.description;
            }
            if merged.license.is_empty() {
                merged.license = found.license;
            }
            if !merged.description.is_empty() && !merged.license.is_empty() {
                debug!("Source metadata for {} from {}", name, path.display());
                break;
            }
        }

        Ok(if merged.is_empty() { None } else { Some(merged) })
    }
}
