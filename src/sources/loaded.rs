//! Live module listing from `/proc/modules`
//!
//! Each line has at least six whitespace separated fields:
//! `name size refcount deps status address`, e.g.
//! `snd_hda_intel 61440 3 - Live 0xffffffffc0b5c000`.
use crate::error::InventoryError;
use crate::kernel::{LoadedModule, ModuleStatus};
use crate::metadata::MetadataReader;
use crate::sources::locator::ModuleLocator;
use log::{debug, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

const MIN_FIELDS: usize = 6;

/// Reads and parses the kernel's live module listing.
pub struct ProcModulesSource {
    path: PathBuf,
}

impl ProcModulesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProcModulesSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every loaded module. Any failure here is fatal to the inventory.
    pub fn list_loaded(&self) -> Result<Vec<LoadedModule>, InventoryError> {
        let mut file = File::open(&self.path).map_err(|e| listing_error(&self.path, e))?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw).map_err(|e| listing_error(&self.path, e))?;

        let modules = parse_proc_modules(&String::from_utf8_lossy(&raw))?;
        debug!("Parsed {} loaded modules from {}", modules.len(), self.path.display());
        Ok(modules)
    }
}

/// Classify an IO failure on the module listing.
pub fn listing_error(path: &Path, e: std::io::Error) -> InventoryError {
    match e.kind() {
        ErrorKind::PermissionDenied => InventoryError::AccessDenied {
            path: path.to_path_buf(),
        },
        ErrorKind::NotFound => InventoryError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: "not found; is this a Linux system with module support?".to_string(),
        },
        _ => InventoryError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    }
}

/// Parse the full text of `/proc/modules`.
///
/// Lines with fewer than six fields are skipped, as are records with an
/// unknown status or a name already seen. A malformed number invalidates the
/// whole listing.
pub fn parse_proc_modules(content: &str) -> Result<Vec<LoadedModule>, InventoryError> {
    let mut modules = Vec::new();
    let mut seen = HashSet::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < MIN_FIELDS {
            if !parts.is_empty() {
                debug!("Skipping short line {}: {:?}", line_no, line);
            }
            continue;
        }

        let name = parts[0].to_string();
        let size = parse_count(parts[1], "size", line_no)?;
        // Kernels built without CONFIG_MODULE_UNLOAD print "-" for the refcount.
        let ref_count = if parts[2] == "-" {
            0
        } else {
            parse_count(parts[2], "refcount", line_no)?
        };
        let dependencies = parse_dependencies(parts[3]);
        let Some(status) = ModuleStatus::parse(parts[4]) else {
            warn!("Skipping {} on line {}: unknown status {:?}", name, line_no, parts[4]);
            continue;
        };
        let address = parts[5].to_string();

        if !seen.insert(name.clone()) {
            warn!("Skipping line {}: module {} listed twice", line_no, name);
            continue;
        }

        modules.push(LoadedModule::new(
            name,
            size,
            ref_count,
            dependencies,
            status,
            address,
        ));
    }

    Ok(modules)
}

fn parse_count(token: &str, field: &str, line: usize) -> Result<u64, InventoryError> {
    token.parse::<u64>().map_err(|e| InventoryError::ParseError {
        line,
        message: format!("invalid {} {:?}: {}", field, token, e),
    })
}

/// Split the "used by" column. `-` means none; bracketed markers such as
/// `[permanent]` are dropped; repeats keep their first position.
pub fn parse_dependencies(field: &str) -> Vec<String> {
    if field == "-" {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    field
        .split(',')
        .map(str::trim)
        .filter(|dep| !dep.is_empty() && !dep.starts_with('['))
        .filter(|dep| seen.insert(dep.to_string()))
        .map(str::to_string)
        .collect()
}

/// Fill in file path, description and signature for one loaded module.
/// Failures leave the defaults in place.
pub fn resolve_details(
    mut module: LoadedModule,
    locator: &ModuleLocator,
    reader: &dyn MetadataReader,
) -> LoadedModule {
    let Some(path) = locator.locate(&module.name) else {
        debug!("No module file found for {}", module.name);
        return module;
    };

    module.file_path = path.to_string_lossy().into_owned();
    match reader.read(&path) {
        Ok(metadata) => {
            module.description = metadata.metadata.description;
            module.signed = metadata.signed;
        }
        Err(e) => warn!("Could not read metadata for {}: {}", module.name, e),
    }
    module
}
