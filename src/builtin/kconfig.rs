//! Builtin names guessed from the kernel build configuration
use crate::builtin::{BuiltinEvidence, EvidenceSource};
use crate::error::InventoryError;
use flate2::read::GzDecoder;
use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

const BUILTIN_FLAG_PATTERN: &str = r"CONFIG_([A-Z0-9_]+)_BUILTIN=y";

pub struct KernelConfigHeuristic {
    candidates: Vec<PathBuf>,
}

impl KernelConfigHeuristic {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        KernelConfigHeuristic { candidates }
    }
}

/// Read a config file, decompressing it when the name ends in `.gz`.
pub fn read_config_text(path: &Path) -> Result<String, InventoryError> {
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut text = String::new();
        GzDecoder::new(File::open(path)?).read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Names from `CONFIG_<FLAG>_BUILTIN=y` lines. The flag is lowercased and
/// its underscores dropped, so the result is a loose guess.
pub fn parse_builtin_flags(config: &str) -> Result<BTreeSet<String>, InventoryError> {
    let pattern = Regex::new(BUILTIN_FLAG_PATTERN)?;
    let names = config
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| pattern.captures(line))
        .map(|caps| caps[1].to_lowercase().replace('_', ""))
        .collect();
    Ok(names)
}

impl BuiltinEvidence for KernelConfigHeuristic {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::KernelConfig
    }

    fn builtin_names(&mut self) -> Result<BTreeSet<String>, InventoryError> {
        let mut names = BTreeSet::new();
        for path in self.candidates.iter().filter(|p| p.exists()) {
            match read_config_text(path).and_then(|text| parse_builtin_flags(&text)) {
                Ok(found) => {
                    debug!("{}: {} builtin flags", path.display(), found.len());
                    names.extend(found);
                }
                Err(e) => warn!("Error reading {}: {}", path.display(), e),
            }
        }
        Ok(names)
    }
}
