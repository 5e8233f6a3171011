//! Kernel module data structures
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Extensions of loadable module files, longest first so compressed
/// suffixes are stripped before the plain one.
pub const MODULE_EXTENSIONS: [&str; 4] = [".ko.zst", ".ko.xz", ".ko.gz", ".ko"];

/// Canonical identity of a module name. The kernel treats `-` and `_`
/// as the same character in module names.
pub fn module_key(name: &str) -> String {
    name.replace('-', "_")
}

/// Strip a module file extension from a base name, if it has one.
pub fn strip_module_extension(file_name: &str) -> Option<&str> {
    MODULE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .filter(|stem| !stem.is_empty())
}

/// Derive a module name from a path such as `kernel/fs/ext4/ext4.ko`.
pub fn module_name_from_path(path: &str) -> Option<String> {
    let base = path.rsplit('/').next().unwrap_or(path);
    strip_module_extension(base.trim()).map(|s| s.to_string())
}

/// Convert bytes to a human readable size.
pub fn format_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// Lifecycle state reported by the kernel for a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModuleStatus {
    Live,
    Loading,
    Unloading,
    Dead,
}

impl ModuleStatus {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "Live" => Some(ModuleStatus::Live),
            "Loading" => Some(ModuleStatus::Loading),
            "Unloading" => Some(ModuleStatus::Unloading),
            "Dead" => Some(ModuleStatus::Dead),
            _ => None,
        }
    }

    /// Case-insensitive variant used for user supplied filters.
    pub fn parse_loose(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let first = chars.next()?;
        let normalized: String = first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect();
        Self::parse(&normalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Live => "Live",
            ModuleStatus::Loading => "Loading",
            ModuleStatus::Unloading => "Unloading",
            ModuleStatus::Dead => "Dead",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a module binary carries a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SignatureState {
    Signed,
    Unsigned,
    #[default]
    Unknown,
}

impl SignatureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureState::Signed => "Signed",
            SignatureState::Unsigned => "Unsigned",
            SignatureState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SignatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive fields shared by several metadata sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleMetadata {
    pub description: String,
    pub version: String,
    pub author: String,
    pub license: String,
}

impl ModuleMetadata {
    pub fn is_empty(&self) -> bool {
        self.description.is_empty()
            && self.version.is_empty()
            && self.author.is_empty()
            && self.license.is_empty()
    }

    /// Build from `field -> value` pairs, ignoring unrelated fields.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        ModuleMetadata {
            description: get("description"),
            version: get("version"),
            author: get("author"),
            license: get("license"),
        }
    }
}

/// A module currently resident in the kernel.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LoadedModule {
    pub name: String,
    pub size: u64,
    pub ref_count: u64,
    /// Modules using this one, in the order the kernel reported them.
    pub dependencies: Vec<String>,
    pub status: ModuleStatus,
    /// Load address, or a zeroed placeholder under restricted privilege.
    pub address: String,
    /// Backing `.ko` file; empty when it could not be resolved.
    pub file_path: String,
    pub description: String,
    pub signed: SignatureState,
}

impl LoadedModule {
    pub fn new(
        name: String,
        size: u64,
        ref_count: u64,
        dependencies: Vec<String>,
        status: ModuleStatus,
        address: String,
    ) -> Self {
        LoadedModule {
            name,
            size,
            ref_count,
            dependencies,
            status,
            address,
            file_path: String::new(),
            description: String::new(),
            signed: SignatureState::Unknown,
        }
    }

    /// Re-serialise the core fields in `/proc/modules` layout.
    pub fn to_proc_line(&self) -> String {
        let deps = if self.dependencies.is_empty() {
            "-".to_string()
        } else {
            let mut joined = self.dependencies.join(",");
            joined.push(',');
            joined
        };
        format!(
            "{} {} {} {} {} {}",
            self.name, self.size, self.ref_count, deps, self.status, self.address
        )
    }
}

impl fmt::Display for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deps = if self.dependencies.is_empty() {
            "None".to_string()
        } else {
            self.dependencies.join(", ")
        };
        let file_path = if self.file_path.is_empty() {
            "N/A"
        } else {
            &self.file_path
        };
        writeln!(f, "Module: {} (loadable)", self.name)?;
        writeln!(f, "  Size: {} bytes", self.size)?;
        writeln!(f, "  Reference Count: {}", self.ref_count)?;
        writeln!(f, "  Dependencies: {}", deps)?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Address: {}", self.address)?;
        writeln!(f, "  File Path: {}", file_path)?;
        if !self.description.is_empty() {
            writeln!(f, "  Description: {}", self.description)?;
        }
        writeln!(f, "  Signature: {}", self.signed)
    }
}

/// A module compiled into the kernel image.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BuiltinModule {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub license: String,
}

impl BuiltinModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_metadata(name, ModuleMetadata::default())
    }

    pub fn with_metadata(name: impl Into<String>, metadata: ModuleMetadata) -> Self {
        BuiltinModule {
            name: name.into(),
            description: metadata.description,
            version: metadata.version,
            author: metadata.author,
            license: metadata.license,
        }
    }
}

impl fmt::Display for BuiltinModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Module: {} (builtin)", self.name)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  Version: {}", self.version)?;
        writeln!(f, "  Author: {}", self.author)?;
        writeln!(f, "  License: {}", self.license)
    }
}

/// A module file on disk that is neither loaded nor builtin.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UnloadedModule {
    pub name: String,
    pub file_path: String,
    pub size: u64,
    pub description: String,
}

impl fmt::Display for UnloadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Module: {} (not loaded)", self.name)?;
        writeln!(f, "  File Path: {}", self.file_path)?;
        writeln!(f, "  File Size: {} bytes", self.size)?;
        writeln!(f, "  Description: {}", self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleKind {
    Loaded,
    Builtin,
    Unloaded,
}

impl ModuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            ModuleKind::Loaded => "Loadable",
            ModuleKind::Builtin => "Builtin",
            ModuleKind::Unloaded => "Unloaded",
        }
    }
}

/// Any catalog entry, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleRecord {
    Loaded(LoadedModule),
    Builtin(BuiltinModule),
    Unloaded(UnloadedModule),
}

impl ModuleRecord {
    pub fn name(&self) -> &str {
        match self {
            ModuleRecord::Loaded(m) => &m.name,
            ModuleRecord::Builtin(m) => &m.name,
            ModuleRecord::Unloaded(m) => &m.name,
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleRecord::Loaded(_) => ModuleKind::Loaded,
            ModuleRecord::Builtin(_) => ModuleKind::Builtin,
            ModuleRecord::Unloaded(_) => ModuleKind::Unloaded,
        }
    }

    pub fn as_loaded(&self) -> Option<&LoadedModule> {
        match self {
            ModuleRecord::Loaded(m) => Some(m),
            _ => None,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ModuleRecord::Loaded(m) => &m.description,
            ModuleRecord::Builtin(m) => &m.description,
            ModuleRecord::Unloaded(m) => &m.description,
        }
    }
}

/// The reconciled inventory. A name appears in at most one of the three lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleCatalog {
    pub loaded: Vec<LoadedModule>,
    pub builtin: Vec<BuiltinModule>,
    pub unloaded: Vec<UnloadedModule>,
}

impl ModuleCatalog {
    pub fn total(&self) -> usize {
        self.loaded.len() + self.builtin.len() + self.unloaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Merged view in loaded, builtin, unloaded order.
    pub fn records(&self) -> Vec<ModuleRecord> {
        let mut records = Vec::with_capacity(self.total());
        records.extend(self.loaded.iter().cloned().map(ModuleRecord::Loaded));
        records.extend(self.builtin.iter().cloned().map(ModuleRecord::Builtin));
        records.extend(self.unloaded.iter().cloned().map(ModuleRecord::Unloaded));
        records
    }

    /// Rebuild a catalog from a merged view, keeping record order within each kind.
    pub fn from_records(records: Vec<ModuleRecord>) -> Self {
        let mut catalog = ModuleCatalog::default();
        for record in records {
            match record {
                ModuleRecord::Loaded(m) => catalog.loaded.push(m),
                ModuleRecord::Builtin(m) => catalog.builtin.push(m),
                ModuleRecord::Unloaded(m) => catalog.unloaded.push(m),
            }
        }
        catalog
    }

    /// True when no name occurs in more than one list (or twice in one).
    pub fn names_are_unique(&self) -> bool {
        let mut seen = HashSet::new();
        self.records()
            .iter()
            .all(|record| seen.insert(module_key(record.name())))
    }

    pub fn total_loaded_size(&self) -> u64 {
        self.loaded.iter().map(|m| m.size).sum()
    }

    /// Loaded module count per status, in first-seen order.
    pub fn status_summary(&self) -> Vec<(ModuleStatus, usize)> {
        let mut summary: Vec<(ModuleStatus, usize)> = Vec::new();
        for module in &self.loaded {
            match summary.iter_mut().find(|(status, _)| *status == module.status) {
                Some((_, count)) => *count += 1,
                None => summary.push((module.status, 1)),
            }
        }
        summary
    }

    /// The kernel zeroes module addresses for readers without CAP_SYSLOG.
    pub fn addresses_masked(&self) -> bool {
        !self.loaded.is_empty()
            && self
                .loaded
                .iter()
                .all(|m| m.address.trim_start_matches("0x").chars().all(|c| c == '0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(name: &str, size: u64, status: ModuleStatus, address: &str) -> LoadedModule {
        LoadedModule::new(name.to_string(), size, 0, vec![], status, address.to_string())
    }

    #[test]
    fn test_format_size() {
        let cases = [
            (1024, "1.0 KB"),
            (1536, "1.5 KB"),
            (1048576, "1.0 MB"),
            (1073741824, "1.0 GB"),
            (512, "512.0 B"),
            (0, "0.0 B"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(format_size(bytes), expected, "size {}", bytes);
        }
    }

    #[test]
    fn test_strip_module_extension() {
        assert_eq!(strip_module_extension("ext4.ko"), Some("ext4"));
        assert_eq!(strip_module_extension("ext4.ko.zst"), Some("ext4"));
        assert_eq!(strip_module_extension("snd-hda.ko.xz"), Some("snd-hda"));
        assert_eq!(strip_module_extension("README"), None);
        assert_eq!(strip_module_extension(".ko"), None);
    }

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(
            module_name_from_path("kernel/fs/ext4/ext4.ko").as_deref(),
            Some("ext4")
        );
        assert_eq!(
            module_name_from_path("kernel/drivers/usb/core/usbcore.ko.zst").as_deref(),
            Some("usbcore")
        );
        assert_eq!(module_name_from_path("kernel/fs/ext4/"), None);
    }

    #[test]
    fn test_module_key_treats_dash_as_underscore() {
        assert_eq!(module_key("snd-hda-intel"), module_key("snd_hda_intel"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(ModuleStatus::parse("Live"), Some(ModuleStatus::Live));
        assert_eq!(ModuleStatus::parse("live"), None);
        assert_eq!(ModuleStatus::parse_loose("unloading"), Some(ModuleStatus::Unloading));
        assert_eq!(ModuleStatus::parse_loose("LIVE"), Some(ModuleStatus::Live));
        assert_eq!(ModuleStatus::parse_loose(""), None);
    }

    #[test]
    fn test_to_proc_line() {
        let mut module = loaded("snd", 1024, ModuleStatus::Live, "0xffffffffc0a00000");
        assert_eq!(module.to_proc_line(), "snd 1024 0 - Live 0xffffffffc0a00000");

        module.dependencies = vec!["snd_pcm".to_string(), "snd_timer".to_string()];
        module.ref_count = 2;
        assert_eq!(
            module.to_proc_line(),
            "snd 1024 2 snd_pcm,snd_timer, Live 0xffffffffc0a00000"
        );
    }

    #[test]
    fn test_catalog_summary_helpers() {
        let catalog = ModuleCatalog {
            loaded: vec![
                loaded("a", 100, ModuleStatus::Live, "0x0000000000000000"),
                loaded("b", 200, ModuleStatus::Unloading, "0x0000000000000000"),
                loaded("c", 300, ModuleStatus::Live, "0x0000000000000000"),
            ],
            builtin: vec![BuiltinModule::new("d")],
            unloaded: vec![],
        };

        assert_eq!(catalog.total(), 4);
        assert_eq!(catalog.total_loaded_size(), 600);
        assert_eq!(
            catalog.status_summary(),
            vec![(ModuleStatus::Live, 2), (ModuleStatus::Unloading, 1)]
        );
        assert!(catalog.addresses_masked());
        assert!(catalog.names_are_unique());
    }

    #[test]
    fn test_addresses_not_masked_with_real_address() {
        let catalog = ModuleCatalog {
            loaded: vec![loaded("a", 1, ModuleStatus::Live, "0xffffffffc0a00000")],
            ..Default::default()
        };
        assert!(!catalog.addresses_masked());
        assert!(!ModuleCatalog::default().addresses_masked());
    }

    #[test]
    fn test_names_are_unique_detects_cross_list_duplicates() {
        let catalog = ModuleCatalog {
            loaded: vec![loaded("snd-hda", 1, ModuleStatus::Live, "0x0")],
            builtin: vec![BuiltinModule::new("snd_hda")],
            unloaded: vec![],
        };
        assert!(!catalog.names_are_unique());
    }

    #[test]
    fn test_records_round_trip_through_catalog() {
        let catalog = ModuleCatalog {
            loaded: vec![loaded("a", 1, ModuleStatus::Live, "0x0")],
            builtin: vec![BuiltinModule::new("b")],
            unloaded: vec![UnloadedModule {
                name: "c".to_string(),
                file_path: "/lib/modules/x/c.ko".to_string(),
                size: 10,
                description: String::new(),
            }],
        };
        let kinds: Vec<ModuleKind> = catalog.records().iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![ModuleKind::Loaded, ModuleKind::Builtin, ModuleKind::Unloaded]
        );
        assert_eq!(ModuleCatalog::from_records(catalog.records()), catalog);
    }
}
