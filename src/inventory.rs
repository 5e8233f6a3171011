//! One inventory pass: read every source and reconcile them into a catalog
use crate::builtin::{BuiltinEvidence, BuiltinResolver};
use crate::command::{CommandRunner, DisabledCommandRunner, SystemCommandRunner};
use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::kernel::{module_key, BuiltinModule, LoadedModule, ModuleCatalog, UnloadedModule};
use crate::metadata::{ElfMetadataReader, MetadataReader};
use crate::sources::loaded::resolve_details;
use crate::sources::{scan_module_files, ModuleLocator, ProcModulesSource, UnloadedScanner};
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

/// Owns the collaborators of an inventory pass.
pub struct Inventory {
    config: InventoryConfig,
    runner: Arc<dyn CommandRunner>,
    reader: Arc<dyn MetadataReader>,
    builtin: BuiltinResolver,
}

impl Inventory {
    pub fn new(config: InventoryConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = if config.external_tools {
            Arc::new(SystemCommandRunner)
        } else {
            Arc::new(DisabledCommandRunner)
        };
        let reader = Arc::new(ElfMetadataReader::new(runner.clone()));
        Self::with_collaborators(config, runner, reader)
    }

    pub fn with_collaborators(
        config: InventoryConfig,
        runner: Arc<dyn CommandRunner>,
        reader: Arc<dyn MetadataReader>,
    ) -> Self {
        let builtin = BuiltinResolver::from_config(&config, runner.clone());
        Inventory {
            config,
            runner,
            reader,
            builtin,
        }
    }

    /// Replace the standard builtin evidence producers.
    pub fn with_builtin_evidence(mut self, producers: Vec<Box<dyn BuiltinEvidence>>) -> Self {
        self.builtin = BuiltinResolver::new(producers);
        self
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn build(&mut self) -> Result<ModuleCatalog, InventoryError> {
        self.build_with_progress(|_| {})
    }

    /// Run the pass, reporting each stage to `progress`.
    ///
    /// Only a failure of the live module listing aborts the pass; every other
    /// source degrades to empty data.
    pub fn build_with_progress(
        &mut self,
        mut progress: impl FnMut(&str),
    ) -> Result<ModuleCatalog, InventoryError> {
        let paths = &self.config.paths;

        progress("Reading loaded modules");
        let mut loaded = ProcModulesSource::new(&paths.proc_modules).list_loaded()?;
        let loaded_names: HashSet<String> = loaded.iter().map(|m| m.name.clone()).collect();

        let files = if self.config.include_unloaded || self.config.resolve_details {
            progress("Scanning module directory");
            scan_module_files(&paths.modules_dir)
        } else {
            Vec::new()
        };
        debug!("{} module files under {}", files.len(), paths.modules_dir.display());

        if self.config.resolve_details {
            progress("Resolving loaded module details");
            let locator =
                ModuleLocator::from_files(&files, self.runner.clone(), &self.config.modinfo_program);
            loaded = loaded
                .into_iter()
                .map(|module| resolve_details(module, &locator, self.reader.as_ref()))
                .collect();
        }

        // Unloaded classification needs builtin membership even when the
        // builtin list itself is not reported.
        let builtin = if self.config.include_builtin {
            progress("Detecting builtin modules");
            self.builtin.resolve(&loaded_names)
        } else if self.config.include_unloaded {
            progress("Detecting builtin modules");
            self.builtin
                .members(&loaded_names)
                .into_iter()
                .map(BuiltinModule::new)
                .collect()
        } else {
            Vec::new()
        };

        let unloaded = if self.config.include_unloaded {
            progress("Reading unloaded module metadata");
            UnloadedScanner::new(&files, self.reader.as_ref()).list_unloaded(&loaded_names)
        } else {
            Vec::new()
        };

        let mut catalog = reconcile(loaded, builtin, unloaded);
        if !self.config.include_builtin {
            catalog.builtin.clear();
        }
        info!(
            "Inventory: {} loaded, {} builtin, {} unloaded",
            catalog.loaded.len(),
            catalog.builtin.len(),
            catalog.unloaded.len()
        );
        Ok(catalog)
    }
}

/// Merge the three sources so each name appears once, preferring loaded over
/// builtin over unloaded. Within a set the first record of a name is kept.
pub fn reconcile(
    loaded: Vec<LoadedModule>,
    builtin: Vec<BuiltinModule>,
    unloaded: Vec<UnloadedModule>,
) -> ModuleCatalog {
    let mut seen = HashSet::new();

    let loaded: Vec<LoadedModule> = loaded
        .into_iter()
        .filter(|m| seen.insert(module_key(&m.name)))
        .collect();

    let mut dropped = 0usize;
    let builtin: Vec<BuiltinModule> = builtin
        .into_iter()
        .filter(|m| {
            let fresh = seen.insert(module_key(&m.name));
            dropped += usize::from(!fresh);
            fresh
        })
        .collect();
    if dropped > 0 {
        debug!("{} builtin candidates are loaded and were dropped", dropped);
    }

    let mut unloaded: Vec<UnloadedModule> = unloaded
        .into_iter()
        .filter(|m| seen.insert(module_key(&m.name)))
        .collect();
    unloaded.sort_by(|a, b| a.name.cmp(&b.name));

    ModuleCatalog {
        loaded,
        builtin,
        unloaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::EvidenceSource;
    use crate::command::FixtureCommandRunner;
    use crate::config::KernelPaths;
    use crate::filter::{sort_loaded, ModuleFilter, SortField};
    use crate::kernel::{ModuleMetadata, ModuleStatus};
    use crate::metadata::FixtureMetadataReader;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const RELEASE: &str = "6.1.0-test";

    fn loaded(name: &str) -> LoadedModule {
        LoadedModule::new(name.to_string(), 100, 0, vec![], ModuleStatus::Live, "0x0".to_string())
    }

    fn unloaded(name: &str) -> UnloadedModule {
        UnloadedModule {
            name: name.to_string(),
            file_path: format!("/lib/modules/{}.ko", name),
            size: 1,
            description: String::new(),
        }
    }

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A root with A and B loaded, C listed as builtin and D.ko on disk.
    fn fixture_root() -> TempDir {
        let root = TempDir::new().unwrap();
        write(
            &root.path().join("proc/modules"),
            b"B 2048 1 A, Live 0xffffffffc0a00000\nA 1024 0 - Live 0xffffffffc0900000\n",
        );
        let moddir = root.path().join("lib/modules").join(RELEASE);
        write(&moddir.join("modules.builtin"), b"kernel/lib/C.ko\n");
        write(&moddir.join("kernel/drivers/D.ko"), b"not an elf");
        write(&moddir.join("kernel/drivers/A.ko"), b"not an elf");
        root
    }

    fn fixture_inventory(root: &Path) -> Inventory {
        let mut config = InventoryConfig::new(KernelPaths::for_release(root, RELEASE));
        config.external_tools = false;
        Inventory::with_collaborators(
            config,
            Arc::new(FixtureCommandRunner::new()),
            Arc::new(FixtureMetadataReader::new()),
        )
    }

    #[test]
    fn test_reconcile_prefers_loaded_then_builtin() {
        let catalog = reconcile(
            vec![loaded("ext4"), loaded("loop")],
            vec![BuiltinModule::new("ext4"), BuiltinModule::new("crc32c")],
            vec![unloaded("crc32c"), unloaded("zram"), unloaded("loop"), unloaded("dummy")],
        );
        let builtin: Vec<&str> = catalog.builtin.iter().map(|m| m.name.as_str()).collect();
        let unloaded: Vec<&str> = catalog.unloaded.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(catalog.loaded.len(), 2);
        assert_eq!(builtin, vec!["crc32c"]);
        assert_eq!(unloaded, vec!["dummy", "zram"]);
        assert!(catalog.names_are_unique());
    }

    #[test]
    fn test_reconcile_treats_dash_and_underscore_alike() {
        let catalog = reconcile(
            vec![loaded("snd_hda_intel")],
            vec![BuiltinModule::new("snd-hda-intel")],
            vec![],
        );
        assert!(catalog.builtin.is_empty());
    }

    #[test]
    fn test_end_to_end_fixture() {
        let root = fixture_root();
        let catalog = fixture_inventory(root.path()).build().unwrap();

        let names = |v: Vec<&str>| v.into_iter().map(str::to_string).collect::<BTreeSet<_>>();
        assert_eq!(
            catalog.loaded.iter().map(|m| m.name.clone()).collect::<BTreeSet<_>>(),
            names(vec!["A", "B"])
        );
        assert_eq!(catalog.builtin.len(), 1);
        assert_eq!(catalog.builtin[0].name, "C");
        assert_eq!(catalog.unloaded.len(), 1);
        assert_eq!(catalog.unloaded[0].name, "D");

        let b = catalog.loaded.iter().find(|m| m.name == "B").unwrap();
        assert_eq!(b.dependencies, vec!["A"]);
        assert_eq!(b.ref_count, 1);

        let filter = ModuleFilter {
            min_size: Some(2000),
            ..ModuleFilter::default()
        };
        let filtered = filter.compile().unwrap().apply(catalog.records());
        let filtered_names: Vec<&str> = filtered.iter().map(|r| r.name()).collect();
        // Size predicates pass builtin and unloaded records through.
        assert_eq!(filtered_names, vec!["B", "C", "D"]);
        let loaded_only: Vec<&str> = filtered
            .iter()
            .filter_map(|r| r.as_loaded())
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(loaded_only, vec!["B"]);

        let mut by_size = catalog.loaded.clone();
        sort_loaded(&mut by_size, SortField::Size, true);
        let order: Vec<&str> = by_size.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_builtin_file_on_disk_is_never_unloaded() {
        let root = fixture_root();
        let moddir = root.path().join("lib/modules").join(RELEASE);
        write(&moddir.join("kernel/lib/C.ko"), b"not an elf");

        for include_builtin in [true, false] {
            let mut config = InventoryConfig::new(KernelPaths::for_release(root.path(), RELEASE));
            config.external_tools = false;
            config.include_builtin = include_builtin;
            config.include_unloaded = true;
            let mut inventory = Inventory::with_collaborators(
                config,
                Arc::new(FixtureCommandRunner::new()),
                Arc::new(FixtureMetadataReader::new()),
            );

            let catalog = inventory.build().unwrap();
            let unloaded: Vec<&str> = catalog.unloaded.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(unloaded, vec!["D"], "include_builtin={}", include_builtin);
            let builtin: Vec<&str> = catalog.builtin.iter().map(|m| m.name.as_str()).collect();
            if include_builtin {
                assert_eq!(builtin, vec!["C"]);
            } else {
                assert!(builtin.is_empty());
            }
        }
    }

    #[test]
    fn test_missing_builtin_list_excludes_loaded_names() {
        let root = fixture_root();
        let moddir = root.path().join("lib/modules").join(RELEASE);
        fs::remove_file(moddir.join("modules.builtin")).unwrap();
        write(
            &root.path().join("proc/modules"),
            b"crc32 4096 0 - Live 0x0000000000000000\n",
        );
        write(
            &root.path().join(format!("boot/config-{}", RELEASE)),
            b"CONFIG_ZLIB_BUILTIN=y\nCONFIG_CRC32_BUILTIN=y\n",
        );

        let catalog = fixture_inventory(root.path()).build().unwrap();
        let builtin: Vec<&str> = catalog.builtin.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(builtin, vec!["zlib"]);
        assert_eq!(catalog.loaded[0].name, "crc32");
    }

    #[test]
    fn test_injected_builtin_evidence_is_enriched() {
        struct Evidence;
        impl BuiltinEvidence for Evidence {
            fn source(&self) -> EvidenceSource {
                EvidenceSource::BuiltinList
            }
            fn builtin_names(&mut self) -> Result<BTreeSet<String>, InventoryError> {
                Ok(["B", "ext4"].iter().map(|s| s.to_string()).collect())
            }
        }
        struct Bulk;
        impl BuiltinEvidence for Bulk {
            fn source(&self) -> EvidenceSource {
                EvidenceSource::BulkModinfo
            }
            fn metadata(&mut self, name: &str) -> Result<Option<ModuleMetadata>, InventoryError> {
                Ok((name == "ext4").then(|| ModuleMetadata {
                    license: "GPL".to_string(),
                    ..ModuleMetadata::default()
                }))
            }
        }

        let root = fixture_root();
        let mut inventory = fixture_inventory(root.path())
            .with_builtin_evidence(vec![Box::new(Evidence), Box::new(Bulk)]);
        let catalog = inventory.build().unwrap();
        assert_eq!(catalog.builtin.len(), 1);
        assert_eq!(catalog.builtin[0].name, "ext4");
        assert_eq!(catalog.builtin[0].license, "GPL");
    }

    #[test]
    fn test_missing_proc_modules_is_fatal() {
        let root = TempDir::new().unwrap();
        let err = fixture_inventory(root.path()).build().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_resolve_details_uses_scanned_files() {
        let root = fixture_root();
        let a_path = root
            .path()
            .join("lib/modules")
            .join(RELEASE)
            .join("kernel/drivers/A.ko");
        let mut config = InventoryConfig::new(KernelPaths::for_release(root.path(), RELEASE));
        config.external_tools = false;
        config.resolve_details = true;
        config.include_unloaded = false;
        let mut inventory = Inventory::with_collaborators(
            config,
            Arc::new(FixtureCommandRunner::new()),
            Arc::new(FixtureMetadataReader::new().with_description(&a_path, "Module A")),
        );

        let catalog = inventory.build().unwrap();
        let a = catalog.loaded.iter().find(|m| m.name == "A").unwrap();
        assert_eq!(a.file_path, a_path.to_string_lossy());
        assert_eq!(a.description, "Module A");
        assert!(catalog.unloaded.is_empty());
    }
}
