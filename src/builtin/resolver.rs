//! Merges builtin evidence into the builtin module list
use crate::builtin::{
    BuiltinEvidence, BuiltinListFile, BulkModinfoFile, EvidenceSource, KernelConfigHeuristic,
    Membership, ModinfoTool, SourceTreeHeuristic,
};
use crate::command::CommandRunner;
use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::kernel::{module_key, BuiltinModule, ModuleMetadata};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

struct Producer {
    evidence: Box<dyn BuiltinEvidence>,
    failed: bool,
}

impl Producer {
    fn source(&self) -> EvidenceSource {
        self.evidence.source()
    }

    fn record_failure(&mut self, error: InventoryError) {
        if !self.failed {
            warn!("{}", error);
            self.failed = true;
        }
    }

    fn names(&mut self) -> BTreeSet<String> {
        if self.failed {
            return BTreeSet::new();
        }
        match self.evidence.builtin_names() {
            Ok(names) => names,
            Err(e) => {
                self.record_failure(e);
                BTreeSet::new()
            }
        }
    }

    fn metadata(&mut self, name: &str) -> Option<ModuleMetadata> {
        if self.failed {
            return None;
        }
        match self.evidence.metadata(name) {
            Ok(metadata) => metadata.filter(|m| !m.is_empty()),
            Err(e) => {
                self.record_failure(e);
                None
            }
        }
    }
}

pub struct BuiltinResolver {
    producers: Vec<Producer>,
}

impl BuiltinResolver {
    pub fn new(producers: Vec<Box<dyn BuiltinEvidence>>) -> Self {
        BuiltinResolver {
            producers: producers
                .into_iter()
                .map(|evidence| Producer {
                    evidence,
                    failed: false,
                })
                .collect(),
        }
    }

    /// The standard producers for the configured kernel.
    pub fn from_config(config: &InventoryConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let paths = &config.paths;
        let mut producers: Vec<Box<dyn BuiltinEvidence>> = vec![
            Box::new(BuiltinListFile::new(&paths.builtin_list)),
            Box::new(KernelConfigHeuristic::new(paths.config_candidates.clone())),
        ];
        if config.external_tools {
            producers.push(Box::new(ModinfoTool::new(runner, &config.modinfo_program)));
        }
        producers.push(Box::new(BulkModinfoFile::new(&paths.builtin_modinfo)));
        match SourceTreeHeuristic::new(paths.source_roots.clone()) {
            Ok(heuristic) => producers.push(Box::new(heuristic)),
            Err(e) => warn!("Kernel source heuristic disabled: {}", e),
        }
        Self::new(producers)
    }

    fn union_of(&mut self, membership: Membership) -> BTreeMap<String, String> {
        let mut names = BTreeMap::new();
        for producer in &mut self.producers {
            if producer.source().precedence().membership != membership {
                continue;
            }
            let found = producer.names();
            debug!("{} reported {} builtin names", producer.source().label(), found.len());
            for name in found {
                names.entry(module_key(&name)).or_insert(name);
            }
        }
        names
    }

    fn enrich(&mut self, name: &str) -> ModuleMetadata {
        let mut ranked: Vec<(u8, usize)> = self
            .producers
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.source().precedence().enrichment_rank.map(|rank| (rank, i)))
            .collect();
        ranked.sort();

        for (_, i) in ranked {
            if let Some(metadata) = self.producers[i].metadata(name) {
                return metadata;
            }
        }
        ModuleMetadata::default()
    }

    /// Builtin module names without metadata, one per identity.
    ///
    /// The authoritative list decides membership whenever it names anything.
    /// Otherwise the fallback producers are unioned and every loaded name is
    /// removed from the result.
    pub fn members(&mut self, loaded_names: &HashSet<String>) -> Vec<String> {
        let mut names = self.union_of(Membership::Authoritative);
        if names.is_empty() {
            warn!("No authoritative builtin list, using fallback sources");
            let loaded_keys: HashSet<String> = loaded_names.iter().map(|n| module_key(n)).collect();
            names = self.union_of(Membership::Fallback);
            names.retain(|key, _| !loaded_keys.contains(key));
        }
        names.into_values().collect()
    }

    /// Builtin modules with enrichment applied, sorted by name.
    pub fn resolve(&mut self, loaded_names: &HashSet<String>) -> Vec<BuiltinModule> {
        let mut builtin: Vec<BuiltinModule> = self
            .members(loaded_names)
            .into_iter()
            .map(|name| {
                let metadata = self.enrich(&name);
                BuiltinModule::with_metadata(name, metadata)
            })
            .collect();
        builtin.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Found {} builtin modules", builtin.len());
        builtin
    }
}
