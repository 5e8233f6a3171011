//! Maps module names to their backing files
use crate::command::CommandRunner;
use crate::kernel::module_key;
use crate::sources::unloaded::ModuleFile;
use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Resolves a module name to a `.ko` path: first from the scanned module
/// directory, then by asking `modinfo -n`.
pub struct ModuleLocator {
    index: HashMap<String, PathBuf>,
    runner: Arc<dyn CommandRunner>,
    modinfo_program: String,
}

impl ModuleLocator {
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, PathBuf)>,
        runner: Arc<dyn CommandRunner>,
        modinfo_program: &str,
    ) -> Self {
        let mut index = HashMap::new();
        for (name, path) in entries {
            index.entry(module_key(&name)).or_insert(path);
        }
        ModuleLocator {
            index,
            runner,
            modinfo_program: modinfo_program.to_string(),
        }
    }

    pub fn from_files(
        files: &[ModuleFile],
        runner: Arc<dyn CommandRunner>,
        modinfo_program: &str,
    ) -> Self {
        Self::from_entries(
            files.iter().map(|f| (f.name.clone(), f.path.clone())),
            runner,
            modinfo_program,
        )
    }

    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        if let Some(path) = self.index.get(&module_key(name)) {
            return Some(path.clone());
        }

        let output = match self.runner.run_checked(&self.modinfo_program, &["-n", name]) {
            Ok(output) => output.stdout_text(),
            Err(e) => {
                debug!("modinfo lookup for {} failed: {}", name, e);
                return None;
            }
        };
        let location = output.lines().next().unwrap_or("").trim();
        if location.starts_with('/') {
            Some(PathBuf::from(location))
        } else {
            None
        }
    }
}
