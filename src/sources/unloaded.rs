//! On-disk module scan
use crate::kernel::{module_key, strip_module_extension, UnloadedModule};
use crate::metadata::MetadataReader;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A module file found below the module directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    pub name: String,
    pub path: PathBuf,
}

/// Recursively collect module files below `dir`, sorted by name then path.
///
/// Symlinked directories (`build`, `source`) are not followed. A missing
/// directory yields an empty list.
pub fn scan_module_files(dir: &Path) -> Vec<ModuleFile> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        debug!("Module directory {} does not exist", dir.display());
        return files;
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read {}: {}", current.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !(file_type.is_file() || (file_type.is_symlink() && path.is_file())) {
                continue;
            }

            let file_name = entry.file_name();
            if let Some(name) = strip_module_extension(&file_name.to_string_lossy()) {
                files.push(ModuleFile {
                    name: name.to_string(),
                    path,
                });
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    files
}

/// Turns scanned module files into unloaded records.
pub struct UnloadedScanner<'a> {
    files: &'a [ModuleFile],
    reader: &'a dyn MetadataReader,
}

impl<'a> UnloadedScanner<'a> {
    pub fn new(files: &'a [ModuleFile], reader: &'a dyn MetadataReader) -> Self {
        UnloadedScanner { files, reader }
    }

    /// Every scanned module whose name is not loaded, sorted by name. A name
    /// found in several places keeps its first file.
    pub fn list_unloaded(&self, loaded_names: &HashSet<String>) -> Vec<UnloadedModule> {
        let loaded_keys: HashSet<String> = loaded_names.iter().map(|n| module_key(n)).collect();
        let mut seen = HashSet::new();
        let mut unloaded = Vec::new();
        let mut metadata_failures = 0usize;

        for file in self.files {
            let key = module_key(&file.name);
            if loaded_keys.contains(&key) || !seen.insert(key) {
                continue;
            }

            let size = fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0);
            let description = match self.reader.read(&file.path) {
                Ok(metadata) => metadata.metadata.description,
                Err(e) => {
                    debug!("No metadata for {}: {}", file.path.display(), e);
                    metadata_failures += 1;
                    String::new()
                }
            };

            unloaded.push(UnloadedModule {
                name: file.name.clone(),
                file_path: file.path.to_string_lossy().into_owned(),
                size,
                description,
            });
        }

        if metadata_failures > 0 {
            warn!(
                "Could not read metadata from {} of {} unloaded module files",
                metadata_failures,
                unloaded.len()
            );
        }
        info!("Found {} unloaded modules on disk", unloaded.len());
        unloaded.sort_by(|a, b| a.name.cmp(&b.name));
        unloaded
    }
}

/// Convenience wrapper: scan `dir` and list the modules that are not loaded.
pub fn list_unloaded(
    dir: &Path,
    loaded_names: &HashSet<String>,
    reader: &dyn MetadataReader,
) -> Vec<UnloadedModule> {
    let files = scan_module_files(dir);
    UnloadedScanner::new(&files, reader).list_unloaded(loaded_names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FixtureMetadataReader;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn touch(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_scan_strips_compressed_then_plain_extension() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("kernel/fs/ext4/ext4.ko.zst"), b"x");
        touch(&dir.path().join("kernel/drivers/net/dummy.ko"), b"x");
        touch(&dir.path().join("kernel/drivers/net/README"), b"x");
        touch(&dir.path().join("modules.dep"), b"x");

        let names: Vec<String> = scan_module_files(dir.path())
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["dummy", "ext4"]);
    }

    #[test]
    fn test_scan_does_not_follow_symlinked_dirs() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        touch(&elsewhere.path().join("drivers/foo.ko"), b"x");
        symlink(elsewhere.path(), dir.path().join("build")).unwrap();
        touch(&dir.path().join("kernel/bar.ko"), b"x");

        let names: Vec<String> = scan_module_files(dir.path())
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["bar"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let reader = FixtureMetadataReader::new();
        let unloaded = list_unloaded(&dir.path().join("nope"), &HashSet::new(), &reader);
        assert!(unloaded.is_empty());
    }

    #[test]
    fn test_list_unloaded_skips_loaded_and_reads_metadata() {
        let dir = TempDir::new().unwrap();
        let dummy = dir.path().join("kernel/drivers/net/dummy.ko");
        let loop_ko = dir.path().join("kernel/drivers/block/loop.ko");
        let hda = dir.path().join("kernel/sound/snd-hda-intel.ko.xz");
        touch(&dummy, &[0u8; 2048]);
        touch(&loop_ko, &[0u8; 10]);
        touch(&hda, &[0u8; 10]);

        let reader = FixtureMetadataReader::new().with_description(&dummy, "Dummy netdevice driver");
        let loaded: HashSet<String> = ["loop", "snd_hda_intel"].iter().map(|s| s.to_string()).collect();

        let unloaded = list_unloaded(dir.path(), &loaded, &reader);
        assert_eq!(unloaded.len(), 1);
        assert_eq!(unloaded[0].name, "dummy");
        assert_eq!(unloaded[0].size, 2048);
        assert_eq!(unloaded[0].description, "Dummy netdevice driver");
        assert_eq!(unloaded[0].file_path, dummy.to_string_lossy());
    }

    #[test]
    fn test_metadata_failure_leaves_description_empty() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.ko"), b"x");
        let reader = FixtureMetadataReader::new();

        let unloaded = list_unloaded(dir.path(), &HashSet::new(), &reader);
        assert_eq!(unloaded.len(), 1);
        assert_eq!(unloaded[0].description, "");
        assert_eq!(unloaded[0].size, 1);
    }

    #[test]
    fn test_duplicate_names_keep_first_file() {
        let files = vec![
            ModuleFile {
                name: "e1000".to_string(),
                path: PathBuf::from("/nonexistent/kernel/e1000.ko"),
            },
            ModuleFile {
                name: "e1000".to_string(),
                path: PathBuf::from("/nonexistent/updates/e1000.ko"),
            },
        ];
        let reader = FixtureMetadataReader::new();
        let unloaded = UnloadedScanner::new(&files, &reader).list_unloaded(&HashSet::new());
        assert_eq!(unloaded.len(), 1);
        assert_eq!(unloaded[0].file_path, "/nonexistent/kernel/e1000.ko");
        assert_eq!(unloaded[0].size, 0);
    }
}
