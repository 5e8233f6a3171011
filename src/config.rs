//! Filesystem locations and switches for an inventory pass
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

const HOST_OSRELEASE: &str = "/proc/sys/kernel/osrelease";

/// Every location the inventory reads, resolved against a root directory.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPaths {
    pub root: PathBuf,
    pub release: String,
    pub proc_modules: PathBuf,
    pub modules_dir: PathBuf,
    pub builtin_list: PathBuf,
    pub builtin_modinfo: PathBuf,
    /// Kernel build configuration files; every one that exists is read.
    pub config_candidates: Vec<PathBuf>,
    /// Directories that may hold kernel sources, most specific first.
    pub source_roots: Vec<PathBuf>,
}

impl KernelPaths {
    /// Lay out the standard locations for `release` below `root`.
    pub fn for_release(root: impl AsRef<Path>, release: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        let modules_dir = root.join("lib/modules").join(release);

        KernelPaths {
            proc_modules: root.join("proc/modules"),
            builtin_list: modules_dir.join("modules.builtin"),
            builtin_modinfo: modules_dir.join("modules.builtin.modinfo"),
            config_candidates: vec![
                root.join("proc/config.gz"),
                root.join(format!("boot/config-{}", release)),
                root.join("boot/config"),
            ],
            source_roots: vec![
                modules_dir.join("build"),
                modules_dir.join("source"),
                root.join(format!("usr/src/linux-{}", release)),
                root.join(format!("usr/src/linux-headers-{}", release)),
                root.join("usr/src/linux"),
            ],
            modules_dir,
            release: release.to_string(),
            root,
        }
    }

    /// Resolve the running kernel release and lay out paths below `root`.
    pub fn detect(root: impl AsRef<Path>, release_override: Option<&str>) -> Self {
        let root = root.as_ref();
        let release = match release_override {
            Some(release) => release.to_string(),
            None => detect_release(root),
        };
        debug!("Using kernel release {:?} under {}", release, root.display());
        Self::for_release(root, &release)
    }
}

impl Default for KernelPaths {
    fn default() -> Self {
        Self::detect("/", None)
    }
}

/// Read the kernel release from `<root>/proc/sys/kernel/osrelease`, falling
/// back to the host's value.
pub fn detect_release(root: &Path) -> String {
    let candidates = [root.join("proc/sys/kernel/osrelease"), PathBuf::from(HOST_OSRELEASE)];
    for candidate in &candidates {
        match fs::read_to_string(candidate) {
            Ok(content) => {
                let release = content.trim();
                if !release.is_empty() {
                    return release.to_string();
                }
            }
            Err(e) => debug!("Cannot read {}: {}", candidate.display(), e),
        }
    }
    warn!("Could not determine the kernel release; module directory lookups will be empty");
    String::new()
}

/// Switches for a single inventory pass.
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    pub paths: KernelPaths,
    /// Allow spawning `modinfo`, `zstd` and `xz`.
    pub external_tools: bool,
    /// Resolve file path, description and signature of loaded modules.
    pub resolve_details: bool,
    pub include_builtin: bool,
    pub include_unloaded: bool,
    pub modinfo_program: String,
}

impl InventoryConfig {
    pub fn new(paths: KernelPaths) -> Self {
        InventoryConfig {
            paths,
            external_tools: true,
            resolve_details: false,
            include_builtin: true,
            include_unloaded: true,
            modinfo_program: "modinfo".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_for_release() {
        let paths = KernelPaths::for_release("/srv/root", "6.1.0-13-amd64");
        assert_eq!(paths.proc_modules, PathBuf::from("/srv/root/proc/modules"));
        assert_eq!(
            paths.modules_dir,
            PathBuf::from("/srv/root/lib/modules/6.1.0-13-amd64")
        );
        assert_eq!(
            paths.builtin_list,
            PathBuf::from("/srv/root/lib/modules/6.1.0-13-amd64/modules.builtin")
        );
        assert_eq!(
            paths.builtin_modinfo,
            PathBuf::from("/srv/root/lib/modules/6.1.0-13-amd64/modules.builtin.modinfo")
        );
        assert_eq!(paths.config_candidates[0], PathBuf::from("/srv/root/proc/config.gz"));
        assert_eq!(
            paths.config_candidates[1],
            PathBuf::from("/srv/root/boot/config-6.1.0-13-amd64")
        );
        assert_eq!(
            paths.source_roots[0],
            PathBuf::from("/srv/root/lib/modules/6.1.0-13-amd64/build")
        );
    }

    #[test]
    fn test_detect_prefers_root_osrelease() -> Result<(), Box<dyn std::error::Error>> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("proc/sys/kernel"))?;
        fs::write(root.path().join("proc/sys/kernel/osrelease"), "5.15.0-test\n")?;

        let paths = KernelPaths::detect(root.path(), None);
        assert_eq!(paths.release, "5.15.0-test");
        assert_eq!(paths.modules_dir, root.path().join("lib/modules/5.15.0-test"));
        Ok(())
    }

    #[test]
    fn test_detect_honours_override() {
        let paths = KernelPaths::detect("/", Some("4.19.0"));
        assert_eq!(paths.release, "4.19.0");
    }

    #[test]
    fn test_config_defaults() {
        let config = InventoryConfig::new(KernelPaths::for_release("/", "6.1.0"));
        assert!(config.external_tools);
        assert!(!config.resolve_details);
        assert_eq!(config.modinfo_program, "modinfo");
    }
}
