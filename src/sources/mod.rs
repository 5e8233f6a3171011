//! Module sources: the live listing, the on-disk scan, and name-to-file lookup
pub mod loaded;
pub mod locator;
pub mod unloaded;

pub use loaded::{parse_dependencies, parse_proc_modules, ProcModulesSource};
pub use locator::ModuleLocator;
pub use unloaded::{list_unloaded, scan_module_files, ModuleFile, UnloadedScanner};
