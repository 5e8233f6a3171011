//! JSON output formatter for the module inventory
use crate::error::InventoryError;
use crate::formats::traits::{OutputFormatter, ReportContext};
use crate::kernel::{BuiltinModule, LoadedModule, ModuleCatalog, UnloadedModule};
use serde::Serialize;

#[derive(Serialize)]
struct Counts {
    total: usize,
    loadable: usize,
    builtin: usize,
    unloaded: usize,
}

#[derive(Serialize)]
struct OutputWrapper<'a> {
    tool: &'static str,
    timestamp: String,
    hostname: &'a str,
    kernel_release: &'a str,
    counts: Counts,
    loadable_modules: &'a [LoadedModule],
    builtin_modules: &'a [BuiltinModule],
    unloaded_modules: &'a [UnloadedModule],
}

/// JSON formatter that outputs the catalog with report metadata
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_catalog(
        &self,
        catalog: &ModuleCatalog,
        context: &ReportContext,
    ) -> Result<String, InventoryError> {
        let wrapper = OutputWrapper {
            tool: env!("CARGO_PKG_NAME"),
            timestamp: context.generated_at.to_rfc3339(),
            hostname: &context.hostname,
            kernel_release: &context.kernel_release,
            counts: Counts {
                total: catalog.total(),
                loadable: catalog.loaded.len(),
                builtin: catalog.builtin.len(),
                unloaded: catalog.unloaded.len(),
            },
            loadable_modules: &catalog.loaded,
            builtin_modules: &catalog.builtin,
            unloaded_modules: &catalog.unloaded,
        };

        let json = serde_json::to_string_pretty(&wrapper)?;
        Ok(json)
    }
}
