//! Text (table) output formatter for the module inventory
use crate::error::InventoryError;
use crate::formats::traits::{OutputFormatter, ReportContext};
use crate::kernel::{format_size, ModuleCatalog, ModuleRecord};
use prettytable::{Cell, Row, Table};
use std::fmt::Write;

/// Text formatter that outputs data in a human-readable table format
pub struct TextFormatter;

fn new_table(quiet: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    if !quiet {
        table.set_titles(Row::new(
            ["NAME", "TYPE", "SIZE", "REFS", "STATUS", "DESCRIPTION"]
                .iter()
                .map(|title| Cell::new(title).style_spec("c"))
                .collect(),
        ));
    }
    table
}

fn text_row(cells: [&str; 6]) -> Row {
    Row::new(cells.iter().map(|c| Cell::new(c)).collect())
}

impl TextFormatter {
    fn table(&self, catalog: &ModuleCatalog, quiet: bool) -> String {
        let mut table = new_table(quiet);

        for module in &catalog.loaded {
            table.add_row(text_row([
                &module.name,
                "Loadable",
                &format_size(module.size),
                &module.ref_count.to_string(),
                module.status.as_str(),
                &module.description,
            ]));
        }
        for module in &catalog.builtin {
            table.add_row(text_row([&module.name, "Builtin", "-", "-", "Always", &module.description]));
        }
        for module in &catalog.unloaded {
            table.add_row(text_row([
                &module.name,
                "Unloaded",
                &format_size(module.size),
                "-",
                "Not loaded",
                &module.description,
            ]));
        }

        table.to_string()
    }

    fn blocks(&self, catalog: &ModuleCatalog) -> String {
        let mut out = String::new();
        let mut index = 0;
        for record in catalog.records() {
            index += 1;
            let block = match &record {
                ModuleRecord::Loaded(m) => m.to_string(),
                ModuleRecord::Builtin(m) => m.to_string(),
                ModuleRecord::Unloaded(m) => m.to_string(),
            };
            let _ = writeln!(out, "{}. {}", index, block);
        }
        out
    }
}

impl OutputFormatter for TextFormatter {
    fn format_catalog(
        &self,
        catalog: &ModuleCatalog,
        context: &ReportContext,
    ) -> Result<String, InventoryError> {
        let mut out = String::new();

        if !context.quiet {
            let _ = writeln!(
                out,
                "Kernel modules on {} ({})\n",
                context.hostname, context.kernel_release
            );
        }

        if catalog.is_empty() {
            if !context.quiet {
                out.push_str("No modules found.\n");
            }
            return Ok(out);
        }

        if context.detailed {
            out.push_str(&self.blocks(catalog));
        } else {
            out.push_str(&self.table(catalog, context.quiet));
        }

        if !context.quiet {
            let _ = writeln!(
                out,
                "\nTotal: {} modules ({} loaded, {} builtin, {} unloaded), loaded size {}",
                catalog.total(),
                catalog.loaded.len(),
                catalog.builtin.len(),
                catalog.unloaded.len(),
                format_size(catalog.total_loaded_size())
            );
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BuiltinModule, LoadedModule, ModuleStatus};

    fn catalog() -> ModuleCatalog {
        ModuleCatalog {
            loaded: vec![LoadedModule::new(
                "snd_pcm".to_string(),
                2048,
                3,
                vec!["snd_hda_codec".to_string()],
                ModuleStatus::Live,
                "0xffffffffc0a00000".to_string(),
            )],
            builtin: vec![BuiltinModule::new("ext4")],
            unloaded: vec![],
        }
    }

    #[test]
    fn test_table_output() {
        let out = TextFormatter
            .format_catalog(&catalog(), &ReportContext::new("box", "6.1.0"))
            .unwrap();
        assert!(out.contains("Kernel modules on box (6.1.0)"));
        assert!(out.contains("NAME"));
        assert!(out.contains("snd_pcm"));
        assert!(out.contains("2.0 KB"));
        assert!(out.contains("Always"));
        assert!(out.contains("Total: 2 modules (1 loaded, 1 builtin, 0 unloaded)"));
    }

    #[test]
    fn test_quiet_output_has_no_headings() {
        let mut context = ReportContext::new("box", "6.1.0");
        context.quiet = true;
        let out = TextFormatter.format_catalog(&catalog(), &context).unwrap();
        assert!(!out.contains("NAME"));
        assert!(!out.contains("Total:"));
        assert!(out.contains("ext4"));
    }

    #[test]
    fn test_detailed_blocks_are_numbered() {
        let mut context = ReportContext::new("box", "6.1.0");
        context.detailed = true;
        let out = TextFormatter.format_catalog(&catalog(), &context).unwrap();
        assert!(out.contains("1. Module: snd_pcm (loadable)"));
        assert!(out.contains("Dependencies: snd_hda_codec"));
        assert!(out.contains("2. Module: ext4 (builtin)"));
    }

    #[test]
    fn test_empty_catalog() {
        let out = TextFormatter
            .format_catalog(&ModuleCatalog::default(), &ReportContext::new("box", "r"))
            .unwrap();
        assert!(out.contains("No modules found."));
    }
}
