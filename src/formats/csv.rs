//! CSV output formatter for the module inventory
use crate::error::InventoryError;
use crate::formats::traits::{OutputFormatter, ReportContext};
use crate::kernel::ModuleCatalog;
use csv::Writer;

/// CSV formatter that outputs one row per module
pub struct CsvFormatter;

impl OutputFormatter for CsvFormatter {
    fn format_catalog(
        &self,
        catalog: &ModuleCatalog,
        _context: &ReportContext,
    ) -> Result<String, InventoryError> {
        let mut wtr = Writer::from_writer(vec![]);

        wtr.write_record([
            "Name",
            "Type",
            "Size",
            "Ref Count",
            "Status",
            "Dependencies",
            "Description",
        ])?;

        for module in &catalog.loaded {
            wtr.write_record(&[
                module.name.clone(),
                "Loadable".to_string(),
                module.size.to_string(),
                module.ref_count.to_string(),
                module.status.to_string(),
                module.dependencies.join(","),
                module.description.clone(),
            ])?;
        }

        for module in &catalog.builtin {
            wtr.write_record([
                module.name.as_str(),
                "Builtin",
                "",
                "",
                "Always",
                "",
                module.description.as_str(),
            ])?;
        }

        for module in &catalog.unloaded {
            wtr.write_record(&[
                module.name.clone(),
                "Unloaded".to_string(),
                module.size.to_string(),
                String::new(),
                "Not loaded".to_string(),
                String::new(),
                module.description.clone(),
            ])?;
        }

        wtr.flush()?;
        let data = wtr.into_inner()?;
        Ok(String::from_utf8(data)?)
    }
}
