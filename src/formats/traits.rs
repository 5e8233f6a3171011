//! Output format traits for the module inventory
use crate::error::InventoryError;
use crate::kernel::ModuleCatalog;
use chrono::{DateTime, Local};
use log::debug;
use std::fs;
use std::path::Path;

const HOSTNAME_FILE: &str = "proc/sys/kernel/hostname";

/// Facts about the host that reports print alongside the catalog.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub hostname: String,
    pub kernel_release: String,
    pub machine: String,
    pub generated_at: DateTime<Local>,
    /// Per-module blocks instead of a table (text output only).
    pub detailed: bool,
    /// Omit headings and summaries.
    pub quiet: bool,
}

impl ReportContext {
    pub fn new(hostname: &str, kernel_release: &str) -> Self {
        ReportContext {
            hostname: hostname.to_string(),
            kernel_release: kernel_release.to_string(),
            machine: std::env::consts::ARCH.to_string(),
            generated_at: Local::now(),
            detailed: false,
            quiet: false,
        }
    }

    /// Read the hostname below `root`, falling back to "unknown".
    pub fn detect(root: &Path, kernel_release: &str) -> Self {
        let hostname = match fs::read_to_string(root.join(HOSTNAME_FILE)) {
            Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
            Ok(_) => "unknown".to_string(),
            Err(e) => {
                debug!("Cannot read hostname: {}", e);
                "unknown".to_string()
            }
        };
        Self::new(&hostname, kernel_release)
    }

    pub fn timestamp(&self) -> String {
        self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    fn format_catalog(
        &self,
        catalog: &ModuleCatalog,
        context: &ReportContext,
    ) -> Result<String, InventoryError>;
}

/// Enum for output format types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    Html,
}

/// Enum for output destination
#[derive(Debug, Clone)]
pub enum OutputDestination {
    Stdout,
    File(std::path::PathBuf),
}

/// Output writer that combines format and destination
pub struct OutputWriter {
    formatter: Box<dyn OutputFormatter>,
    destination: OutputDestination,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, destination: OutputDestination) -> Self {
        let formatter: Box<dyn OutputFormatter> = match format {
            OutputFormat::Text => Box::new(crate::formats::text::TextFormatter),
            OutputFormat::Json => Box::new(crate::formats::json::JsonFormatter),
            OutputFormat::Csv => Box::new(crate::formats::csv::CsvFormatter),
            OutputFormat::Html => Box::new(crate::formats::html::HtmlFormatter),
        };

        Self {
            formatter,
            destination,
        }
    }

    pub fn render(
        &self,
        catalog: &ModuleCatalog,
        context: &ReportContext,
    ) -> Result<String, InventoryError> {
        self.formatter.format_catalog(catalog, context)
    }

    /// Write the catalog to the configured destination
    pub fn write_catalog(
        &self,
        catalog: &ModuleCatalog,
        context: &ReportContext,
    ) -> Result<(), InventoryError> {
        let content = self.render(catalog, context)?;

        match &self.destination {
            OutputDestination::Stdout => {
                if content.ends_with('\n') {
                    print!("{}", content);
                } else {
                    println!("{}", content);
                }
            }
            OutputDestination::File(path) => {
                fs::write(path, content)?;
            }
        }

        Ok(())
    }
}
