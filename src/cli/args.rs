//! Command-line argument parsing for kmodlist
use crate::filter::SortField;
use crate::formats::traits::OutputFormat;
use crate::kernel::ModuleStatus;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kmodlist", version)]
#[command(about = "List loaded, builtin and available Linux kernel modules", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormatArg,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Include builtin modules
    #[arg(short, long)]
    pub builtin: bool,

    /// Include modules on disk that are not loaded
    #[arg(short, long)]
    pub unloaded: bool,

    /// Include builtin and unloaded modules
    #[arg(short, long)]
    pub all: bool,

    /// Only modules whose name matches this shell glob
    #[arg(long, value_name = "GLOB")]
    pub name: Option<String>,

    /// Minimum size in bytes (loaded modules)
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Maximum size in bytes (loaded modules)
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,

    /// Minimum reference count (loaded modules)
    #[arg(long, value_name = "N")]
    pub min_refs: Option<u64>,

    /// Only loaded modules in this state
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Sort field
    #[arg(short, long, value_enum, default_value = "name")]
    pub sort: SortArg,

    /// Reverse the sort order
    #[arg(short, long)]
    pub reverse: bool,

    /// Show every field of each module
    #[arg(long)]
    pub detailed: bool,

    /// Print module counts only
    #[arg(short, long)]
    pub count: bool,

    /// No headings, summaries or progress spinner
    #[arg(short, long)]
    pub quiet: bool,

    /// Read kernel files below this directory instead of /
    #[arg(long, value_name = "DIR", default_value = "/")]
    pub root: PathBuf,

    /// Kernel release to inspect (default: the running kernel)
    #[arg(long, value_name = "RELEASE")]
    pub kernel_release: Option<String>,

    /// Never run modinfo, zstd or xz
    #[arg(long)]
    pub no_external_tools: bool,

    /// Enable verbose output (warnings, status messages)
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn include_builtin(&self) -> bool {
        self.builtin || self.all
    }

    pub fn include_unloaded(&self) -> bool {
        self.unloaded || self.all
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormatArg {
    Text,
    Json,
    Csv,
    Html,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Csv => OutputFormat::Csv,
            OutputFormatArg::Html => OutputFormat::Html,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Name,
    Size,
    Refs,
    Status,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortField::Name,
            SortArg::Size => SortField::Size,
            SortArg::Refs => SortField::Refs,
            SortArg::Status => SortField::Status,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Live,
    Loading,
    Unloading,
    Dead,
}

impl From<StatusArg> for ModuleStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Live => ModuleStatus::Live,
            StatusArg::Loading => ModuleStatus::Loading,
            StatusArg::Unloading => ModuleStatus::Unloading,
            StatusArg::Dead => ModuleStatus::Dead,
        }
    }
}
