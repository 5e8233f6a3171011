//! Error types for the module inventory
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    /// The live module listing could not be opened at all.
    #[error("Module source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The live module listing exists but reading it was refused.
    #[error("Permission denied reading {path}")]
    AccessDenied { path: PathBuf },

    /// A record in the live module listing is malformed. Invalidates the whole listing.
    #[error("Parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// A secondary source failed; callers degrade to defaults.
    #[error("Enrichment from {source_name} failed: {message}")]
    EnrichmentFailure {
        source_name: &'static str,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("CSV into_inner error: {0}")]
    CsvIntoInnerError(#[from] csv::IntoInnerError<csv::Writer<Vec<u8>>>),

    #[error("UTF-8 conversion error: {0}")]
    FromUtf8Error(#[from] std::string::FromUtf8Error),

    #[error("ELF error: {0}")]
    ElfError(#[from] goblin::error::Error),
}

impl InventoryError {
    /// Shorthand for a non-fatal failure of a secondary source.
    pub fn enrichment(source_name: &'static str, message: impl Into<String>) -> Self {
        InventoryError::EnrichmentFailure {
            source_name,
            message: message.into(),
        }
    }

    /// Fatal errors abort the whole inventory pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InventoryError::SourceUnavailable { .. }
                | InventoryError::AccessDenied { .. }
                | InventoryError::ParseError { .. }
        )
    }

    /// Process exit code reported by the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            InventoryError::SourceUnavailable { .. } => 2,
            InventoryError::AccessDenied { .. } => 3,
            InventoryError::ParseError { .. } => 4,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
