//! Library crate for the kernel module inventory

// Allow clippy lints that would require significant refactoring
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::redundant_closure)]
#![allow(clippy::doc_lazy_continuation)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::needless_borrows_for_generic_args)]

pub mod builtin;
pub mod command;
pub mod config;
pub mod error;
pub mod filter;
pub mod inventory;
pub mod kernel;
pub mod metadata;
pub mod sources;

// CLI modules
pub mod cli {
    pub mod args;
}

// Format modules
pub mod formats {
    pub mod csv;
    pub mod html;
    pub mod json;
    pub mod text;
    pub mod traits;
}
