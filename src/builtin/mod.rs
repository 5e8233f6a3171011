//! Builtin module detection
//!
//! Several producers report evidence that a module is compiled into the
//! kernel, each with its own reliability. Their precedence lives in one table,
//! [`PRECEDENCE`], which [`resolver::BuiltinResolver`] consumes.
use crate::error::InventoryError;
use crate::kernel::ModuleMetadata;
use std::collections::BTreeSet;

pub mod bulk_modinfo;
pub mod kconfig;
pub mod list_file;
pub mod modinfo;
pub mod resolver;
pub mod source_tree;

pub use bulk_modinfo::BulkModinfoFile;
pub use kconfig::KernelConfigHeuristic;
pub use list_file::BuiltinListFile;
pub use modinfo::ModinfoTool;
pub use resolver::BuiltinResolver;
pub use source_tree::SourceTreeHeuristic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceSource {
    /// `modules.builtin` for the running release.
    BuiltinList,
    /// `CONFIG_*_BUILTIN=y` lines in the kernel build configuration.
    KernelConfig,
    /// Output of the `modinfo` tool.
    ModinfoTool,
    /// `modules.builtin.modinfo`.
    BulkModinfo,
    /// `MODULE_DESCRIPTION`/`MODULE_LICENSE` in kernel sources.
    SourceTree,
}

/// What a producer's name list counts for when deciding set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Used alone whenever it yields any name.
    Authoritative,
    /// Unioned with other fallbacks when no authoritative name exists.
    Fallback,
    /// Never consulted for membership.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    pub source: EvidenceSource,
    pub membership: Membership,
    /// Position in the metadata lookup order; lower is tried first.
    pub enrichment_rank: Option<u8>,
}

pub const PRECEDENCE: [Precedence; 5] = [
    Precedence {
        source: EvidenceSource::BuiltinList,
        membership: Membership::Authoritative,
        enrichment_rank: None,
    },
    Precedence {
        source: EvidenceSource::KernelConfig,
        membership: Membership::Fallback,
        enrichment_rank: None,
    },
    Precedence {
        source: EvidenceSource::ModinfoTool,
        membership: Membership::Fallback,
        enrichment_rank: Some(0),
    },
    Precedence {
        source: EvidenceSource::BulkModinfo,
        membership: Membership::Ignored,
        enrichment_rank: Some(1),
    },
    Precedence {
        source: EvidenceSource::SourceTree,
        membership: Membership::Ignored,
        enrichment_rank: Some(2),
    },
];

impl EvidenceSource {
    pub fn precedence(self) -> Precedence {
        PRECEDENCE
            .iter()
            .copied()
            .find(|p| p.source == self)
            .unwrap_or(Precedence {
                source: self,
                membership: Membership::Ignored,
                enrichment_rank: None,
            })
    }

    pub fn label(self) -> &'static str {
        match self {
            EvidenceSource::BuiltinList => "modules.builtin",
            EvidenceSource::KernelConfig => "kernel config",
            EvidenceSource::ModinfoTool => "modinfo",
            EvidenceSource::BulkModinfo => "modules.builtin.modinfo",
            EvidenceSource::SourceTree => "kernel source tree",
        }
    }
}

/// One producer of builtin evidence.
///
/// Producers may cache what they read; the resolver calls them at most once
/// for names and once per module for metadata.
pub trait BuiltinEvidence {
    fn source(&self) -> EvidenceSource;

    /// Module names this producer believes are builtin.
    fn builtin_names(&mut self) -> Result<BTreeSet<String>, InventoryError> {
        Ok(BTreeSet::new())
    }

    /// Descriptive metadata for one module, if this producer knows it.
    fn metadata(&mut self, _name: &str) -> Result<Option<ModuleMetadata>, InventoryError> {
        Ok(None)
    }
}
