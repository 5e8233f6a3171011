//! ELF `.modinfo` extraction, with decompression of packed modules
use crate::command::CommandRunner;
use crate::error::InventoryError;
use crate::kernel::ModuleMetadata;
use crate::metadata::{parse_modinfo_section, signature_state, BinaryMetadata, MetadataReader};
use flate2::read::GzDecoder;
use goblin::elf::Elf;
use log::debug;
use memchr::memmem;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

const MODINFO_SECTION: &str = ".modinfo";

/// Fields recovered by the raw byte scan when the ELF headers are unusable.
const RAW_SCAN_KEYS: [&str; 4] = ["description", "license", "version", "author"];

/// How a module file on disk is packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
    Zstd,
    Xz,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if name.ends_with(".zst") {
            Compression::Zstd
        } else if name.ends_with(".xz") {
            Compression::Xz
        } else if name.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::Plain
        }
    }
}

/// Bytes of an uncompressed module, either mapped from disk or held in memory.
enum ModuleImage {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for ModuleImage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ModuleImage::Mapped(map) => &map[..],
            ModuleImage::Owned(bytes) => &bytes[..],
        }
    }
}

/// Reads `.modinfo` from plain, gzip, zstd and xz packed modules.
pub struct ElfMetadataReader {
    runner: Arc<dyn CommandRunner>,
}

impl ElfMetadataReader {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        ElfMetadataReader { runner }
    }

    fn load_image(&self, path: &Path) -> Result<ModuleImage, InventoryError> {
        match Compression::from_path(path) {
            Compression::Plain => map_file(path),
            Compression::Gzip => {
                let mut bytes = Vec::new();
                GzDecoder::new(File::open(path)?).read_to_end(&mut bytes)?;
                Ok(ModuleImage::Owned(bytes))
            }
            Compression::Zstd => {
                // The temp file is removed when `scratch` drops, on every return path.
                let scratch = NamedTempFile::new()?;
                let target = scratch.path().to_string_lossy().into_owned();
                let source = path.to_string_lossy();
                self.runner
                    .run_checked("zstd", &["-d", "-q", "-f", &source, "-o", &target])?;
                let bytes = fs::read(scratch.path())?;
                Ok(ModuleImage::Owned(bytes))
            }
            Compression::Xz => {
                let source = path.to_string_lossy();
                let output = self.runner.run_checked("xz", &["-d", "-c", &source])?;
                Ok(ModuleImage::Owned(output.stdout))
            }
        }
    }
}

impl MetadataReader for ElfMetadataReader {
    fn read(&self, path: &Path) -> Result<BinaryMetadata, InventoryError> {
        let image = self.load_image(path)?;
        let fields = extract_modinfo(&image);
        Ok(BinaryMetadata {
            metadata: ModuleMetadata::from_fields(&fields),
            signed: signature_state(&fields, &image),
        })
    }
}

fn map_file(path: &Path) -> Result<ModuleImage, InventoryError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(ModuleImage::Owned(Vec::new()));
    }
    let mapped = unsafe { Mmap::map(&file)? };
    Ok(ModuleImage::Mapped(mapped))
}

/// Pull the `.modinfo` fields out of an ELF image, scanning raw bytes when
/// the headers cannot be parsed.
pub fn extract_modinfo(image: &[u8]) -> BTreeMap<String, String> {
    match modinfo_section(image) {
        Ok(Some(section)) => parse_modinfo_section(section),
        Ok(None) => {
            debug!("No {} section found", MODINFO_SECTION);
            BTreeMap::new()
        }
        Err(e) => {
            debug!("ELF parse failed ({}), scanning raw bytes", e);
            scan_raw_modinfo(image)
        }
    }
}

fn modinfo_section(image: &[u8]) -> Result<Option<&[u8]>, InventoryError> {
    let elf = Elf::parse(image)?;
    for header in &elf.section_headers {
        if elf.shdr_strtab.get_at(header.sh_name) != Some(MODINFO_SECTION) {
            continue;
        }
        let start = header.sh_offset as usize;
        let end = start.checked_add(header.sh_size as usize);
        return Ok(end.and_then(|end| image.get(start..end)));
    }
    Ok(None)
}

fn scan_raw_modinfo(image: &[u8]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for key in RAW_SCAN_KEYS {
        let needle = format!("{}=", key);
        for pos in memmem::find_iter(image, needle.as_bytes()) {
            // Entries start the section or follow a NUL terminator.
            if pos > 0 && image[pos - 1] != 0 {
                continue;
            }
            let value_start = pos + needle.len();
            let value_end = memchr::memchr(0, &image[value_start..])
                .map(|len| value_start + len)
                .unwrap_or(image.len());
            let value = String::from_utf8_lossy(&image[value_start..value_end]);
            fields.insert(key.to_string(), value.trim().to_string());
            break;
        }
    }
    fields
}
