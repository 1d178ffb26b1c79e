//! Load a launcher template, stamp it, write and verify the result.
//!
//! [`LauncherGenerator`] owns the parsed image for one run.  Setters edit the
//! decoded string table, version info and resource tree in memory; nothing is
//! re-encoded until [`LauncherGenerator::generate`], which consumes the
//! generator so a run cannot be written twice.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use crate::binary::{Bin, BinWriter};
use crate::error::{Error, Result};
use crate::pe::{
    PeFile, SectionHeader, IMAGE_DIRECTORY_ENTRY_BASERELOC, IMAGE_DIRECTORY_ENTRY_RESOURCE,
};
use crate::resource::{self, IconFile, ResourceDirectory, ResourceType, StringTableDirectory};
use crate::version::{pack_version, VersionInfo};

/// Summary of a successful [`LauncherGenerator::generate`].
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub output: PathBuf,
    /// Size of the written file in bytes.
    pub size: u64,
    /// Final section table.
    pub sections: Vec<SectionHeader>,
}

#[derive(Debug)]
pub struct LauncherGenerator {
    pe: PeFile,
    /// `None` when the template has no RT_STRING resource.
    string_table: Option<StringTableDirectory>,
    /// `None` when the template has no RT_VERSION resource.
    version_info: Option<VersionInfo>,
}

impl LauncherGenerator {
    /// Read and parse the template at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let generator = Self::from_bytes(&bytes)?;
        info!(
            template = %path.display(),
            size = bytes.len(),
            sections = generator.pe.sections.len(),
            "loaded launcher template"
        );
        Ok(generator)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let pe = PeFile::parse(bytes)?;
        let (string_table, version_info) = match pe.resources() {
            Some(rsrc) => (decode_string_table(rsrc.root())?, decode_version_info(rsrc.root())?),
            None => (None, None),
        };
        debug!(
            strings = string_table.is_some(),
            version = version_info.is_some(),
            "decoded template resources"
        );
        Ok(Self {
            pe,
            string_table,
            version_info,
        })
    }

    pub fn pe(&self) -> &PeFile {
        &self.pe
    }

    pub fn string_table(&self) -> Option<&StringTableDirectory> {
        self.string_table.as_ref()
    }

    pub fn version_info(&self) -> Option<&VersionInfo> {
        self.version_info.as_ref()
    }

    // -- mutations ----------------------------------------------------------

    pub fn set_resource_string(&mut self, id: u16, value: &str) -> Result<()> {
        let table = self
            .string_table
            .as_mut()
            .ok_or(Error::StringTableNotFound)?;
        table.set(id, value)?;
        trace!(id, value, "set resource string");
        Ok(())
    }

    /// Set `key` in the template's only version-info string table.
    pub fn set_version_info_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.version_info_mut()?
            .string_file_info_mut()?
            .sole_string_table_mut()?
            .set_string_value(key, value)?;
        trace!(key, value, "set version info string");
        Ok(())
    }

    /// Replace icon group `group_id` with the images of an `.ico` file.
    /// Returns the RT_ICON IDs the images were stored under.
    pub fn inject_icon(&mut self, ico: &[u8], group_id: u16) -> Result<Vec<u16>> {
        let icon = IconFile::parse(ico)?;
        resource::inject_icon(resource_root(&mut self.pe)?, &icon, group_id)
    }

    /// Replace bitmap `id` with a `.bmp` file or raw DIB.
    pub fn inject_bitmap(&mut self, id: u16, bytes: &[u8]) -> Result<()> {
        resource::inject_bitmap(resource_root(&mut self.pe)?, id, bytes)
    }

    pub fn set_file_version_number(&mut self, version: [u16; 4]) -> Result<()> {
        let (ms, ls) = pack_version(version);
        self.version_info_mut()?
            .fixed_file_info_mut()?
            .set_file_version(ms, ls);
        debug!(?version, "set file version");
        Ok(())
    }

    pub fn set_product_version_number(&mut self, version: [u16; 4]) -> Result<()> {
        let (ms, ls) = pack_version(version);
        self.version_info_mut()?
            .fixed_file_info_mut()?
            .set_product_version(ms, ls);
        debug!(?version, "set product version");
        Ok(())
    }

    fn version_info_mut(&mut self) -> Result<&mut VersionInfo> {
        self.version_info.as_mut().ok_or(Error::ResourceNotFound {
            kind: ResourceType::Version.name(),
            id: None,
        })
    }

    // -- generation ---------------------------------------------------------

    /// Encode every pending edit, lay the sections out again, write the
    /// image to `output` (replacing any existing file) and verify what was
    /// written.
    pub fn generate(mut self, output: &Path) -> Result<GenerationReport> {
        let version_bytes = match &self.version_info {
            Some(info) => Some(info.to_bytes()?),
            None => None,
        };
        {
            let root = resource_root(&mut self.pe)?;
            if let Some(table) = &self.string_table {
                table.store(root)?;
            }
            if let Some(bytes) = &version_bytes {
                root.find_type_mut(ResourceType::Version)
                    .and_then(ResourceDirectory::first_leaf_mut)
                    .ok_or(Error::ResourceNotFound {
                        kind: ResourceType::Version.name(),
                        id: None,
                    })?
                    .set_bytes(bytes.clone());
            }
        }

        self.pe.reset_offsets(0);
        self.pe.section_virtual_address_fixup()?;
        self.pe.reset_offsets(0);

        let expected_size = self.pe.size_in_bytes();
        let mut out = BinWriter::with_capacity(expected_size as usize);
        self.pe.write(&mut out)?;
        let image = out.into_inner();

        if output.exists() {
            fs::remove_file(output)?;
        }
        fs::write(output, &image)?;
        debug!(output = %output.display(), size = image.len(), "wrote image");

        let mut violations = Vec::new();
        let size = fs::metadata(output)?.len();
        if size != expected_size {
            violations.push(format!(
                "file is {size} bytes, layout expected {expected_size}"
            ));
        }

        let written = fs::read(output)?;
        match PeFile::parse(&written) {
            Ok(reparsed) => {
                verify_layout(&reparsed, &mut violations);
                match reparsed.resources() {
                    Some(rsrc) => self.verify_resources(
                        rsrc.root(),
                        version_bytes.as_deref(),
                        &mut violations,
                    ),
                    None => violations.push("output has no resource section".into()),
                }
            }
            Err(err) => violations.push(format!("output does not parse back: {err}")),
        }
        if !violations.is_empty() {
            return Err(Error::Verification(violations));
        }

        let sections: Vec<SectionHeader> = self.pe.sections.iter().map(|s| s.header).collect();
        info!(
            output = %output.display(),
            size,
            sections = sections.len(),
            size_of_image = self.pe.optional_header.size_of_image,
            "generated launcher"
        );
        Ok(GenerationReport {
            output: output.to_path_buf(),
            size,
            sections,
        })
    }

    /// Edits read back from the written tree must equal what was encoded.
    fn verify_resources(
        &self,
        root: &ResourceDirectory,
        version_bytes: Option<&[u8]>,
        violations: &mut Vec<String>,
    ) {
        if let Some(expected) = version_bytes {
            let leaf = root
                .find_type(ResourceType::Version)
                .and_then(ResourceDirectory::first_leaf);
            match leaf {
                None => violations.push("version info is missing from the output".into()),
                Some(leaf) if leaf.bytes() != expected => violations.push(format!(
                    "version info is {} bytes in the output, {} were encoded",
                    leaf.len(),
                    expected.len()
                )),
                Some(leaf) => match reencode_twice(leaf.bytes()) {
                    Ok((first, second)) if first == expected && second == first => {}
                    Ok(_) => {
                        violations.push("version info does not survive a read/write cycle".into())
                    }
                    Err(err) => violations.push(format!("version info does not parse back: {err}")),
                },
            }
        }

        if let Some(table) = &self.string_table {
            match StringTableDirectory::parse(root) {
                Ok(reread) if &reread == table => {}
                Ok(_) => violations.push("string table differs after writing".into()),
                Err(err) => violations.push(format!("string table does not parse back: {err}")),
            }
        }
    }
}

/// Parse and serialize version info twice over.
fn reencode_twice(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let first = VersionInfo::parse(bytes)?.to_bytes()?;
    let second = VersionInfo::parse(&first)?.to_bytes()?;
    Ok((first, second))
}

fn decode_string_table(root: &ResourceDirectory) -> Result<Option<StringTableDirectory>> {
    match StringTableDirectory::parse(root) {
        Ok(table) => Ok(Some(table)),
        Err(Error::StringTableNotFound) => Ok(None),
        Err(err) => Err(err),
    }
}

fn decode_version_info(root: &ResourceDirectory) -> Result<Option<VersionInfo>> {
    root.find_type(ResourceType::Version)
        .and_then(ResourceDirectory::first_leaf)
        .map(|leaf| VersionInfo::parse(leaf.bytes()))
        .transpose()
}

fn resource_root(pe: &mut PeFile) -> Result<&mut ResourceDirectory> {
    pe.resources_mut()
        .map(|rsrc| rsrc.root_mut())
        .ok_or_else(|| Error::malformed("template", "image has no resource section"))
}

/// Alignment and data-directory invariants of a freshly written image.
fn verify_layout(pe: &PeFile, violations: &mut Vec<String>) {
    let file_alignment = pe.optional_header.file_alignment;
    let section_alignment = pe.optional_header.section_alignment;
    if file_alignment == 0 || section_alignment == 0 {
        violations.push("zero file or section alignment".into());
        return;
    }

    for section in &pe.sections {
        let h = &section.header;
        let name = h.name_str();
        if h.size_of_raw_data != 0 {
            if h.pointer_to_raw_data % file_alignment != 0 {
                violations.push(format!(
                    "{name}: raw data at 0x{:X} is not aligned to 0x{file_alignment:X}",
                    h.pointer_to_raw_data
                ));
            }
            if h.size_of_raw_data % file_alignment != 0 {
                violations.push(format!(
                    "{name}: raw size 0x{:X} is not aligned to 0x{file_alignment:X}",
                    h.size_of_raw_data
                ));
            }
        }
        if h.virtual_address % section_alignment != 0 {
            violations.push(format!(
                "{name}: address 0x{:X} is not aligned to 0x{section_alignment:X}",
                h.virtual_address
            ));
        }
    }

    if let Some(rsrc) = pe.resource_section() {
        let h = &rsrc.header;
        if h.virtual_size < h.size_of_raw_data {
            violations.push(format!(
                "{}: virtual size 0x{:X} is below raw size 0x{:X}",
                h.name_str(),
                h.virtual_size,
                h.size_of_raw_data
            ));
        }
    }

    for (section, index) in [
        (pe.resource_section(), IMAGE_DIRECTORY_ENTRY_RESOURCE),
        (pe.relocation_section(), IMAGE_DIRECTORY_ENTRY_BASERELOC),
    ] {
        let (Some(section), Some(directory)) = (section, pe.data_directory(index)) else {
            continue;
        };
        let h = &section.header;
        if (directory.virtual_address, directory.size) != (h.virtual_address, h.virtual_size) {
            violations.push(format!(
                "data directory {index} is (0x{:X}, 0x{:X}), section {} is (0x{:X}, 0x{:X})",
                directory.virtual_address,
                directory.size,
                h.name_str(),
                h.virtual_address,
                h.virtual_size
            ));
        }
    }
}
